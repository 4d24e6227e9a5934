//! Demo walkthrough client for a running revstore server
//!
//! Stores a document twice (showing content dedup), writes a changed
//! revision, retrieves head and history, exercises tags, and cleans up.

use anyhow::{bail, Context, Result};
use clap::Parser;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

#[derive(Parser, Debug)]
#[command(name = "revstore-client", about = "Demo client for a revstore server")]
struct Args {
    /// Base URL of the object store API
    #[arg(long, default_value = "http://127.0.0.1:5000/svc/v1")]
    base_url: String,

    /// Client id
    #[arg(long, env = "REVSTORE_CLIENT_ID")]
    client_id: String,

    /// Client token
    #[arg(long, env = "REVSTORE_CLIENT_TOKEN")]
    client_token: String,

    /// Namespace to exercise
    #[arg(long, default_value = "demo")]
    namespace: String,
}

struct ObjectstoreClient {
    http: reqwest::Client,
    base_url: String,
}

impl ObjectstoreClient {
    fn new(args: &Args) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-client-id",
            HeaderValue::from_str(&args.client_id).context("invalid client_id")?,
        );
        headers.insert(
            "x-client-token",
            HeaderValue::from_str(&args.client_token).context("invalid client_token")?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: args.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn store(
        &self,
        namespace: &str,
        object_id: Option<&str>,
        tags: Option<&str>,
        document: &Value,
    ) -> Result<Value> {
        let mut request = self
            .http
            .post(format!("{}/{}", self.base_url, namespace))
            .json(document);
        if let Some(object_id) = object_id {
            request = request.query(&[("object_id", object_id)]);
        }
        if let Some(tags) = tags {
            request = request.query(&[("tags", tags)]);
        }
        expect_ok(request.send().await?).await
    }

    async fn retrieve(&self, namespace: &str, object_id: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/{}/{}", self.base_url, namespace, object_id))
            .send()
            .await?;
        expect_ok(response).await
    }

    async fn get_tags(&self, namespace: &str, object_id: &str) -> Result<Value> {
        let response = self
            .http
            .get(format!("{}/tags/{}/{}", self.base_url, namespace, object_id))
            .send()
            .await?;
        expect_ok(response).await
    }

    async fn query_namespace(&self, namespace: &str, tag: Option<&str>) -> Result<Value> {
        let mut request = self.http.get(format!("{}/{}", self.base_url, namespace));
        if let Some(tag) = tag {
            request = request.query(&[("tag", tag)]);
        }
        expect_ok(request.send().await?).await
    }

    async fn delete(&self, namespace: &str, object_id: &str) -> Result<Value> {
        let response = self
            .http
            .delete(format!("{}/{}/{}", self.base_url, namespace, object_id))
            .send()
            .await?;
        expect_ok(response).await
    }
}

async fn expect_ok(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.context("response was not JSON")?;
    if !status.is_success() {
        bail!("request failed with {}: {}", status, body);
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let client = ObjectstoreClient::new(&args)?;
    let ns = &args.namespace;

    let document = json!({"title": "first draft", "words": 120});

    let stored = client.store(ns, None, Some("draft,example"), &document).await?;
    let object_id = stored["object_id"]
        .as_str()
        .context("store response missing object_id")?
        .to_string();
    println!(
        "stored {}/{} revision {} (new_version={})",
        ns, object_id, stored["revision_id"], stored["new_version"]
    );

    // Same payload again: the server must hand back the same revision.
    let dedup = client.store(ns, Some(&object_id), None, &document).await?;
    println!(
        "stored again, revision {} (new_version={})",
        dedup["revision_id"], dedup["new_version"]
    );
    if dedup["revision_id"] != stored["revision_id"] {
        bail!("expected content dedup to reuse the revision");
    }

    // A changed payload mints a new revision.
    let changed = client
        .store(
            ns,
            Some(&object_id),
            None,
            &json!({"title": "second draft", "words": 480}),
        )
        .await?;
    println!(
        "updated, revision {} (new_version={})",
        changed["revision_id"], changed["new_version"]
    );

    let head = client.retrieve(ns, &object_id).await?;
    println!("retrieved head: {}", head["object"]);

    let tags = client.get_tags(ns, &object_id).await?;
    println!("tags: {}", tags["tags"]);

    let drafts = client.query_namespace(ns, Some("draft")).await?;
    println!("objects tagged 'draft': {}", drafts["object_ids"]);

    let deleted = client.delete(ns, &object_id).await?;
    println!("{}", deleted["message"]);

    Ok(())
}
