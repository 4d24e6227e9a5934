//! Storage and revisioning engine
//!
//! This module provides the object store using SQLite with:
//! - A mapping registry resolving namespaces to physical tables
//! - Idempotent per-namespace schema provisioning
//! - Content-dedup writes and revisioned retrieval
//! - A two-way tag index (normalized table + denormalized snapshot column)
//!
//! Every public operation runs on its own connection inside a single
//! transaction: commit on success, rollback on any error.

pub mod mapping;
pub mod objects;
pub mod schema;
pub mod tags;

pub use mapping::MappingRegistry;
pub use schema::NamespaceTables;

use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, Transaction};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::ident;
use crate::types::{Mapping, RetrievedObject, RevisionInfo, StoreOutcome};

/// Timestamp format stored in the database.
///
/// Fixed-width fractional seconds keep lexical order equal to chronological
/// order, which the head-revision queries rely on.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Connection factory for the single database file.
///
/// The connection is not shared across requests; each request opens its own
/// via [`Database::connect`].
pub struct Database {
    path: std::path::PathBuf,
    busy_timeout: Duration,
}

impl Database {
    /// Open or create a database at the configured path.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self {
            path: config.path.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };

        // Fail fast on an unopenable file
        db.connect()?;

        Ok(db)
    }

    /// Open a fresh connection with the standard pragmas applied.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }
}

/// The storage and revisioning engine.
///
/// Owns the [`Database`] connection factory and the process-wide
/// [`MappingRegistry`]. All methods take `client_id` as an input; request
/// authentication happens upstream.
pub struct ObjectStore {
    db: Database,
    registry: MappingRegistry,
}

impl ObjectStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            registry: MappingRegistry::new(),
        }
    }

    /// Run `f` inside a fresh connection and transaction.
    ///
    /// Commits when `f` succeeds; rolls back on any error. The connection is
    /// closed on every exit path.
    fn with_request<T>(&self, f: impl FnOnce(&Transaction) -> Result<T>) -> Result<T> {
        let mut conn = self.db.connect()?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!(error = %rollback_err, "Transaction rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Resolve the physical tables for a namespace, provisioning mapping,
    /// object and tag tables on first use.
    fn namespace_tables(
        &self,
        tx: &Transaction,
        client_id: &str,
        namespace_id: &str,
    ) -> Result<NamespaceTables> {
        check_name("namespace_id", namespace_id)?;
        schema::ensure_mapping_table(tx)?;
        let suffix = self.registry.resolve(tx, client_id, namespace_id)?;
        let tables = NamespaceTables::for_suffix(&suffix)?;
        schema::ensure_namespace_tables(tx, &tables)?;
        Ok(tables)
    }

    /// Store a JSON payload.
    ///
    /// When the payload is semantically equal to the current head revision,
    /// the head's revision id and timestamp are returned with
    /// `new_version = false`; otherwise a new revision is created. Submitted
    /// tags are added to the object either way.
    pub fn store(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: Option<&str>,
        raw_tags: Option<&str>,
        payload: &serde_json::Value,
    ) -> Result<StoreOutcome> {
        if let Some(id) = object_id {
            check_name("object_id", id)?;
        }
        let tag_list = ident::parse_tag_list(raw_tags)?;

        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::store_object(
                tx,
                &tables,
                client_id,
                namespace_id,
                object_id,
                tag_list.as_deref(),
                payload,
            )
        })
    }

    /// Retrieve the head revision of an object, a specific revision, or the
    /// head restricted to objects carrying `tag`. Set `include_revisions` to
    /// attach the full revision history.
    pub fn retrieve(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: &str,
        revision_id: Option<&str>,
        tag: Option<&str>,
        include_revisions: bool,
    ) -> Result<RetrievedObject> {
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::retrieve_object(
                tx,
                &tables,
                client_id,
                namespace_id,
                object_id,
                revision_id,
                tag,
                include_revisions,
            )
        })
    }

    /// Delete one revision of an object, or the whole object. Deleting the
    /// last revision purges the object's tag bindings.
    pub fn delete(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: &str,
        revision_id: Option<&str>,
    ) -> Result<()> {
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::delete_object(
                tx,
                &tables,
                client_id,
                namespace_id,
                object_id,
                revision_id,
            )
        })
    }

    /// List an object's revisions, newest first.
    pub fn object_revisions(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: &str,
    ) -> Result<Vec<RevisionInfo>> {
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            let revisions =
                objects::list_revisions(tx, &tables, client_id, namespace_id, object_id)?;
            if revisions.is_empty() {
                return Err(Error::NotFound(format!(
                    "Object not found: {}/{}",
                    namespace_id, object_id
                )));
            }
            Ok(revisions)
        })
    }

    /// List the distinct object ids in a namespace, optionally restricted to
    /// objects carrying `tag`. An empty list is a valid result.
    pub fn namespace_query(
        &self,
        client_id: &str,
        namespace_id: &str,
        tag: Option<&str>,
    ) -> Result<Vec<String>> {
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::namespace_objects(tx, &tables, client_id, namespace_id, tag)
        })
    }

    /// Clear a namespace, entirely or restricted to the named tags.
    ///
    /// Destructive, so `confirm` must be true.
    pub fn clear_namespace(
        &self,
        client_id: &str,
        namespace_id: &str,
        raw_tags: Option<&str>,
        confirm: bool,
    ) -> Result<()> {
        if !confirm {
            return Err(Error::InvalidArgument(
                "Missing required parameter: confirm=true".to_string(),
            ));
        }
        let tag_list = ident::parse_tag_list(raw_tags)?;

        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::clear_namespace(
                tx,
                &tables,
                client_id,
                namespace_id,
                tag_list.as_deref(),
            )
        })
    }

    /// List mapping rows across the whole table, optionally filtered by
    /// namespace. `NotFound` when no row matches.
    pub fn list_mappings(&self, namespace_id: Option<&str>) -> Result<Vec<Mapping>> {
        self.with_request(|tx| {
            schema::ensure_mapping_table(tx)?;
            let mappings = self.registry.list(tx, namespace_id)?;
            if mappings.is_empty() {
                return Err(Error::NotFound("No mappings found".to_string()));
            }
            Ok(mappings)
        })
    }

    /// Get the current tag list of an object.
    pub fn get_tags(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: &str,
    ) -> Result<Vec<String>> {
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::require_object(tx, &tables, client_id, namespace_id, object_id)?;
            tags::read_tags(tx, &tables, client_id, namespace_id, object_id)
        })
    }

    /// Add tags to an object. Returns the updated tag list.
    pub fn add_tags(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: &str,
        raw_tags: &str,
    ) -> Result<Vec<String>> {
        let tag_list = required_tags(raw_tags)?;
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::require_object(tx, &tables, client_id, namespace_id, object_id)?;
            tags::insert_tags(tx, &tables, client_id, namespace_id, object_id, &tag_list)?;
            tags::refresh_snapshot(tx, &tables, client_id, namespace_id, object_id)
        })
    }

    /// Replace an object's tag set. Returns the updated tag list.
    pub fn replace_tags(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: &str,
        raw_tags: &str,
    ) -> Result<Vec<String>> {
        let tag_list = required_tags(raw_tags)?;
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::require_object(tx, &tables, client_id, namespace_id, object_id)?;
            tags::delete_tags(tx, &tables, client_id, namespace_id, object_id, None)?;
            tags::insert_tags(tx, &tables, client_id, namespace_id, object_id, &tag_list)?;
            tags::refresh_snapshot(tx, &tables, client_id, namespace_id, object_id)
        })
    }

    /// Remove the named tags from an object, or all of them when `raw_tags`
    /// is absent. Returns the updated tag list.
    pub fn remove_tags(
        &self,
        client_id: &str,
        namespace_id: &str,
        object_id: &str,
        raw_tags: Option<&str>,
    ) -> Result<Vec<String>> {
        let tag_list = ident::parse_tag_list(raw_tags)?;
        self.with_request(|tx| {
            let tables = self.namespace_tables(tx, client_id, namespace_id)?;
            objects::require_object(tx, &tables, client_id, namespace_id, object_id)?;
            tags::delete_tags(
                tx,
                &tables,
                client_id,
                namespace_id,
                object_id,
                tag_list.as_deref(),
            )?;
            tags::refresh_snapshot(tx, &tables, client_id, namespace_id, object_id)
        })
    }
}

fn check_name(what: &str, value: &str) -> Result<()> {
    if ident::is_valid_name(value) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "invalid {}: {}",
            what, value
        )))
    }
}

fn required_tags(raw_tags: &str) -> Result<Vec<String>> {
    match ident::parse_tag_list(Some(raw_tags))? {
        Some(tags) if !tags.is_empty() => Ok(tags),
        _ => Err(Error::InvalidArgument(format!(
            "no valid tags in: {}",
            raw_tags
        ))),
    }
}
