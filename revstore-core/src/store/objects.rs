//! Object store engine internals
//!
//! Content-dedup writes, revisioned retrieval, deletes and namespace queries
//! against the per-namespace physical tables. Every function here expects to
//! run inside the caller's transaction.

use rusqlite::{params, Connection, OptionalExtension, ToSql};

use crate::error::{Error, Result};
use crate::ident;
use crate::types::{RetrievedObject, RevisionInfo, StoreOutcome};

use super::now_timestamp;
use super::schema::NamespaceTables;
use super::tags;

/// The head revision row of an object.
struct HeadRevision {
    object_json: String,
    revision_id: String,
    created_at: String,
}

/// Read the head revision for an object, newest first.
///
/// Equal timestamps resolve by insertion order so a store immediately
/// followed by a retrieve returns what was stored.
fn head_revision(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
) -> Result<Option<HeadRevision>> {
    conn.query_row(
        &format!(
            "SELECT object_json, revision_id, created_at FROM {} \
             WHERE client_id = ?1 AND namespace_id = ?2 AND object_id = ?3 \
             ORDER BY created_at DESC, rowid DESC",
            tables.objects
        ),
        params![client_id, namespace_id, object_id],
        |row| {
            Ok(HeadRevision {
                object_json: row.get(0)?,
                revision_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn object_exists(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
) -> Result<bool> {
    let row: Option<i64> = conn
        .query_row(
            &format!(
                "SELECT 1 FROM {} WHERE client_id = ?1 AND namespace_id = ?2 AND object_id = ?3",
                tables.objects
            ),
            params![client_id, namespace_id, object_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(row.is_some())
}

/// Require the object to have at least one revision.
pub fn require_object(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
) -> Result<()> {
    if object_exists(conn, tables, client_id, namespace_id, object_id)? {
        Ok(())
    } else {
        Err(Error::NotFound(format!(
            "Object not found: {}/{}",
            namespace_id, object_id
        )))
    }
}

/// Store a payload, creating a new revision only when it differs from the
/// head.
///
/// Comparison is semantic JSON equality: maps compared as unordered
/// key-value sets, arrays ordered. Submitted tags are insert-or-ignored and
/// the tag snapshot is refreshed on every revision row.
pub fn store_object(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: Option<&str>,
    tag_list: Option<&[String]>,
    payload: &serde_json::Value,
) -> Result<StoreOutcome> {
    let object_id = match object_id {
        Some(id) => id.to_string(),
        None => ident::new_object_id(),
    };

    let head = head_revision(conn, tables, client_id, namespace_id, &object_id)?;
    let now = now_timestamp();

    let (revision_id, object_timestamp, new_version) = match head {
        Some(head) => {
            let stored: serde_json::Value = serde_json::from_str(&head.object_json)?;
            if stored == *payload {
                tracing::debug!(object_id = %object_id, "Existing stored object matches");
                (head.revision_id, head.created_at, false)
            } else {
                tracing::debug!(object_id = %object_id, "Existing stored object differs");
                (ident::new_revision_id(), now.clone(), true)
            }
        }
        None => {
            tracing::debug!(object_id = %object_id, "No existing stored object");
            (ident::new_revision_id(), now.clone(), true)
        }
    };

    if new_version {
        conn.execute(
            &format!(
                "INSERT INTO {} (client_id, namespace_id, object_id, revision_id, object_json, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                tables.objects
            ),
            params![
                client_id,
                namespace_id,
                object_id,
                revision_id,
                serde_json::to_string(payload)?,
                object_timestamp
            ],
        )?;
    }

    if let Some(tag_list) = tag_list {
        tags::insert_tags(conn, tables, client_id, namespace_id, &object_id, tag_list)?;
    }
    tags::refresh_snapshot(conn, tables, client_id, namespace_id, &object_id)?;

    Ok(StoreOutcome {
        object_id,
        revision_id,
        new_version,
        tags: tag_list.map(|t| t.to_vec()),
        object_timestamp,
    })
}

/// Retrieve the head revision of an object, or a specific revision, or the
/// head among revisions of objects carrying a tag.
pub fn retrieve_object(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
    revision_id: Option<&str>,
    tag: Option<&str>,
    include_revisions: bool,
) -> Result<RetrievedObject> {
    let mut from_clause = format!("FROM {} o", tables.objects);
    let mut where_clause =
        String::from("WHERE o.client_id = ? AND o.namespace_id = ? AND o.object_id = ?");
    let mut query_params: Vec<&dyn ToSql> = vec![&client_id, &namespace_id, &object_id];

    if let Some(rev) = &revision_id {
        where_clause.push_str(" AND o.revision_id = ?");
        query_params.push(rev);
    }

    if let Some(tag) = &tag {
        from_clause.push_str(&format!(
            " INNER JOIN {} t ON o.client_id = t.client_id \
             AND o.namespace_id = t.namespace_id AND o.object_id = t.object_id",
            tables.tags
        ));
        where_clause.push_str(" AND t.object_tag = ?");
        query_params.push(tag);
    }

    let sql = format!(
        "SELECT o.client_id, o.namespace_id, o.object_id, o.revision_id, o.object_json, \
         o.object_tags, o.created_at {} {} ORDER BY o.created_at DESC, o.rowid DESC",
        from_clause, where_clause
    );

    let row = conn
        .query_row(&sql, query_params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .optional()?;

    let (client_id, namespace_id, object_id, revision, object_json, object_tags, created_at) =
        match row {
            Some(row) => row,
            None => {
                return Err(Error::NotFound(match revision_id {
                    Some(rev) => format!(
                        "Object '{}/{}' not found with revision: {}",
                        namespace_id, object_id, rev
                    ),
                    None => format!("Object not found: {}/{}", namespace_id, object_id),
                }))
            }
        };

    let revisions = if include_revisions {
        Some(list_revisions(
            conn,
            tables,
            &client_id,
            &namespace_id,
            &object_id,
        )?)
    } else {
        None
    };

    Ok(RetrievedObject {
        object: serde_json::from_str(&object_json)?,
        object_tags: match object_tags {
            Some(json) => serde_json::from_str(&json)?,
            None => Vec::new(),
        },
        client_id,
        namespace_id,
        object_id,
        revision_id: revision,
        object_timestamp: created_at,
        revisions,
    })
}

/// List an object's revisions, newest first.
pub fn list_revisions(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
) -> Result<Vec<RevisionInfo>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT revision_id, created_at FROM {} \
         WHERE client_id = ?1 AND namespace_id = ?2 AND object_id = ?3 \
         ORDER BY created_at DESC, rowid DESC",
        tables.objects
    ))?;
    let revisions = stmt
        .query_map(params![client_id, namespace_id, object_id], |row| {
            Ok(RevisionInfo {
                revision_id: row.get(0)?,
                timestamp: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(revisions)
}

/// Delete one revision or a whole object. Tag bindings are purged once no
/// revision remains.
pub fn delete_object(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
    revision_id: Option<&str>,
) -> Result<()> {
    let exists = match revision_id {
        Some(rev) => {
            let row: Option<i64> = conn
                .query_row(
                    &format!(
                        "SELECT 1 FROM {} WHERE client_id = ?1 AND namespace_id = ?2 \
                         AND object_id = ?3 AND revision_id = ?4",
                        tables.objects
                    ),
                    params![client_id, namespace_id, object_id, rev],
                    |row| row.get(0),
                )
                .optional()?;
            row.is_some()
        }
        None => object_exists(conn, tables, client_id, namespace_id, object_id)?,
    };

    if !exists {
        return Err(Error::NotFound(match revision_id {
            Some(rev) => format!(
                "Object '{}/{}' not found with revision: {}",
                namespace_id, object_id, rev
            ),
            None => format!("Object not found: {}/{}", namespace_id, object_id),
        }));
    }

    match revision_id {
        Some(rev) => {
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE client_id = ?1 AND namespace_id = ?2 \
                     AND object_id = ?3 AND revision_id = ?4",
                    tables.objects
                ),
                params![client_id, namespace_id, object_id, rev],
            )?;
        }
        None => {
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE client_id = ?1 AND namespace_id = ?2 AND object_id = ?3",
                    tables.objects
                ),
                params![client_id, namespace_id, object_id],
            )?;
        }
    }

    if !object_exists(conn, tables, client_id, namespace_id, object_id)? {
        tags::delete_tags(conn, tables, client_id, namespace_id, object_id, None)?;
    }

    Ok(())
}

/// List the distinct object ids in a namespace, optionally restricted to
/// objects carrying a tag.
pub fn namespace_objects(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    tag: Option<&str>,
) -> Result<Vec<String>> {
    let mut from_clause = format!("FROM {} o", tables.objects);
    let mut where_clause = String::from("WHERE o.client_id = ? AND o.namespace_id = ?");
    let mut query_params: Vec<&dyn ToSql> = vec![&client_id, &namespace_id];

    if let Some(tag) = &tag {
        from_clause.push_str(&format!(
            " INNER JOIN {} t ON o.client_id = t.client_id \
             AND o.namespace_id = t.namespace_id AND o.object_id = t.object_id",
            tables.tags
        ));
        where_clause.push_str(" AND t.object_tag = ?");
        query_params.push(tag);
    }

    let sql = format!(
        "SELECT DISTINCT o.object_id {} {}",
        from_clause, where_clause
    );

    let mut stmt = conn.prepare(&sql)?;
    let object_ids = stmt
        .query_map(query_params.as_slice(), |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(object_ids)
}

/// Clear a namespace: everything, or only objects bound to the named tags.
///
/// With tags, object rows are deleted before their bindings; the set-based
/// subquery reads the tag table, so the bindings must still be present.
pub fn clear_namespace(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    tag_list: Option<&[String]>,
) -> Result<()> {
    let tag_list = tag_list.filter(|tags| !tags.is_empty());

    match tag_list {
        Some(tag_list) => {
            let placeholders = vec!["?"; tag_list.len()].join(", ");
            let sql = format!(
                "DELETE FROM {} WHERE client_id = ? AND namespace_id = ? AND object_id IN \
                 (SELECT object_id FROM {} WHERE client_id = ? AND namespace_id = ? \
                 AND object_tag IN ({}))",
                tables.objects, tables.tags, placeholders
            );
            let mut query_params: Vec<&dyn ToSql> =
                vec![&client_id, &namespace_id, &client_id, &namespace_id];
            for tag in tag_list {
                query_params.push(tag);
            }
            let deleted = conn.execute(&sql, query_params.as_slice())?;
            tracing::debug!(namespace_id, deleted, "Cleared tagged object rows");

            tags::delete_namespace_tags(conn, tables, client_id, namespace_id, Some(tag_list))?;
        }
        None => {
            tags::delete_namespace_tags(conn, tables, client_id, namespace_id, None)?;
            let deleted = conn.execute(
                &format!(
                    "DELETE FROM {} WHERE client_id = ?1 AND namespace_id = ?2",
                    tables.objects
                ),
                params![client_id, namespace_id],
            )?;
            tracing::debug!(namespace_id, deleted, "Cleared namespace");
        }
    }

    Ok(())
}
