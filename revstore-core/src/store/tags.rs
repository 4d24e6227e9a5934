//! Tag index maintenance
//!
//! Tags live in two representations: the normalized per-namespace tag table
//! and a denormalized `object_tags` JSON column carried on every revision row
//! of an object. Any mutation of an object's tag set must rewrite the JSON
//! column within the same transaction, via [`refresh_snapshot`].

use rusqlite::{params, Connection, ToSql};

use crate::error::Result;

use super::now_timestamp;
use super::schema::NamespaceTables;

/// Read the current tag list for an object from the tag table.
pub fn read_tags(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT object_tag FROM {} WHERE client_id = ?1 AND namespace_id = ?2 AND object_id = ?3",
        tables.tags
    ))?;
    let tags = stmt
        .query_map(params![client_id, namespace_id, object_id], |row| {
            row.get(0)
        })?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(tags)
}

/// Insert tag bindings for an object, ignoring ones already present.
pub fn insert_tags(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
    tags: &[String],
) -> Result<()> {
    let now = now_timestamp();
    let mut stmt = conn.prepare(&format!(
        "INSERT OR IGNORE INTO {} (client_id, namespace_id, object_id, object_tag, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        tables.tags
    ))?;
    for tag in tags {
        stmt.execute(params![client_id, namespace_id, object_id, tag, now])?;
    }
    Ok(())
}

/// Delete the named tag bindings for an object, or every binding when `tags`
/// is `None`.
pub fn delete_tags(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
    tags: Option<&[String]>,
) -> Result<()> {
    match tags {
        Some(tags) => {
            let mut stmt = conn.prepare(&format!(
                "DELETE FROM {} WHERE client_id = ?1 AND namespace_id = ?2 AND object_id = ?3 \
                 AND object_tag = ?4",
                tables.tags
            ))?;
            for tag in tags {
                stmt.execute(params![client_id, namespace_id, object_id, tag])?;
            }
        }
        None => {
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE client_id = ?1 AND namespace_id = ?2 AND object_id = ?3",
                    tables.tags
                ),
                params![client_id, namespace_id, object_id],
            )?;
        }
    }
    Ok(())
}

/// Delete every tag binding in the namespace, or only bindings for the named
/// tags.
pub fn delete_namespace_tags(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    tags: Option<&[String]>,
) -> Result<()> {
    match tags {
        Some(tags) if !tags.is_empty() => {
            let placeholders = vec!["?"; tags.len()].join(", ");
            let sql = format!(
                "DELETE FROM {} WHERE client_id = ? AND namespace_id = ? AND object_tag IN ({})",
                tables.tags, placeholders
            );
            let mut query_params: Vec<&dyn ToSql> = vec![&client_id, &namespace_id];
            for tag in tags {
                query_params.push(tag);
            }
            conn.execute(&sql, query_params.as_slice())?;
        }
        _ => {
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE client_id = ?1 AND namespace_id = ?2",
                    tables.tags
                ),
                params![client_id, namespace_id],
            )?;
        }
    }
    Ok(())
}

/// Rewrite the denormalized tag snapshot on every revision row of an object.
///
/// Returns the tag list that was written.
pub fn refresh_snapshot(
    conn: &Connection,
    tables: &NamespaceTables,
    client_id: &str,
    namespace_id: &str,
    object_id: &str,
) -> Result<Vec<String>> {
    let tags = read_tags(conn, tables, client_id, namespace_id, object_id)?;
    conn.execute(
        &format!(
            "UPDATE {} SET object_tags = ?1 WHERE client_id = ?2 AND namespace_id = ?3 \
             AND object_id = ?4",
            tables.objects
        ),
        params![serde_json::to_string(&tags)?, client_id, namespace_id, object_id],
    )?;
    Ok(tags)
}
