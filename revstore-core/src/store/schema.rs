//! Physical schema management
//!
//! The mapping table has a fixed name. Object and tag tables are provisioned
//! per (client_id, namespace_id) pair, named by a short suffix resolved
//! through the [`MappingRegistry`](super::MappingRegistry). All DDL is
//! idempotent so provisioning can run on every request.

use rusqlite::Connection;

use crate::error::{Error, Result};
use crate::ident;

/// Fixed name of the namespace mapping table.
pub const MAPPING_TABLE: &str = "objects_mapping";

const OBJECTS_PREFIX: &str = "objects_";
const TAGS_PREFIX: &str = "objects_tags_";

/// Physical table names backing one (client_id, namespace_id) pair.
#[derive(Debug, Clone)]
pub struct NamespaceTables {
    /// Object revision table, `objects_<suffix>`
    pub objects: String,
    /// Tag binding table, `objects_tags_<suffix>`
    pub tags: String,
}

impl NamespaceTables {
    /// Build table names from a mapping suffix.
    ///
    /// The suffix is re-validated here because it is interpolated into SQL;
    /// only `objects_` and `objects_tags_` prefixed names can be produced.
    pub fn for_suffix(suffix: &str) -> Result<Self> {
        if !ident::is_valid_suffix(suffix) {
            return Err(Error::InvalidArgument(format!(
                "invalid table suffix: {}",
                suffix
            )));
        }
        Ok(Self {
            objects: format!("{}{}", OBJECTS_PREFIX, suffix),
            tags: format!("{}{}", TAGS_PREFIX, suffix),
        })
    }
}

/// Create the mapping table (and its identifier uniqueness index) if absent.
pub fn ensure_mapping_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            client_id       TEXT NOT NULL,
            namespace_id    TEXT NOT NULL,
            identifier_name TEXT NOT NULL,
            created_at      DATETIME,
            PRIMARY KEY (client_id, namespace_id)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_identifier
            ON {table} (identifier_name);
        "#,
        table = MAPPING_TABLE
    ))?;
    Ok(())
}

/// Create the object and tag tables for one namespace if absent.
pub fn ensure_namespace_tables(conn: &Connection, tables: &NamespaceTables) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {objects} (
            client_id    TEXT NOT NULL,
            namespace_id TEXT NOT NULL,
            object_id    TEXT NOT NULL,
            revision_id  TEXT NOT NULL,
            object_json  JSON,
            object_tags  JSON,
            created_at   DATETIME,
            PRIMARY KEY (client_id, namespace_id, object_id, revision_id)
        );

        CREATE TABLE IF NOT EXISTS {tags} (
            client_id    TEXT NOT NULL,
            namespace_id TEXT NOT NULL,
            object_id    TEXT NOT NULL,
            object_tag   TEXT,
            created_at   DATETIME,
            PRIMARY KEY (client_id, namespace_id, object_id, object_tag)
        );
        "#,
        objects = tables.objects,
        tags = tables.tags,
    ))?;
    Ok(())
}
