//! Namespace to physical-table mapping
//!
//! Each (client_id, namespace_id) pair owns a short suffix naming its object
//! and tag tables. Resolution goes through a process-wide cache. Mappings are
//! never deleted, so cached entries stay valid for the process lifetime and
//! the cache needs no eviction.

use std::collections::HashMap;
use std::sync::RwLock;

use rusqlite::{params, Connection, OptionalExtension, ToSql};

use crate::error::{Error, Result};
use crate::ident;
use crate::types::Mapping;

use super::now_timestamp;
use super::schema::MAPPING_TABLE;

/// Process-wide registry of namespace table suffixes.
///
/// Safe for parallel readers with occasional writers. Owned by the process
/// and injected into the engine rather than living in a global.
pub struct MappingRegistry {
    cache: RwLock<HashMap<(String, String), String>>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve the table suffix for a (client, namespace) pair, minting a new
    /// mapping row on first use.
    pub fn resolve(&self, conn: &Connection, client_id: &str, namespace_id: &str) -> Result<String> {
        let key = (client_id.to_string(), namespace_id.to_string());
        if let Some(identifier) = self.cache.read().unwrap().get(&key) {
            return Ok(identifier.clone());
        }

        if let Some(identifier) = self.read_mapping(conn, client_id, namespace_id)? {
            self.cache.write().unwrap().insert(key, identifier.clone());
            return Ok(identifier);
        }

        // Freshly minted rows are not cached here: the insert belongs to the
        // caller's transaction and could still roll back. The next resolve
        // reads the committed row and caches it then.
        self.insert_mapping(conn, client_id, namespace_id)
    }

    fn read_mapping(
        &self,
        conn: &Connection,
        client_id: &str,
        namespace_id: &str,
    ) -> Result<Option<String>> {
        conn.query_row(
            &format!(
                "SELECT identifier_name FROM {} WHERE client_id = ?1 AND namespace_id = ?2",
                MAPPING_TABLE
            ),
            params![client_id, namespace_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(Error::from)
    }

    fn suffix_in_use(&self, conn: &Connection, suffix: &str) -> Result<bool> {
        let row: Option<i64> = conn
            .query_row(
                &format!(
                    "SELECT 1 FROM {} WHERE identifier_name = ?1",
                    MAPPING_TABLE
                ),
                [suffix],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    fn insert_mapping(
        &self,
        conn: &Connection,
        client_id: &str,
        namespace_id: &str,
    ) -> Result<String> {
        const MAX_ATTEMPTS: usize = 16;

        for _ in 0..MAX_ATTEMPTS {
            let suffix = loop {
                let candidate = ident::new_suffix();
                if !self.suffix_in_use(conn, &candidate)? {
                    break candidate;
                }
                tracing::debug!(suffix = %candidate, "Suffix already mapped, generating another");
            };

            match conn.execute(
                &format!(
                    "INSERT INTO {} (client_id, namespace_id, identifier_name, created_at) \
                     VALUES (?1, ?2, ?3, ?4)",
                    MAPPING_TABLE
                ),
                params![client_id, namespace_id, suffix, now_timestamp()],
            ) {
                Ok(_) => {
                    tracing::info!(client_id, namespace_id, suffix = %suffix, "Created namespace mapping");
                    return Ok(suffix);
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    // A concurrent request can win the insert race; adopt its
                    // suffix. If the row is still absent, the conflict was on
                    // identifier_name: retry with a fresh suffix.
                    if let Some(existing) = self.read_mapping(conn, client_id, namespace_id)? {
                        return Ok(existing);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::Internal(format!(
            "could not mint a mapping suffix for {}/{}",
            client_id, namespace_id
        )))
    }

    /// List mapping rows, optionally filtered by namespace, ordered by
    /// (client_id, namespace_id) ascending.
    pub fn list(&self, conn: &Connection, namespace_id: Option<&str>) -> Result<Vec<Mapping>> {
        let mut sql = format!(
            "SELECT client_id, namespace_id, identifier_name, created_at FROM {}",
            MAPPING_TABLE
        );
        let mut query_params: Vec<&dyn ToSql> = Vec::new();
        if let Some(ns) = &namespace_id {
            sql.push_str(" WHERE namespace_id = ?1");
            query_params.push(ns);
        }
        sql.push_str(" ORDER BY client_id, namespace_id ASC");

        let mut stmt = conn.prepare(&sql)?;
        let mappings = stmt
            .query_map(query_params.as_slice(), |row| {
                Ok(Mapping {
                    client_id: row.get(0)?,
                    namespace_id: row.get(1)?,
                    identifier_name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(mappings)
    }
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
