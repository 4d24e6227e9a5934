//! Core domain types for revstore
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Namespace** | A client-chosen label partitioning objects within a tenant |
//! | **Mapping** | The record tying (client_id, namespace_id) to a physical table suffix |
//! | **Revision** | One historical version of an object's JSON body |
//! | **Head revision** | The most recently created revision of an object |
//! | **Tag** | A free-form label attached to an object (not to a revision) |
//!
//! Timestamps are carried as the RFC 3339 strings stored in the database so
//! that responses echo exactly what was written.

use serde::{Deserialize, Serialize};

/// A namespace-to-physical-table mapping row.
///
/// Created on first write to a namespace, never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    /// Tenant identifier
    pub client_id: String,
    /// Namespace within the tenant
    pub namespace_id: String,
    /// Six-character suffix shared by the namespace's object and tag tables
    pub identifier_name: String,
    /// When the mapping was minted
    pub created_at: String,
}

/// One entry in an object's revision history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionInfo {
    /// Revision identifier
    pub revision_id: String,
    /// When the revision was created
    pub timestamp: String,
}

/// Result of a store operation.
#[derive(Debug, Clone, Serialize)]
pub struct StoreOutcome {
    /// The object identifier, minted if the caller did not supply one
    pub object_id: String,
    /// Head revision after the store; reused when the payload matched
    pub revision_id: String,
    /// True when a new revision row was created
    pub new_version: bool,
    /// The tags submitted with the request, if any
    pub tags: Option<Vec<String>>,
    /// Creation time of the returned revision
    pub object_timestamp: String,
}

/// A retrieved object revision with its tag snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedObject {
    /// Tenant identifier
    pub client_id: String,
    /// Namespace within the tenant
    pub namespace_id: String,
    /// Object identifier
    pub object_id: String,
    /// Revision this row represents
    pub revision_id: String,
    /// Current tag set of the parent object
    pub object_tags: Vec<String>,
    /// Creation time of the revision
    pub object_timestamp: String,
    /// The stored JSON document
    pub object: serde_json::Value,
    /// Full revision history, newest first (populated on request)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revisions: Option<Vec<RevisionInfo>>,
}
