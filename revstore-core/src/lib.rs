//! # revstore-core
//!
//! Core library for revstore - a multi-tenant, namespaced, revisioned JSON
//! object store.
//!
//! This library provides:
//! - Domain types for mappings, object revisions and tags
//! - The SQLite storage engine with per-namespace physical tables
//! - Content-addressed writes: a payload semantically equal to the current
//!   head returns the existing revision, anything else appends a new one
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Every (client_id, namespace_id) pair maps to one `objects_<suffix>` table
//! and one `objects_tags_<suffix>` table. The mapping lives in a fixed
//! `objects_mapping` table fronted by a process-wide cache. Each request runs
//! inside its own connection and transaction.
//!
//! ## Example
//!
//! ```rust,no_run
//! use revstore_core::{Config, Database, ObjectStore};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&config.database).expect("failed to open database");
//! let store = ObjectStore::new(db);
//!
//! let outcome = store
//!     .store("client-a", "notes", None, None, &serde_json::json!({"title": "hello"}))
//!     .expect("store failed");
//! assert!(outcome.new_version);
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use store::{Database, MappingRegistry, ObjectStore};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod ident;
pub mod logging;
pub mod store;
pub mod types;
