//! HTTP surface for the revstore object store
//!
//! Exposes the storage engine over `/svc/v1` with header-or-query client
//! authentication. The router lives in a library so integration tests can
//! drive it without binding a socket.

pub mod auth;
pub mod error;
pub mod routes;

pub use routes::{router, AppState};
