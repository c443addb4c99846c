//! SQLite persistence for the health-check engine.
//!
//! Two stores live here: [`EndpointStore`] holds monitored endpoint
//! configurations (CRUD plus validation), and [`ResultStore`] holds
//! probe results: an append-only outcome log and last-write-wins
//! SSL/domain status rows, with uptime aggregation on top.

pub mod endpoint_store;
pub mod error;
pub mod result_store;

pub use endpoint_store::EndpointStore;
pub use error::{Result, StorageError};
pub use result_store::{ResultStore, SqliteResultStore};
