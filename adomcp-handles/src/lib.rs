#![deny(missing_docs)]
//! Query handle storage, TTL eviction, selector resolution, and the
//! append-only operation history that backs undo.
//!
//! Two collaborating stores:
//!
//! - [`QueryHandleService`] owns `QueryHandle`s: it mints them, serves reads
//!   under a read-many/write-rare lock, and evicts expired ones on a
//!   background sweep.
//! - [`OperationHistoryStore`] owns the append-only log of
//!   [`adomcp_types::OperationRecord`]s the bulk engine appends to, keyed by
//!   handle id, and exposes the records eligible for undo.

mod history;
mod store;

pub use history::OperationHistoryStore;
pub use store::{HandleDescription, QueryHandleService, DEFAULT_TTL};
