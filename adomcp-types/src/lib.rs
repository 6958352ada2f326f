#![deny(missing_docs)]
//! Shared domain types, error taxonomy, and configuration for the Azure
//! DevOps work-item MCP tool server.
//!
//! This crate has no I/O of its own: it is the vocabulary every other
//! component (`adomcp-client`, `adomcp-analyzer`, `adomcp-query`,
//! `adomcp-handles`, `adomcp-bulk`) shares so that a `QueryHandle` minted by
//! one component is directly usable by another.

pub mod config;
pub mod error;
pub mod model;
pub mod response;

pub use config::{ConfigError, ServerConfig};
pub use error::{AdoClientError, BulkError, Categorized, ErrorCategory, HandleError, QueryError};
pub use model::{
    Action, AnalysisMetadata, CriteriaFilter, FieldValue, Identity, ItemContext, ItemSelector,
    OperationRecord, Outcome, QueryHandle, QueryKind, SelectionMetadata, StalenessInfo,
    StopOnError, WorkItemRelation, WorkItemSnapshot,
};
pub use response::Envelope;
