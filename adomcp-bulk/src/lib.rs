#![deny(missing_docs)]
//! Unified bulk-operation engine (C6): applies a typed sequence of actions
//! to a selector-resolved subset of a query handle's items.
//!
//! [`BulkEngine`] is the only entry point most callers need. It consumes a
//! handle id plus an [`adomcp_types::ItemSelector`], resolves the selector
//! via [`adomcp_handles::QueryHandleService`], and for each action in order
//! applies it to every resolved item with bounded concurrency, recording an
//! [`adomcp_types::OperationRecord`] in [`adomcp_handles::OperationHistoryStore`]
//! for every attempt (including dry-run and skip). `BulkEngine::undo`
//! replays those records' inverses to restore prior state.

mod action;
mod engine;
mod inverse;
pub mod sampling;

pub use action::ApplyResult;
pub use engine::{ActionOutcome, BulkEngine, BulkOptions, BulkResult, ItemOutcomes, UndoItemResult, UndoResult};
pub use sampling::{AiDecision, LlmSamplingChannel, SamplingRequest};
