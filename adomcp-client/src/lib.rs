#![deny(missing_docs)]
//! Typed HTTP client for the Azure DevOps work-item REST API.
//!
//! [`AdoClient`] is deliberately thin: it knows how to sign, retry, and
//! decode requests against one `(organization, project)` pair, and maps
//! every failure onto [`adomcp_types::AdoClientError`]. Query composition
//! and bulk-mutation orchestration live in `adomcp-query` and `adomcp-bulk`.

mod client;
mod error;
mod retry;
pub mod token;
pub mod wire;

pub use client::{AdoClient, DEFAULT_API_VERSION};
pub use token::TokenProvider;
