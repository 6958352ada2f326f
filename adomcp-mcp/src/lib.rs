#![deny(missing_docs)]
//! MCP stdio server exposing Azure DevOps query/handle/bulk tools.
//!
//! [`McpServer`] wraps an [`adomcp_tool::ToolRegistry`] and exposes its tools
//! over the MCP protocol via stdio. [`tools`] provides the concrete
//! [`adomcp_tool::ToolDyn`] implementations that translate MCP tool calls into
//! calls against the query, handle, and bulk-operation engines.

pub mod error;
pub mod server;
pub mod tools;

pub use error::McpError;
pub use server::McpServer;
