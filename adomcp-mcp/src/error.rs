//! Error type for the MCP stdio server.

/// Errors raised while serving the MCP protocol over stdio.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum McpError {
    /// Transport setup or the serve loop itself failed.
    #[error("mcp connection error: {0}")]
    Connection(String),
}
