//! MCP stdio server binary: loads configuration from the environment, wires
//! the query/handle/bulk engines together, and serves the tool registry over
//! stdio until the client disconnects.

use std::sync::Arc;

use adomcp_bulk::BulkEngine;
use adomcp_client::token::StaticTokenProvider;
use adomcp_client::AdoClient;
use adomcp_handles::{OperationHistoryStore, QueryHandleService};
use adomcp_mcp::{tools, McpError, McpServer};
use adomcp_query::QueryExecutor;
use adomcp_tool::ToolRegistry;
use adomcp_types::{ConfigError, ServerConfig};

#[derive(Debug, thiserror::Error)]
enum MainError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("missing required environment variable: ADO_PAT")]
    MissingPat,
    #[error(transparent)]
    Mcp(#[from] McpError),
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("adomcp-mcp error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), MainError> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = ServerConfig::from_env()?;
    let pat = std::env::var("ADO_PAT").map_err(|_| MainError::MissingPat)?;
    let token_provider = Arc::new(StaticTokenProvider::new(pat));
    let client = Arc::new(
        AdoClient::new(config.organization.clone(), config.project.clone(), token_provider).api_version(config.api_version.clone()),
    );

    let handles = QueryHandleService::new();
    handles.spawn_sweeper().await;
    let history = Arc::new(OperationHistoryStore::new());

    let executor = Arc::new(
        QueryExecutor::new(Arc::clone(&client), Arc::clone(&handles), config.organization.clone(), config.project.clone())
            .with_automation_patterns(config.automation_patterns.clone())
            .with_substantive_fields(config.substantive_fields.clone()),
    );
    let bulk_engine = Arc::new(
        BulkEngine::new(Arc::clone(&client), Arc::clone(&handles), Arc::clone(&history))
            .with_min_confidence_score(config.min_confidence_score)
            .with_concurrency(config.bulk_concurrency),
    );

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(tools::QueryWorkItemsTool::new(executor)));
    registry.register(Arc::new(tools::DescribeQueryHandleTool::new(Arc::clone(&handles))));
    registry.register(Arc::new(tools::SelectItemsFromQueryHandleTool::new(Arc::clone(&handles))));
    registry.register(Arc::new(tools::BulkExecuteTool::new(Arc::clone(&bulk_engine))));
    registry.register(Arc::new(tools::BulkUndoTool::new(bulk_engine)));

    tracing::info!(
        tools = registry.len(),
        organization = %config.organization,
        project = %config.project,
        "starting adomcp mcp server"
    );

    let server = McpServer::new(registry, "adomcp-mcp", env!("CARGO_PKG_VERSION"));
    server.serve_stdio().await?;

    handles.stop_cleanup().await;
    Ok(())
}
