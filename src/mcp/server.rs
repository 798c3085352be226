//! Memory MCP Server implementation

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::commands::{list, status};
use mnemosyne::{snippet, HarvestOutcome, Mnemosyne, PagePayload, ServiceError, TimeFilter};

const MAX_LIMIT: usize = 100;

/// Parameters for memory_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Natural language search query (e.g., "rust borrow checker article")
    #[schemars(description = "Natural language search query")]
    pub query: String,
    #[schemars(description = "Time window: all, 24h, 7d, 30d (default: configured filter)")]
    #[serde(default)]
    pub time_filter: Option<String>,
    #[schemars(description = "Maximum number of results (default: configured search limit)")]
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteParams {
    #[schemars(description = "URL of the page to forget")]
    pub url: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListParams {
    #[schemars(description = "Maximum results (default: 50)")]
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}

/// Parameters for memory_harvest tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct HarvestParams {
    #[schemars(description = "Page URL")]
    pub url: String,
    #[schemars(description = "Page title")]
    pub title: String,
    #[schemars(description = "Semantic text to embed, e.g. 'Title: ... Content: ...'")]
    pub text: String,
    #[schemars(description = "Favicon URL")]
    #[serde(default)]
    pub favicon: Option<String>,
}

/// Search result for JSON output
#[derive(Debug, Serialize)]
struct SearchResultJson {
    url: String,
    title: String,
    snippet: String,
    timestamp: i64,
    score: f32,
}

/// Memory MCP Service
#[derive(Clone)]
pub struct MemoryService {
    app: Arc<Mnemosyne>,
    database: PathBuf,
    tool_router: ToolRouter<Self>,
}

impl MemoryService {
    pub fn new(app: Arc<Mnemosyne>, database: PathBuf) -> Self {
        Self {
            app,
            database,
            tool_router: Self::tool_router(),
        }
    }
}

fn internal(e: impl std::fmt::Display) -> McpError {
    McpError::internal_error(e.to_string(), None)
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| internal(format!("JSON serialization failed: {}", e)))?;
    Ok(CallToolResult::success(vec![Content::text(output)]))
}

#[tool_router]
impl MemoryService {
    #[tool(description = "Search remembered web pages by meaning, boosted by keyword matches in title and text. Optionally restrict to the last 24h, 7d or 30d.")]
    async fn memory_search(
        &self,
        params: Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let config = self.app.config();
        let time_filter = match params.0.time_filter.as_deref() {
            Some(raw) => raw
                .parse::<TimeFilter>()
                .map_err(|e| McpError::invalid_params(e, None))?,
            None => config.default_time_filter,
        };
        // Clamp limit (DoS prevention)
        let limit = params.0.limit.unwrap_or(config.search_limit).clamp(1, MAX_LIMIT);

        let results = match self.app.search(&params.0.query, time_filter, limit).await {
            Ok(results) => results,
            // Bad input, not a server fault
            Err(ServiceError::Embedding(e)) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Search failed: {}",
                    e
                ))]))
            }
            Err(e) => return Err(internal(e)),
        };

        let json_results: Vec<SearchResultJson> = results
            .into_iter()
            .map(|r| SearchResultJson {
                snippet: snippet(&r.record.text, config.snippet_chars),
                url: r.record.url,
                title: r.record.title,
                timestamp: r.record.timestamp,
                score: r.score,
            })
            .collect();

        json_result(&json_results)
    }

    #[tool(description = "Remember a web page: embeds its text and stores it under its URL, replacing any earlier version.")]
    async fn memory_harvest(
        &self,
        params: Parameters<HarvestParams>,
    ) -> Result<CallToolResult, McpError> {
        let HarvestParams {
            url,
            title,
            text,
            favicon,
        } = params.0;

        let outcome = self
            .app
            .handle_harvest(PagePayload {
                url,
                title,
                text,
                favicon,
            })
            .await;

        match outcome {
            HarvestOutcome::Saved { url } => Ok(CallToolResult::success(vec![Content::text(
                format!("Memory saved: {}", url),
            )])),
            HarvestOutcome::Abandoned { url, reason } => Ok(CallToolResult::error(vec![
                Content::text(format!("Harvest of {} abandoned: {}", url, reason)),
            ])),
        }
    }

    #[tool(description = "Forget a remembered page by URL. Unknown URLs are ignored.")]
    async fn memory_delete(
        &self,
        params: Parameters<DeleteParams>,
    ) -> Result<CallToolResult, McpError> {
        self.app.delete(&params.0.url).await.map_err(internal)?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "Forgot {}",
            params.0.url
        ))]))
    }

    #[tool(description = "List remembered pages, newest first.")]
    async fn memory_list(
        &self,
        params: Parameters<ListParams>,
    ) -> Result<CallToolResult, McpError> {
        // Clamp limit: max 500
        let limit = params.0.limit.clamp(1, 500);
        let memories = list::collect(&self.app, Some(limit)).await.map_err(internal)?;
        json_result(&memories)
    }

    #[tool(description = "Memory store totals: page count, oldest and newest timestamps, vector dimensions, schema version, database size, and whether the embedding model is loaded yet.")]
    async fn memory_status(&self) -> Result<CallToolResult, McpError> {
        let status = status::collect(&self.app, &self.database)
            .await
            .map_err(internal)?;
        json_result(&status)
    }
}

#[tool_handler]
impl ServerHandler for MemoryService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Mnemosyne MCP Server. Semantic memory of visited web pages with hybrid vector and keyword search.".to_string()
            ),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(app: Arc<Mnemosyne>, database: PathBuf) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let service = MemoryService::new(app, database);
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
