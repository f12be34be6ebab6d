//! MCP server implementation for delve-rs.
//!
//! Exposes the research loop as an MCP tool and the industry profiles as
//! MCP resources.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, CallToolResult, Content, Implementation, ListResourceTemplatesResult,
    ListResourcesResult, PaginatedRequestParams, ProtocolVersion, RawResource, RawResourceTemplate,
    ReadResourceRequestParams, ReadResourceResult, Resource, ResourceContents, ServerCapabilities,
    ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, tool, tool_handler, tool_router};
use tracing::info;

use crate::profile::DEFAULT_PROFILE_ID;
use crate::research::{Orchestrator, RunOutcome};

use super::params::ResearchParams;

/// URI prefix for profile resources.
const PROFILE_URI_PREFIX: &str = "delve://profiles/";

/// delve-rs MCP server.
///
/// Provides the `research` tool and read access to industry profiles.
#[derive(Clone)]
pub struct DelveMcpServer {
    tool_router: ToolRouter<Self>,
    orchestrator: Arc<Orchestrator>,
}

#[tool_router]
impl DelveMcpServer {
    /// Run a full research session and return the report.
    #[tool(
        name = "research",
        description = "Run an iterative deep-research session. Decomposes the question into sub-queries, searches the web, reflects on whether the evidence suffices (up to max_iterations rounds), and writes a report citing sources as [n]. Returns JSON with the report, status, iterations, evidence list and notices."
    )]
    async fn research(
        &self,
        Parameters(params): Parameters<ResearchParams>,
    ) -> Result<CallToolResult, McpError> {
        let profile = params.profile.as_deref().unwrap_or(DEFAULT_PROFILE_ID);
        let max_iterations = params
            .max_iterations
            .unwrap_or_else(|| self.orchestrator.config().max_iterations.get());
        info!(profile, max_iterations, "MCP research call");

        let outcome = self
            .orchestrator
            .research(&params.query, profile, max_iterations)
            .await;

        let json = serde_json::to_string_pretty(&outcome_json(&outcome))
            .map_err(|e| McpError::internal_error(format!("Serialization error: {e}"), None))?;

        if outcome.report.is_empty()
            && let Some(error) = &outcome.error
        {
            return Ok(CallToolResult::error(vec![
                Content::text(error.to_string()),
                Content::text(json),
            ]));
        }
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

fn outcome_json(outcome: &RunOutcome) -> serde_json::Value {
    serde_json::json!({
        "report": outcome.report,
        "complete": outcome.is_complete(),
        "citations": outcome.citations(),
        "error": outcome.error,
        "status": outcome.snapshot.status,
        "iterations": outcome.snapshot.iteration,
        "subqueries_issued": outcome.snapshot.subqueries_issued,
        "evidence": outcome.snapshot.evidence,
        "notices": outcome.snapshot.notices,
    })
}

#[tool_handler]
impl ServerHandler for DelveMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "delve-rs".to_string(),
                title: Some("delve-rs MCP Server".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "delve-rs: iterative deep research with cited reports. Use the `research` tool \
                 with a question and an optional profile id. Browse profiles via resources."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources: Vec<Resource> = self
            .orchestrator
            .profiles()
            .summaries()
            .into_iter()
            .map(|p| {
                let mut raw =
                    RawResource::new(format!("{PROFILE_URI_PREFIX}{}", p.id), p.name.clone());
                raw.description = Some(format!("Industry profile '{}'", p.id));
                raw.mime_type = Some("application/json".to_string());
                raw.no_annotation()
            })
            .collect();

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        ReadResourceRequestParams { uri, .. }: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let id = uri.strip_prefix(PROFILE_URI_PREFIX).ok_or_else(|| {
            McpError::invalid_params(
                format!("Invalid URI, expected {PROFILE_URI_PREFIX}{{id}}: {uri}"),
                None,
            )
        })?;

        let profile = self.orchestrator.profiles().get(id).ok_or_else(|| {
            McpError::resource_not_found(format!("Profile not found: {id}"), None)
        })?;

        let json = serde_json::to_string_pretty(profile.as_ref())
            .map_err(|e| McpError::internal_error(format!("Serialization error: {e}"), None))?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(json, uri.clone())],
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let template = RawResourceTemplate {
            uri_template: format!("{PROFILE_URI_PREFIX}{{id}}"),
            name: "Industry profile".to_string(),
            title: None,
            description: Some(
                "Returns the prompts, templates and analyzer keywords of a profile as JSON."
                    .to_string(),
            ),
            mime_type: Some("application/json".to_string()),
            icons: None,
        };

        Ok(ListResourceTemplatesResult {
            resource_templates: vec![template.no_annotation()],
            next_cursor: None,
            meta: None,
        })
    }
}

impl DelveMcpServer {
    /// Creates a new MCP server around an orchestrator.
    #[must_use]
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            tool_router: Self::tool_router(),
            orchestrator: Arc::new(orchestrator),
        }
    }

    /// The orchestrator behind the tool.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
