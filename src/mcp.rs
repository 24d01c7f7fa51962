//! MCP server implementation using rmcp.
//!
//! Exposes grading and question lookup as MCP tools over stdio.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ServerCapabilities, ServerInfo};
use rmcp::schemars;
use rmcp::transport::stdio;
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::CatalogError;
use crate::grading::GradingService;
use crate::sandbox::SandboxRunner;
use crate::submission::Submission;

/// MCP server wrapping a grading service.
pub struct GraderServer<R> {
    service: Arc<GradingService<R>>,
    tool_router: ToolRouter<Self>,
}

impl<R> Clone for GraderServer<R> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            tool_router: self.tool_router.clone(),
        }
    }
}

/// Parameters for the grade tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GradeParams {
    #[schemars(description = "Grading target, e.g. 'SaveAndMiss'")]
    pub target_id: String,

    #[schemars(description = "File name the source is saved as, e.g. 'saveandmiss.go'")]
    pub entry_filename: String,

    #[schemars(description = "Complete source code of the submission")]
    pub source_code: String,
}

/// Parameters for the question tool.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QuestionParams {
    #[schemars(description = "Grading target, e.g. 'SaveAndMiss'")]
    pub target_id: String,
}

#[tool_router]
impl<R: SandboxRunner + 'static> GraderServer<R> {
    pub fn new(service: Arc<GradingService<R>>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    /// Grade a submission against the hidden tests of its target.
    #[tool(description = "Run a submission against the hidden tests of a grading target")]
    async fn grade(
        &self,
        Parameters(params): Parameters<GradeParams>,
    ) -> Result<CallToolResult, McpError> {
        let submission =
            Submission::new(params.target_id, params.entry_filename, params.source_code)
                .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        info!(target = %submission.target_id(), "Grading via MCP");

        let envelope = self.service.grade(&submission).await;
        let text = serde_json::to_string_pretty(&envelope)
            .map_err(|e| McpError::internal_error(format!("Failed to encode result: {e}"), None))?;

        if envelope.ok {
            Ok(CallToolResult::success(vec![Content::text(text)]))
        } else {
            Ok(CallToolResult::error(vec![Content::text(text)]))
        }
    }

    /// Fetch the question statement for a target.
    #[tool(description = "Fetch the markdown question statement for a grading target")]
    async fn question(
        &self,
        Parameters(params): Parameters<QuestionParams>,
    ) -> Result<CallToolResult, McpError> {
        match self.service.catalog().question_text(&params.target_id).await {
            Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            Err(CatalogError::NotFound(id)) => Err(McpError::invalid_params(
                format!("Unknown target: '{id}'"),
                None,
            )),
            Err(e) => {
                warn!(error = ?e, "Question lookup failed");
                Err(McpError::internal_error("Catalog unavailable".to_string(), None))
            }
        }
    }
}

#[tool_handler]
impl<R: SandboxRunner + 'static> ServerHandler for GraderServer<R> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: rmcp::model::ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sandbox-grader".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Grade source code against hidden tests in an isolated sandbox.\n\
                 \n\
                 Use 'question' to read a target's statement, then 'grade' with:\n\
                 - target_id: the grading target\n\
                 - entry_filename: the file name expected by the target\n\
                 - source_code: the full submission"
                    .to_string(),
            ),
        }
    }
}

/// Serve the grader over stdio.
pub async fn serve_stdio<R: SandboxRunner + 'static>(
    service: Arc<GradingService<R>>,
) -> anyhow::Result<()> {
    let server = GraderServer::new(service);

    info!("Starting MCP server on stdio");

    let running = server
        .serve(stdio())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))?;

    running
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))?;

    Ok(())
}
