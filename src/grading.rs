//! The grading pipeline: submission in, envelope out.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::catalog::CaseCatalog;
use crate::config::Config;
use crate::error::{GradeError, ValidationError};
use crate::sandbox::{ExecutionResult, SandboxInvocationBuilder, SandboxRunner};
use crate::submission::{GradeRequest, Submission};
use crate::summary::{self, TestSummary};
use crate::workspace::WorkspaceManager;

/// Exit code reported for infrastructure failures.
pub const INTERNAL_FAILURE_EXIT_CODE: i32 = -1;

/// Uniform response for every graded submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub ok: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub summary: TestSummary,
}

impl ResultEnvelope {
    fn from_execution(result: ExecutionResult) -> Self {
        let summary = summary::summarize(&summary::combine(&result.stdout, &result.stderr));
        Self {
            ok: result.exit_code() == 0,
            exit_code: result.exit_code(),
            stdout: result.stdout,
            stderr: result.stderr,
            summary,
        }
    }

    fn failure(err: &GradeError) -> Self {
        Self {
            ok: false,
            exit_code: INTERNAL_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: err.public_message().to_string(),
            summary: TestSummary::unknown(),
        }
    }
}

/// Validates submissions and drives them through workspace, sandbox and summary.
///
/// Holds no per-request state; one instance serves concurrent requests.
pub struct GradingService<R> {
    workspaces: WorkspaceManager,
    builder: SandboxInvocationBuilder,
    catalog: Arc<dyn CaseCatalog>,
    runner: R,
}

impl<R: SandboxRunner> GradingService<R> {
    pub fn new(
        workspaces: WorkspaceManager,
        builder: SandboxInvocationBuilder,
        catalog: Arc<dyn CaseCatalog>,
        runner: R,
    ) -> Self {
        Self {
            workspaces,
            builder,
            catalog,
            runner,
        }
    }

    /// Wire a service from configuration.
    pub fn from_config(config: &Config, catalog: Arc<dyn CaseCatalog>, runner: R) -> Self {
        let workspaces = WorkspaceManager::new(
            config.workspace.resolved_root(),
            config.workspace.prefix.clone(),
            config.workspace.package_dir.clone(),
        );
        let builder = SandboxInvocationBuilder::from_settings(&config.sandbox);
        Self::new(workspaces, builder, catalog, runner)
    }

    pub fn catalog(&self) -> &dyn CaseCatalog {
        self.catalog.as_ref()
    }

    /// Validate a raw request and grade it.
    pub async fn grade_request(&self, req: GradeRequest) -> Result<ResultEnvelope, ValidationError> {
        let submission = Submission::try_from(req)?;
        Ok(self.grade(&submission).await)
    }

    /// Grade an accepted submission. Infrastructure failures become a
    /// generic failure envelope; details only go to the log.
    #[instrument(skip(self, submission), fields(target = %submission.target_id()))]
    pub async fn grade(&self, submission: &Submission) -> ResultEnvelope {
        match self.run_pipeline(submission).await {
            Ok(envelope) => {
                info!(
                    ok = envelope.ok,
                    exit_code = envelope.exit_code,
                    total = ?envelope.summary.total,
                    passed = envelope.summary.passed,
                    failed = envelope.summary.failed,
                    "Graded submission"
                );
                envelope
            }
            Err(e) => {
                error!(error = ?e, "Grading failed");
                ResultEnvelope::failure(&e)
            }
        }
    }

    async fn run_pipeline(&self, submission: &Submission) -> Result<ResultEnvelope, GradeError> {
        // Removed on drop if anything below returns early or panics.
        let workspace = self.workspaces.create().await?;

        workspace
            .write_submission(submission.entry_filename(), submission.source_code())
            .await?;

        let config = self
            .builder
            .build(submission, self.catalog.cases_dir(), &workspace);

        let result = self.runner.run(&config).await;
        workspace.destroy().await;

        Ok(ResultEnvelope::from_execution(result?))
    }
}
