//! Request orchestration.
//!
//! # Responsibilities
//! - Drive one submission through resolve → transform → invoke → filter
//! - Capture the outcome on the session
//! - Run the terminal steps on every path: summary row, persistence, file release
//!
//! # Design Decisions
//! - Terminal steps are independent; a failure in one never skips the others
//! - Persistence and row failures are logged, the caller still sees the original outcome
//! - Files are released last, after the backend call and persistence

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::time::timeout;
use uuid::Uuid;

use crate::audit::{AuditStore, RowSink};
use crate::auth::User;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::pipeline::filter::ResponseFilter;
use crate::pipeline::invoker::BackendInvoker;
use crate::pipeline::options::{AnalysisOptions, OptionsTransformer};
use crate::pipeline::summary::SummaryRowBuilder;
use crate::routing::VersionResolver;
use crate::session::{ApiRequestSnapshot, Origin, ProcessingSession, StagedFile};

/// Who is asking, and how the request arrived.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub user: Arc<User>,
    pub origin: Origin,
}

/// Raw inputs collected from the inbound request.
#[derive(Debug, Default)]
pub struct Submission {
    /// Text of the `options` part.
    pub options: Option<String>,
    /// Text of the `version` part.
    pub requested_version: Option<String>,
    /// Files already staged on disk.
    pub files: Vec<StagedFile>,
    /// Failure while reading the request; staged files are still listed.
    pub intake_error: Option<GatewayError>,
}

impl Submission {
    pub fn rejected(error: GatewayError) -> Self {
        Self {
            intake_error: Some(error),
            ..Default::default()
        }
    }
}

/// Client-visible result of a backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedResponse {
    pub status: u16,
    /// Filtered copy of the backend body.
    pub body: Value,
}

/// What the terminal steps achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalReport {
    pub row_emitted: bool,
    pub persisted: bool,
    pub finalized: bool,
    pub files_released: usize,
    pub cleanup_failures: usize,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub request_id: Uuid,
    pub result: GatewayResult<ForwardedResponse>,
    pub report: TerminalReport,
}

/// The request-processing pipeline. Shared across requests; holds no per-request state.
pub struct Pipeline {
    resolver: VersionResolver,
    transformer: OptionsTransformer,
    invoker: BackendInvoker,
    rows: Arc<dyn RowSink>,
    audit: Arc<dyn AuditStore>,
    row_builder: SummaryRowBuilder,
    allowed_content_types: Vec<String>,
    default_destination: String,
    sink_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        config: &GatewayConfig,
        audit: Arc<dyn AuditStore>,
        rows: Arc<dyn RowSink>,
    ) -> GatewayResult<Self> {
        Ok(Self {
            resolver: VersionResolver::new(
                config.default_version.clone(),
                Arc::new(config.backends.clone()),
            ),
            transformer: OptionsTransformer::new(config.policy.injections.clone()),
            invoker: BackendInvoker::new(&config.timeouts)?,
            rows,
            audit,
            row_builder: SummaryRowBuilder::new(config.audit.link_base.clone()),
            allowed_content_types: config
                .uploads
                .allowed_content_types
                .iter()
                .map(|t| t.to_ascii_lowercase())
                .collect(),
            default_destination: config.tabular.default_destination.clone(),
            sink_timeout: Duration::from_secs(config.timeouts.sink_secs.max(1)),
        })
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Process one submission to completion.
    pub async fn run(&self, ctx: RequestContext, submission: Submission) -> PipelineOutcome {
        let start = Instant::now();
        let mut session = ProcessingSession::new(ctx.request_id, ctx.user.id.clone());

        let result = self.execute(&mut session, &ctx, submission).await;
        if let Err(err) = &result {
            tracing::warn!(
                request_id = %ctx.request_id,
                user_id = %ctx.user.id,
                kind = %err.kind,
                error = %err.message,
                "Request failed"
            );
            if let Err(e) = session.set_error(err.clone()) {
                tracing::error!(request_id = %ctx.request_id, error = %e, "Failed to capture error");
            }
        }

        let report = self.finish(&mut session).await;

        let status = match &result {
            Ok(forwarded) => forwarded.status,
            Err(err) => err.http_status(),
        };
        metrics::record_request(session.version().unwrap_or("none"), status, start);
        tracing::info!(
            request_id = %ctx.request_id,
            user_id = %ctx.user.id,
            version = session.version().unwrap_or("none"),
            status,
            persisted = report.persisted,
            row_emitted = report.row_emitted,
            "Request completed"
        );

        PipelineOutcome {
            request_id: ctx.request_id,
            result,
            report,
        }
    }

    async fn execute(
        &self,
        session: &mut ProcessingSession,
        ctx: &RequestContext,
        submission: Submission,
    ) -> GatewayResult<ForwardedResponse> {
        let Submission {
            options: raw_options,
            requested_version,
            files,
            intake_error,
        } = submission;

        // Capture the request and attach files first so cleanup always sees them.
        let snapshot_options = match raw_options.as_deref() {
            Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
            None => Value::Object(Default::default()),
        };
        session.set_api_request(ApiRequestSnapshot {
            requested_version: requested_version.clone(),
            options: snapshot_options,
            file_names: files.iter().map(|f| f.original_name.clone()).collect(),
            received_at: Utc::now(),
        })?;
        for file in files {
            session.add_file(file)?;
        }
        session.set_origin(ctx.origin.clone())?;

        if let Some(err) = intake_error {
            return Err(err);
        }
        self.validate_files(session.files())?;
        let mut options = AnalysisOptions::parse(raw_options.as_deref())?;

        let requested = requested_version
            .filter(|v| !v.trim().is_empty())
            .or_else(|| options.version.clone());
        let resolution = self.resolver.resolve(requested.as_deref(), &ctx.user);
        session.add_log(format!(
            "Resolved version '{}' via {}",
            resolution.version,
            resolution.rule.as_str()
        ));
        session.set_version(resolution.version.clone())?;
        let backend = self.resolver.backend(&resolution.version)?;

        for derivation in self.transformer.apply(&ctx.user.id, &mut options) {
            session.add_log(derivation.describe());
        }

        let response = self
            .invoker
            .invoke(&resolution.version, backend, &options, session.files())
            .await?;
        let status = response.status;
        session.set_response(response)?;

        let filter = ResponseFilter::for_user(&ctx.user);
        let body = session
            .response()
            .map(|r| filter.filter_payload(&r.body))
            .unwrap_or(Value::Null);

        Ok(ForwardedResponse { status, body })
    }

    fn validate_files(&self, files: &[StagedFile]) -> GatewayResult<()> {
        if files.is_empty() {
            return Err(GatewayError::input_validation("No file provided"));
        }
        for file in files {
            let essence = file
                .content_type
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase();
            if !self.allowed_content_types.iter().any(|t| *t == essence) {
                return Err(GatewayError::input_validation(format!(
                    "Unsupported file type '{}' for '{}'",
                    file.content_type, file.original_name
                )));
            }
        }
        Ok(())
    }

    /// Summary row, persistence, release. Each step runs regardless of the others.
    async fn finish(&self, session: &mut ProcessingSession) -> TerminalReport {
        let mut report = TerminalReport::default();
        let request_id = session.request_id();

        let backend = session
            .version()
            .and_then(|v| self.resolver.backends().get(v));
        let row = self.row_builder.build(session, backend);
        let destination = backend
            .and_then(|b| b.tabular_destination.clone())
            .unwrap_or_else(|| self.default_destination.clone());
        let version = session.version().unwrap_or_default().to_string();

        match timeout(self.sink_timeout, self.rows.append(&destination, &version, &row)).await {
            Ok(Ok(())) => {
                report.row_emitted = true;
                session.add_log(format!("Summary row emitted to '{}'", destination));
            }
            Ok(Err(e)) => {
                metrics::record_row_failure();
                tracing::warn!(request_id = %request_id, error = %e, "Failed to emit summary row");
                session.add_log(format!("Summary row failed: {}", e));
            }
            Err(_) => {
                metrics::record_row_failure();
                tracing::warn!(request_id = %request_id, "Summary row emission timed out");
                session.add_log("Summary row timed out");
            }
        }

        match timeout(self.sink_timeout, session.persist(self.audit.as_ref())).await {
            Ok(Ok(())) => report.persisted = true,
            Ok(Err(e)) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to persist session");
            }
            Err(_) => {
                metrics::record_persistence_failure();
                tracing::error!(request_id = %request_id, "Session persistence timed out");
            }
        }

        match session.finalize().await {
            Ok(cleanup) => {
                report.finalized = true;
                report.files_released = cleanup.released;
                report.cleanup_failures = cleanup.failures.len();
            }
            Err(e) => {
                tracing::error!(request_id = %request_id, error = %e, "Failed to finalize session");
            }
        }

        report
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("resolver", &self.resolver)
            .field("default_destination", &self.default_destination)
            .field("sink_timeout", &self.sink_timeout)
            .finish()
    }
}
