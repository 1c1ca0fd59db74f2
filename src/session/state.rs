//! Per-request processing session.
//!
//! # Responsibilities
//! - Capture the inbound request, staged files, and the backend outcome
//! - Accumulate timestamped log lines for the audit snapshot
//! - Persist exactly one snapshot per request
//! - Release staged files exactly once, after persistence
//!
//! # Lifecycle
//! ```text
//! Created → RequestCaptured → (FilesAttached)* → (ResponseCaptured | ErrorCaptured)
//!         → Persisted → Finalized
//! ```
//!
//! # Design Decisions
//! - Mutators are append-only; out-of-order calls return a state error
//! - The captured response is never modified after capture
//! - A failed persistence attempt still counts as the one attempt

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::audit::AuditStore;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::session::files::StagedFile;

/// Where the submission came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Origin {
    /// Direct API call by the user.
    Api,
    /// Submission relayed by an external service on the user's behalf.
    ExternalService { service: String },
}

impl Origin {
    pub fn label(&self) -> &str {
        match self {
            Origin::Api => "api",
            Origin::ExternalService { service } => service,
        }
    }
}

/// Inbound request as received, before any transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequestSnapshot {
    pub requested_version: Option<String>,
    /// Submitted options; kept as text when they are not valid JSON.
    pub options: Value,
    pub file_names: Vec<String>,
    pub received_at: DateTime<Utc>,
}

/// Backend response captured verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON body, or the raw text when the body is not JSON.
    pub body: Value,
}

impl CapturedResponse {
    pub fn is_backend_error(&self) -> bool {
        self.status >= 400
    }
}

/// One timestamped session log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    RequestCaptured,
    FilesAttached,
    ResponseCaptured,
    ErrorCaptured,
    Persisted,
    Finalized,
}

/// Lifecycle violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionStateError {
    #[error("cannot {operation} in state {state:?}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("session already persisted")]
    AlreadyPersisted,

    #[error("session already finalized")]
    AlreadyFinalized,
}

impl From<SessionStateError> for GatewayError {
    fn from(err: SessionStateError) -> Self {
        GatewayError::internal(err.to_string())
    }
}

/// Immutable audit record of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub request_id: Uuid,
    pub user_id: String,
    pub origin: Origin,
    pub gateway_version: String,
    pub version: Option<String>,
    pub api_request: Option<ApiRequestSnapshot>,
    pub files: Vec<StagedFile>,
    pub logs: Vec<LogLine>,
    pub response: Option<CapturedResponse>,
    pub error: Option<GatewayError>,
    pub backend_error: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Outcome of releasing staged files.
#[derive(Debug, Default)]
pub struct CleanupReport {
    pub released: usize,
    pub failures: Vec<GatewayError>,
}

/// Audit and state record for one inbound request.
#[derive(Debug)]
pub struct ProcessingSession {
    request_id: Uuid,
    user_id: String,
    origin: Origin,
    state: SessionState,
    api_request: Option<ApiRequestSnapshot>,
    files: Vec<StagedFile>,
    logs: Vec<LogLine>,
    response: Option<CapturedResponse>,
    error: Option<GatewayError>,
    version: Option<String>,
    started_at: DateTime<Utc>,
    started: Instant,
    duration: Option<Duration>,
    persist_attempted: bool,
}

impl ProcessingSession {
    pub fn new(request_id: Uuid, user_id: impl Into<String>) -> Self {
        let mut session = Self {
            request_id,
            user_id: user_id.into(),
            origin: Origin::Api,
            state: SessionState::Created,
            api_request: None,
            files: Vec::new(),
            logs: Vec::new(),
            response: None,
            error: None,
            version: None,
            started_at: Utc::now(),
            started: Instant::now(),
            duration: None,
            persist_attempted: false,
        };
        session.add_log("Session created");
        session
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn api_request(&self) -> Option<&ApiRequestSnapshot> {
        self.api_request.as_ref()
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn logs(&self) -> &[LogLine] {
        &self.logs
    }

    pub fn response(&self) -> Option<&CapturedResponse> {
        self.response.as_ref()
    }

    pub fn error(&self) -> Option<&GatewayError> {
        self.error.as_ref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Duration up to outcome capture, or elapsed so far if not yet captured.
    pub fn duration(&self) -> Duration {
        self.duration.unwrap_or_else(|| self.started.elapsed())
    }

    /// Whether the backend answered with a status >= 400.
    pub fn is_backend_error(&self) -> bool {
        self.response
            .as_ref()
            .map(CapturedResponse::is_backend_error)
            .unwrap_or(false)
    }

    fn is_open(&self) -> bool {
        matches!(
            self.state,
            SessionState::Created | SessionState::RequestCaptured | SessionState::FilesAttached
        )
    }

    fn invalid(&self, operation: &'static str) -> SessionStateError {
        SessionStateError::InvalidTransition {
            operation,
            state: self.state,
        }
    }

    /// Append a timestamped line. Valid in every state.
    pub fn add_log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(request_id = %self.request_id, "{}", message);
        self.logs.push(LogLine {
            at: Utc::now(),
            message,
        });
    }

    pub fn set_origin(&mut self, origin: Origin) -> Result<(), SessionStateError> {
        if !self.is_open() {
            return Err(self.invalid("set origin"));
        }
        self.add_log(format!("Origin: {}", origin.label()));
        self.origin = origin;
        Ok(())
    }

    pub fn set_api_request(&mut self, request: ApiRequestSnapshot) -> Result<(), SessionStateError> {
        if self.state != SessionState::Created {
            return Err(self.invalid("capture request"));
        }
        self.api_request = Some(request);
        self.state = SessionState::RequestCaptured;
        self.add_log("API request captured");
        Ok(())
    }

    pub fn add_file(&mut self, file: StagedFile) -> Result<(), SessionStateError> {
        if !matches!(
            self.state,
            SessionState::RequestCaptured | SessionState::FilesAttached
        ) {
            return Err(self.invalid("attach file"));
        }
        self.add_log(format!(
            "File attached: {} ({}, {} bytes)",
            file.original_name, file.content_type, file.size
        ));
        self.files.push(file);
        self.state = SessionState::FilesAttached;
        Ok(())
    }

    pub fn set_version(&mut self, version: impl Into<String>) -> Result<(), SessionStateError> {
        if !self.is_open() {
            return Err(self.invalid("set version"));
        }
        let version = version.into();
        self.add_log(format!("Backend version: {}", version));
        self.version = Some(version);
        Ok(())
    }

    /// Capture the backend response verbatim.
    pub fn set_response(&mut self, response: CapturedResponse) -> Result<(), SessionStateError> {
        if !matches!(
            self.state,
            SessionState::RequestCaptured | SessionState::FilesAttached
        ) {
            return Err(self.invalid("capture response"));
        }
        self.duration = Some(self.started.elapsed());
        if response.is_backend_error() {
            self.add_log(format!("Backend returned error status {}", response.status));
        } else {
            self.add_log(format!("Backend returned status {}", response.status));
        }
        self.response = Some(response);
        self.state = SessionState::ResponseCaptured;
        Ok(())
    }

    /// Capture a pipeline failure.
    pub fn set_error(&mut self, error: GatewayError) -> Result<(), SessionStateError> {
        if !self.is_open() {
            return Err(self.invalid("capture error"));
        }
        self.duration = Some(self.started.elapsed());
        self.add_log(format!("Error captured: {}", error));
        self.error = Some(error);
        self.state = SessionState::ErrorCaptured;
        Ok(())
    }

    /// Build the immutable audit record.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            request_id: self.request_id,
            user_id: self.user_id.clone(),
            origin: self.origin.clone(),
            gateway_version: env!("CARGO_PKG_VERSION").to_string(),
            version: self.version.clone(),
            api_request: self.api_request.clone(),
            files: self.files.clone(),
            logs: self.logs.clone(),
            response: self.response.clone(),
            error: self.error.clone(),
            backend_error: self.is_backend_error(),
            started_at: self.started_at,
            duration_ms: self.duration().as_millis() as u64,
        }
    }

    /// Write the snapshot to the audit store. Only one attempt is allowed.
    pub async fn persist(&mut self, store: &dyn AuditStore) -> GatewayResult<()> {
        if self.persist_attempted {
            return Err(SessionStateError::AlreadyPersisted.into());
        }
        if self.state == SessionState::Finalized {
            return Err(SessionStateError::AlreadyFinalized.into());
        }
        self.persist_attempted = true;
        self.add_log("Persisting session snapshot");

        let snapshot = self.snapshot();
        match store.put(&snapshot).await {
            Ok(()) => {
                self.state = SessionState::Persisted;
                tracing::debug!(request_id = %self.request_id, "Session persisted");
                Ok(())
            }
            Err(e) => {
                metrics::record_persistence_failure();
                self.add_log(format!("Persistence failed: {}", e));
                Err(e)
            }
        }
    }

    /// Release staged files. Requires a prior persistence attempt; runs once.
    pub async fn finalize(&mut self) -> Result<CleanupReport, SessionStateError> {
        if self.state == SessionState::Finalized {
            return Err(SessionStateError::AlreadyFinalized);
        }
        if !self.persist_attempted {
            return Err(self.invalid("finalize before persistence"));
        }

        let mut report = CleanupReport::default();
        for file in &self.files {
            match file.release().await {
                Ok(()) => report.released += 1,
                Err(e) => {
                    metrics::record_cleanup_failure();
                    tracing::warn!(
                        request_id = %self.request_id,
                        path = ?file.path,
                        error = %e,
                        "Failed to release staged file"
                    );
                    report.failures.push(GatewayError::cleanup(format!(
                        "Failed to remove {}: {}",
                        file.path.display(),
                        e
                    )));
                }
            }
        }

        self.state = SessionState::Finalized;
        Ok(report)
    }
}
