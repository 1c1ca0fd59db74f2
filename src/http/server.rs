//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, body limit, bearer auth)
//! - Bind the server to a listener with graceful shutdown
//! - Hand each analysis request to the pipeline
//!
//! # Design Decisions
//! - The analysis route has no request timeout; the backend timeout bounds it
//! - Intake and processing run on a spawned task, so a client disconnect
//!   cannot skip persistence or file release

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::audit::{AuditStore, FileRowSink, FsAuditStore, HttpRowSink, RowSink};
use crate::auth::{auth_middleware, AuthenticatedUser, SharedDirectory};
use crate::config::{GatewayConfig, TabularSinkKind};
use crate::error::{GatewayError, GatewayResult};
use crate::http::intake::stage_multipart;
use crate::http::response::error_response;
use crate::pipeline::{Pipeline, RequestContext, Submission};
use crate::session::Origin;

/// Header naming the service that relayed a submission.
pub const X_ORIGIN_SERVICE: &str = "x-origin-service";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub staging_dir: Arc<PathBuf>,
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: Arc<GatewayConfig>,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        directory: SharedDirectory,
        audit: Arc<dyn AuditStore>,
        rows: Arc<dyn RowSink>,
    ) -> GatewayResult<Self> {
        let pipeline = Arc::new(Pipeline::new(&config, audit, rows)?);
        let state = AppState {
            pipeline,
            staging_dir: Arc::new(config.uploads.staging_dir.clone()),
        };
        let router = Self::build_router(&config, state, directory);

        Ok(Self {
            router,
            config: Arc::new(config),
        })
    }

    fn build_router(config: &GatewayConfig, state: AppState, directory: SharedDirectory) -> Router {
        let api = Router::new()
            .route(
                "/v1/analyze",
                post(analyze_handler).layer(DefaultBodyLimit::max(config.uploads.max_body_bytes)),
            )
            .route("/v1/versions", get(versions_handler))
            .route_layer(middleware::from_fn_with_state(directory, auth_middleware))
            .with_state(state);

        Router::new()
            .route("/health", get(health_handler))
            .merge(api)
            .layer(TraceLayer::new_for_http())
    }

    /// Router for in-process serving and tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve until the shutdown channel fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Audit store and row sink selected by configuration.
pub fn default_collaborators(
    config: &GatewayConfig,
) -> GatewayResult<(Arc<dyn AuditStore>, Arc<dyn RowSink>)> {
    let audit: Arc<dyn AuditStore> = Arc::new(FsAuditStore::new(config.audit.root.clone()));
    let rows: Arc<dyn RowSink> = match config.tabular.kind {
        TabularSinkKind::File => Arc::new(FileRowSink::new(config.tabular.dir.clone())),
        TabularSinkKind::Http => {
            let endpoint = config.tabular.endpoint.clone().ok_or_else(|| {
                GatewayError::configuration("tabular.endpoint is required for the http sink")
            })?;
            Arc::new(HttpRowSink::new(
                endpoint,
                std::time::Duration::from_secs(config.timeouts.sink_secs.max(1)),
            )?)
        }
    };
    Ok((audit, rows))
}

fn origin_from(headers: &HeaderMap) -> Origin {
    headers
        .get(X_ORIGIN_SERVICE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|service| Origin::ExternalService {
            service: service.to_string(),
        })
        .unwrap_or(Origin::Api)
}

async fn analyze_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let ctx = RequestContext {
        request_id,
        user: auth.user,
        origin: origin_from(&headers),
    };
    tracing::info!(
        request_id = %request_id,
        user_id = %ctx.user.id,
        origin = ctx.origin.label(),
        "Analysis request received"
    );

    let task = tokio::spawn(async move {
        let submission = match multipart {
            Ok(multipart) => stage_multipart(&state.staging_dir, request_id, multipart).await,
            Err(rejection) => Submission::rejected(GatewayError::input_validation(format!(
                "Malformed upload: {}",
                rejection.body_text()
            ))),
        };
        state.pipeline.run(ctx, submission).await
    });

    match task.await {
        Ok(outcome) => outcome.into_response(),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Pipeline task failed");
            error_response(&GatewayError::internal(e.to_string()), request_id)
        }
    }
}

#[derive(Debug, Serialize)]
struct VersionsBody {
    user_id: String,
    authorized_versions: Vec<String>,
    resolved_version: String,
    resolved_by: &'static str,
    available: bool,
}

async fn versions_handler(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthenticatedUser>,
) -> Json<VersionsBody> {
    let resolver = state.pipeline.resolver();
    let resolution = resolver.resolve(None, &auth.user);
    Json(VersionsBody {
        user_id: auth.user.id.clone(),
        authorized_versions: auth.user.authorized_versions.clone(),
        available: resolver.backend(&resolution.version).is_ok(),
        resolved_version: resolution.version,
        resolved_by: resolution.rule.as_str(),
    })
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
