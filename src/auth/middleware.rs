//! Bearer-token authentication middleware.
//! Resolves the caller against the user directory before the pipeline runs.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::auth::users::{SharedDirectory, User};

/// Context attached to authenticated requests.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user: Arc<User>,
}

pub async fn auth_middleware(
    State(directory): State<SharedDirectory>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => {
            return (StatusCode::UNAUTHORIZED, "Missing bearer token").into_response();
        }
    };

    match directory.snapshot().authenticate(token) {
        Some(user) => {
            tracing::debug!(user_id = %user.id, "Caller authenticated");
            req.extensions_mut().insert(AuthenticatedUser { user });
            next.run(req).await
        }
        None => {
            tracing::warn!("Rejected unknown bearer token");
            (StatusCode::UNAUTHORIZED, "Invalid bearer token").into_response()
        }
    }
}
