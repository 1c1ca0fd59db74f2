//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, bearer auth, body limit)
//!     → intake.rs (stream file parts to staging, collect text parts)
//!     → pipeline (resolve, invoke, filter, audit)
//!     → response.rs (status mapping, x-request-id)
//!     → Send to client
//! ```

pub mod intake;
pub mod response;
pub mod server;

pub use intake::stage_multipart;
pub use response::{error_response, ErrorBody, X_REQUEST_ID};
pub use server::{default_collaborators, AppState, GatewayServer, X_ORIGIN_SERVICE};
