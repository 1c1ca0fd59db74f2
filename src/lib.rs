//! Analysis Gateway Library

pub mod audit;
pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod session;

pub use config::schema::GatewayConfig;
pub use error::{ErrorKind, GatewayError, GatewayResult};
pub use http::GatewayServer;
pub use lifecycle::Shutdown;
