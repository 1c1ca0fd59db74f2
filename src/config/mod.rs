//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! users.toml (authorization store):
//!     watcher.rs detects change
//!     → UserDirectory::load
//!     → atomic swap of the shared directory
//!     → new requests observe the new directory
//! ```
//!
//! # Design Decisions
//! - Gateway config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AuditConfig, BackendVersionConfig, GatewayConfig, InjectionPolicy, ListenerConfig,
    ObservabilityConfig, PolicyConfig, PrefixRule, TabularConfig, TabularSinkKind,
    TimeoutConfig, UploadConfig, UserStoreConfig,
};
