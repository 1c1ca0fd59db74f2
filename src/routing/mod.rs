//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Requested version (optional) + User
//!     → resolver.rs (ordered resolution rules)
//!     → Resolution { version, rule }
//!     → backend table lookup (missing = configuration error)
//! ```
//!
//! # Design Decisions
//! - Backend table built at startup, immutable at runtime
//! - Deterministic: same input always resolves to the same version
//! - First rule wins (declaration order)

pub mod resolver;

pub use resolver::{resolve_version, Resolution, ResolutionRule, VersionResolver};
