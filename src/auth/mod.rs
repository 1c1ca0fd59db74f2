//! Authorization subsystem.
//!
//! # Data Flow
//! ```text
//! users.toml
//!     → users.rs (parse, index by id and token)
//!     → SharedDirectory (arc-swap, replaced on reload)
//!     → middleware.rs (bearer token → AuthenticatedUser extension)
//!     → pipeline (read-only snapshot for the whole request)
//! ```

pub mod middleware;
pub mod users;

pub use middleware::{auth_middleware, AuthenticatedUser};
pub use users::{RateLimitPolicy, SharedDirectory, User, UserDirectory};
