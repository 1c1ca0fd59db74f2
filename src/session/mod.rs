//! Processing session subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → state.rs (ProcessingSession: capture request, files, outcome)
//!     → audit store (one snapshot per request)
//!     → files.rs (release staged uploads)
//! ```

pub mod files;
pub mod state;

pub use files::{sanitize_filename, StagedFile};
pub use state::{
    ApiRequestSnapshot, CapturedResponse, CleanupReport, LogLine, Origin, ProcessingSession,
    SessionSnapshot, SessionState, SessionStateError,
};
