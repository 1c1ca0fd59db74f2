//! Audit collaborators.
//!
//! # Data Flow
//! ```text
//! ProcessingSession
//!     → store.rs (AuditStore: one immutable snapshot per request)
//! SummaryRowBuilder
//!     → rows.rs (RowSink: one row per request, per version destination)
//! ```
//!
//! # Design Decisions
//! - Both are traits so the pipeline never knows the concrete backend
//! - Failures are returned, and the pipeline logs them without escalating

pub mod rows;
pub mod store;

pub use rows::{FileRowSink, HttpRowSink, MemoryRowSink, RecordedRow, RowSink};
pub use store::{user_dir_name, AuditStore, FsAuditStore, MemoryAuditStore};
