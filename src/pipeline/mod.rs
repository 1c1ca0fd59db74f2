//! Request-processing pipeline.
//!
//! # Data Flow
//! ```text
//! Submission (options text, version, staged files)
//!     → options.rs (parse, policy injection)
//!     → routing::resolver (pick backend version)
//!     → invoker.rs (one multipart call, capture verbatim)
//!     → filter.rs (per-user redaction of a copy)
//!     → summary.rs (row for the tabular sink)
//!     → session persist + file release
//! ```

pub mod filter;
pub mod invoker;
pub mod options;
pub mod processor;
pub mod summary;

pub use filter::{NamedField, ResponseFilter};
pub use invoker::BackendInvoker;
pub use options::{AnalysisOptions, Derivation, OptionsTransformer, RESERVED_FIELDS};
pub use processor::{
    ForwardedResponse, Pipeline, PipelineOutcome, RequestContext, Submission, TerminalReport,
};
pub use summary::{sanitize, SummaryRow, SummaryRowBuilder, FIXED_COLUMNS, MAX_FIELD_COLUMNS};
