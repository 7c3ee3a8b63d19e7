//! Backfills missing product attributes in a tabular dataset from free-text
//! assistant replies.
//!
//! The pieces run strictly in sequence: [`select_pending`] lists rows whose
//! target columns are all blank, [`interpret`] turns one reply into four
//! values and [`merge`] writes them into every row sharing the reply's
//! identity tuple. [`Dataset::persist`] saves the whole table once at the end.

/// Batch reply application and the full `apply` run.
pub mod apply;
/// Run configuration loading and validation.
pub mod config;
/// CSV-backed dataset and column layout.
pub mod dataset;
/// Reply parsing into four target values.
pub mod interpreter;
/// Writing parsed values back into matching rows.
pub mod merger;
/// Prompt rendering for pending rows.
pub mod prompt;
/// Pending export, reply import and audit log files.
pub mod replies;
/// Pending-row selection.
pub mod selector;
/// Shared type aliases.
pub mod types;

mod error;

pub use apply::{apply_batch, load_dataset, run_apply, ApplyOptions, ApplyReport, ApplyStats};
pub use config::RunConfig;
pub use dataset::{ColumnLayout, Dataset};
pub use error::{ConfigError, DatasetError};
pub use interpreter::{interpret, FieldKind, ParsedReply, Strategy, FIELD_COUNT, MISSING_SENTINEL};
pub use merger::merge;
pub use prompt::PromptTemplate;
pub use replies::{AuditLog, FieldTally, PendingExport, ReplyBatch, ReplyEntry};
pub use selector::{select_pending, PendingRecord, PendingRecords};
pub use types::{IdentityTuple, PromptText, ReplyText, RequestId};
