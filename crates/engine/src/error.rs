use openview_core::{CoreError, ValidationErrors};
use openview_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Zero matching records, or a record hidden by the default
    /// archived filter.
    #[error("record not found: {0}")]
    NotFound(String),

    /// A directly addressed record that has been archived. Distinct from
    /// NotFound so clients can invalidate stale references.
    #[error("record gone: {0}")]
    Gone(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Collected per-field validation messages; never a single flat string.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
}
