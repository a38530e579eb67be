use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid criteria: {0}")]
    InvalidCriteria(String),

    #[error("record is not persisted: {0}")]
    UnsavedRecord(String),
}
