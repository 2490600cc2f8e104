use std::sync::Arc;
use thiserror::Error;

pub type DataResult<T> = std::result::Result<T, DataError>;

/// Errors surfaced by session operations.
///
/// Cloneable so the session can keep a copy as its last error while the same
/// error is returned to the caller.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// Malformed filter or order input
    #[error("Invalid filter: {0}")]
    FilterParse(String),

    /// No table, view or model is declared under the name
    #[error("Unknown entity `{0}`")]
    SchemaNotFound(String),

    /// Submit or cancel without an open transaction
    #[error("There is no active transaction")]
    NoActiveTransaction,

    /// Mutation called without identifying data
    #[error("Missing input data for `{0}`")]
    EmptyInput(String),

    /// Row or input does not satisfy the declared fields
    #[error("Validation failed on {fields:?}: {message}")]
    ProjectionValidation {
        fields: Vec<String>,
        message: String,
    },

    /// Execution or scan failure reported by the driver
    #[error("{0:#}")]
    Statement(Arc<anyhow::Error>),
}

impl DataError {
    pub fn is_no_active_transaction(&self) -> bool {
        matches!(self, DataError::NoActiveTransaction)
    }
}

impl From<anyhow::Error> for DataError {
    fn from(value: anyhow::Error) -> Self {
        match value.downcast::<DataError>() {
            Ok(error) => error,
            Err(error) => DataError::Statement(Arc::new(error)),
        }
    }
}
