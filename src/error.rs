//! Ошибки библиотеки

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeqlabError {
    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Missing required column '{0}'")]
    MissingColumn(String),

    #[error("Insufficient data: need at least {required}, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{0} not fitted")]
    NotFitted(&'static str),

    #[error("Model fit failed: {0}")]
    Fit(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SeqlabError>;

impl SeqlabError {
    /// Короткий помощник для ошибок параметров
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
