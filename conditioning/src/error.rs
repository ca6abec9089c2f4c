use lame_table::TableError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrepError {
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("No positive values available to replace negatives")]
    NoPositiveValues,

    #[error("Not initialized: {0}")]
    NotInitialized(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Insufficient data: need at least {min} values, got {actual}")]
    InsufficientData { min: usize, actual: usize },

    #[error("Statistical computation failed: {0}")]
    StatsError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

impl From<polars::error::PolarsError> for PrepError {
    fn from(err: polars::error::PolarsError) -> Self {
        PrepError::Table(TableError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, PrepError>;
