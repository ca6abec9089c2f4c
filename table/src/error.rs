use polars::error::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Column already exists: {0}")]
    DuplicateColumn(String),

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Invalid ratio specification '{0}', expected \"<numerator> / <denominator>\"")]
    InvalidRatioSpec(String),

    #[error("Invalid bounds for '{column}': lower {lower} must be below upper {upper}, both within [0, 100]")]
    InvalidBounds {
        column: String,
        lower: f64,
        upper: f64,
    },

    #[error("Unknown attribute key: {0}")]
    UnknownAttribute(String),

    #[error("Invalid value for attribute '{key}': {value}")]
    InvalidAttributeValue { key: String, value: String },

    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    #[error("Column '{column}' is not numeric (dtype: {dtype})")]
    NonNumericColumn { column: String, dtype: String },

    #[error("Map coordinates (Xc, Yc) are missing from the table")]
    MissingCoordinates,

    #[error("Polars error: {0}")]
    PolarsError(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, TableError>;
