use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalanceSheetError {
    #[error("Malformed hierarchy at '{path}': {details}")]
    MalformedHierarchy { path: String, details: String },

    #[error("Precondition violated: {0}")]
    PreconditionViolated(String),

    #[error("Document does not match the expected shape: {0}")]
    SchemaViolation(String),

    #[error("Invalid tolerance {0}: must be finite and non-negative")]
    InvalidTolerance(f64),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl BalanceSheetError {
    pub(crate) fn malformed(path: &[String], details: impl Into<String>) -> Self {
        Self::MalformedHierarchy {
            path: path.join("/"),
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BalanceSheetError>;
