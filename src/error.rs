use thiserror::Error;

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("No yield curve data available: {0}")]
    CurveUnavailable(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Curve table parse error: {0}")]
    CurveTableError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(any(feature = "openai", feature = "treasury"))]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[cfg(feature = "openai")]
    #[error("Model call failed: {0}")]
    ModelError(String),
}

pub type Result<T> = std::result::Result<T, LeaseError>;
