use sscore::FitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MdaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported MDA data type code {0}")]
    UnsupportedDataType(i32),

    #[error("invalid MDA header: {0}")]
    InvalidHeader(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Fit(#[from] FitError),
}

impl From<MdaError> for FitError {
    fn from(e: MdaError) -> Self {
        match e {
            MdaError::Fit(inner) => inner,
            other => FitError::Source(other.to_string()),
        }
    }
}
