use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// The photo is empty or could not be decoded. The user can retry with another one.
    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("Model output has {actual} values but the class index has {expected} labels")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Prediction index {index} is outside the probability vector (len {len})")]
    Index { index: usize, len: usize },

    /// Neither the custom nor the fallback model could be loaded.
    #[error("No model available: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid manifest: {0}")]
    Manifest(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to load model: {0}")]
    Model(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Fatal errors end the run; everything else only aborts the current photo.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::ModelUnavailable(_) | AppError::Config(_))
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Preprocessing(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl Serialize for AppError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
