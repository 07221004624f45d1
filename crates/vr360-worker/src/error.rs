//! Worker error types.

use thiserror::Error;
use vr360_models::ViewportError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid viewport: {0}")]
    Validation(#[from] ViewportError),

    #[error("Insufficient inputs: grid needs {required} projections, got {available}")]
    InsufficientInputs { required: usize, available: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error("Media error: {0}")]
    Media(#[from] vr360_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn task_failed(msg: impl Into<String>) -> Self {
        Self::TaskFailed(msg.into())
    }

    /// True when the request was rejected before any work started.
    pub fn is_validation(&self) -> bool {
        match self {
            WorkerError::Validation(_)
            | WorkerError::InsufficientInputs { .. }
            | WorkerError::InvalidRequest(_) => true,
            WorkerError::Media(err) => err.is_validation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_inputs_message() {
        let err = WorkerError::InsufficientInputs { required: 4, available: 3 };
        assert_eq!(err.to_string(), "Insufficient inputs: grid needs 4 projections, got 3");
        assert!(err.is_validation());
    }

    #[test]
    fn test_viewport_error_converts() {
        let err: WorkerError = ViewportError::Fov(200.0).into();
        assert!(matches!(err, WorkerError::Validation(ViewportError::Fov(_))));
        assert!(err.is_validation());
        assert!(!WorkerError::task_failed("join").is_validation());
    }
}
