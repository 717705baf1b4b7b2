//! Error types and handling
//!
//! Application-wide error type and the serializable form handed to callers
//! outside the crate.

use crate::attendance::SessionError;
use crate::capture::CaptureError;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::recognition::RecognitionError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Camera error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Recognition error: {0}")]
    Recognition(#[from] RecognitionError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Error response for callers outside the crate
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Capture(_) => "CAMERA_ERROR",
            AppError::Recognition(RecognitionError::NoMatch) => "NOT_RECOGNIZED",
            AppError::Recognition(_) => "RECOGNITION_ERROR",
            AppError::Session(SessionError::BackendUnavailable) => "BACKEND_UNAVAILABLE",
            AppError::Session(SessionError::Capture(_)) => "CAMERA_ERROR",
            AppError::Session(_) => "SESSION_ERROR",
            AppError::Export(ExportError::NoData) => "NO_DATA",
            AppError::Export(_) => "EXPORT_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let response = ErrorResponse::from(AppError::from(ExportError::NoData));
        assert_eq!(response.code, "NO_DATA");
        assert_eq!(response.message, "Export error: No attendance data to export");

        let response = ErrorResponse::from(AppError::from(SessionError::Capture(
            CaptureError::Device("permission denied".to_string()),
        )));
        assert_eq!(response.code, "CAMERA_ERROR");
    }
}
