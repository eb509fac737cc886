//! Error types for Pictor

use thiserror::Error;

/// The main error type for Pictor operations.
///
/// The first six variants are the job lifecycle taxonomy: each one names the
/// step of submit, poll, wait or fetch that failed. None of them is retried
/// by the library.
#[derive(Debug, Error)]
pub enum PictorError {
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Poll failed: {0}")]
    Poll(String),

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Job {job_id} timed out after {attempts} poll attempts")]
    Timeout { job_id: String, attempts: u32 },

    #[error("Malformed result: {0}")]
    MalformedResult(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(String),

    #[error("TOML serialization error: {0}")]
    TomlSerError(String),
}

impl PictorError {
    /// The provider's failure message, when the job itself reported failure
    pub fn job_message(&self) -> Option<&str> {
        match self {
            PictorError::JobFailed { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Result type alias for Pictor operations
pub type Result<T> = std::result::Result<T, PictorError>;

impl From<toml::de::Error> for PictorError {
    fn from(err: toml::de::Error) -> Self {
        PictorError::TomlParseError(err.to_string())
    }
}

impl From<toml::ser::Error> for PictorError {
    fn from(err: toml::ser::Error) -> Self {
        PictorError::TomlSerError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_failed_display_keeps_message() {
        let err = PictorError::JobFailed {
            job_id: "task-1".to_string(),
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "Job task-1 failed: quota exceeded");
        assert_eq!(err.job_message(), Some("quota exceeded"));
    }

    #[test]
    fn test_job_message_absent_for_other_errors() {
        let err = PictorError::Fetch("404".to_string());
        assert!(err.job_message().is_none());
    }

    #[test]
    fn test_toml_error_conversion() {
        let parsed: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: PictorError = parsed.unwrap_err().into();
        assert!(matches!(err, PictorError::TomlParseError(_)));
    }
}
