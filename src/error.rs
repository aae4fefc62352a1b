//! Application-wide error types.
//!
//! [`AppError`] covers failures of the bot process itself (config, logger,
//! channels).  [`UpstreamError`] is the single error kind for anything that
//! goes wrong while talking to the text or image generation service; it is
//! caught at the command boundary and turned into a reply, never propagated
//! out of a channel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("comms error: {0}")]
    Comms(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transport-level failure: connection refused, DNS, TLS, reset.
    #[error("request failed: {0}")]
    Request(String),

    /// The service answered with a non-success HTTP status.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The body could not be decoded or lacked the expected fields.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The service accepted the job but reported that it failed.
    #[error("job failed: {0}")]
    Failed(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout(e.to_string())
        } else if e.is_decode() {
            UpstreamError::Malformed(e.to_string())
        } else {
            UpstreamError::Request(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("config error"));
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn comms_error_display() {
        let e = AppError::Comms("dispatcher exited".into());
        assert!(e.to_string().contains("dispatcher exited"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }

    #[test]
    fn status_error_carries_code_and_message() {
        let e = UpstreamError::Status { status: 503, message: "model loading".into() };
        assert_eq!(e.to_string(), "HTTP 503: model loading");
    }

    #[test]
    fn timeout_display() {
        let e = UpstreamError::Timeout("image generation after 300s".into());
        assert!(e.to_string().starts_with("timed out"));
    }
}
