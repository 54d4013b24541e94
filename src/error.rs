//! Error types for the registrant portal

use std::io;

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for the registrant portal
pub type Result<T> = std::result::Result<T, Error>;

/// Portal errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session read/write error
    #[error("Session error: {0}")]
    Session(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Classified outcome of a failed outbound HTTP call.
///
/// Produced at the HTTP-client boundary so that the gateway's response
/// mapper and the login failure path consume one shape instead of probing
/// `reqwest::Error` internals at every call site.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// The upstream answered with a non-success HTTP status.
    #[error("upstream returned status {0}")]
    Status(u16),

    /// The call timed out before any response arrived.
    #[error("upstream call timed out")]
    Timeout,

    /// The call failed below the HTTP layer (DNS, connect, TLS, reset).
    #[error("upstream transport failure: {0}")]
    Transport(String),

    /// Anything else (malformed response body, internal misuse).
    #[error("unexpected upstream failure: {0}")]
    Other(String),
}

impl UpstreamError {
    /// Map to the status code surfaced to the browser.
    ///
    /// Upstream error payloads are never forwarded: a status error keeps its
    /// code with an empty body, and any failure without a response becomes
    /// 408 so the client can distinguish "upstream said no" from "upstream
    /// never answered".
    #[must_use]
    pub fn as_status(&self) -> StatusCode {
        match self {
            Self::Status(code) => StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Timeout | Self::Transport(_) => StatusCode::REQUEST_TIMEOUT,
            Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else if e.is_decode() {
            Self::Other(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_keeps_upstream_code() {
        assert_eq!(UpstreamError::Status(404).as_status(), StatusCode::NOT_FOUND);
        assert_eq!(
            UpstreamError::Status(422).as_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn no_response_maps_to_request_timeout() {
        assert_eq!(UpstreamError::Timeout.as_status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(
            UpstreamError::Transport("connection reset".to_string()).as_status(),
            StatusCode::REQUEST_TIMEOUT
        );
    }

    #[test]
    fn unexpected_failure_maps_to_internal_error() {
        assert_eq!(
            UpstreamError::Other("bad body".to_string()).as_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_status_code_falls_back_to_bad_gateway() {
        // Upstream sent something outside the representable range.
        assert_eq!(UpstreamError::Status(0).as_status(), StatusCode::BAD_GATEWAY);
    }
}
