use thiserror::Error;

/// Result type used by `carta-net`.
pub type NetResult<T> = Result<T, NetError>;

/// Transport errors, classified so callers can branch on cause.
///
/// Notes:
/// - This crate reports failures; retry policy belongs to the caller.
/// - `HttpStatus` carries the status so cache layers can distinguish
///   "gone" (terminal) from "server busy" (retryable).
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {status} for URL: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("request timed out")]
    Timeout,

    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl NetError {
    /// Creates an HTTP status error.
    pub fn http_status(status: u16, url: String) -> Self {
        Self::HttpStatus { status, url }
    }

    /// Whether the caller may reasonably retry the request later.
    ///
    /// Timeouts, connection resets and 5xx/429/408 responses are
    /// retryable; 4xx responses and malformed payloads are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetError::Timeout | NetError::Unreachable(_) => true,
            NetError::HttpStatus { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408
            }
            NetError::Http(msg) => {
                msg.contains("timeout") || msg.contains("connection") || msg.contains("network")
            }
            NetError::MalformedResponse(_) => false,
        }
    }

    /// Gets the HTTP status code if this is an HTTP status error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            NetError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_connect() {
            Self::Unreachable(error.to_string())
        } else if error.is_body() || error.is_decode() {
            Self::MalformedResponse(error.to_string())
        } else {
            Self::Http(error.to_string())
        }
    }
}
