//! Error types for remote schema sources.

use thiserror::Error;

/// Remote operation result type.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Remote source errors.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Transport-level failure (DNS, TLS, connection reset, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The instance answered with a non-success status
    #[error("Request to {uri} failed with status {status}: {body}")]
    RequestFailed {
        uri: String,
        status: u16,
        body: String,
    },

    /// The instance answered with something other than JSON
    #[error("Response from {uri} has content type '{content_type}', expected application/json")]
    InvalidContentType { uri: String, content_type: String },

    /// The body claimed to be JSON but did not parse
    #[error("Failed to parse response from {uri}: {source}")]
    ResponseParsing {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    /// The response has no `result` property
    #[error("Response from {uri} has no 'result' property")]
    ResultPropertyNotFound { uri: String },

    /// The `result` property has a shape no caller can use
    #[error("Unexpected response shape from {uri}: {detail}")]
    UnexpectedResponseShape { uri: String, detail: String },

    /// Token acquisition or refresh failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The configured instance URL is unusable
    #[error("Invalid instance URL '{0}'")]
    InvalidUrl(String),

    /// A fixture file is malformed
    #[error("Invalid fixture: {0}")]
    Fixture(String),

    /// IO error (fixture files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The pass was cancelled before the request was sent
    #[error("Operation cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Create an unexpected response shape error.
    pub fn shape(uri: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponseShape {
            uri: uri.into(),
            detail: detail.into(),
        }
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
}
