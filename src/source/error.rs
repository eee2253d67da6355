use crate::model::wire::DecodeError;

/// Errors from talking to the remote API.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The request could not be sent or the response could not be read.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote did not answer within the request timeout.
    #[error("timeout waiting for response")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// The remote answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    /// The response body did not have the expected shape.
    #[error("malformed response: {0}")]
    Decode(#[from] DecodeError),

    /// The configured base URL cannot have path segments appended.
    #[error("base URL cannot be used for API paths: {0}")]
    InvalidBaseUrl(String),
}

impl SourceError {
    /// Whether the remote answered, but with something unusable.
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::Decode(_) => true,
            Self::Transport(err) => err.is_decode(),
            _ => false,
        }
    }
}
