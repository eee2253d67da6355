//! Error types for the polling loops.

use crate::source::SourceError;

/// Why the latest fetch did not produce new state.
///
/// Consumers see this as a non-fatal flag next to the last good state; it never clears data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    /// The remote was unreachable, answered with an error status, or timed out.
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// The remote answered with a body of unexpected shape. The response was discarded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<SourceError> for FetchFailure {
    fn from(err: SourceError) -> Self {
        if err.is_malformed() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}

/// Indicates that a poller could not be started because it is already running.
#[derive(Debug, thiserror::Error)]
#[error("poller is already running session {session_id}")]
pub struct PollerAlreadyRunning {
    pub session_id: super::PollSessionId,
}
