//! Recurring, cancellable polling loops.
//!
//! Each poller owns a tokio task that fetches, feeds the result into its state machine
//! container, and waits. A tick never starts while the previous fetch is outstanding, and every
//! result is tagged with the [`PollSessionId`] of the run that produced it so a late answer from
//! a stopped run cannot overwrite newer state.

pub mod error;
pub mod notification;
pub mod telemetry;

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::lifecycle::AppVisibility;

pub use notification::NotificationPoller;
pub use telemetry::TelemetryPoller;

/// Identifies one `start()` .. `stop()` run of a poller.
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct PollSessionId(Arc<Uuid>);

impl PollSessionId {
    pub fn generate() -> Self {
        Self(Arc::new(Uuid::new_v4()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Debug for PollSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PollSessionId({})", self.0)
    }
}

impl fmt::Display for PollSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A running poll loop. Dropping it aborts the task, cancelling any pending timer or fetch.
#[derive(Debug)]
struct PollTask {
    session_id: PollSessionId,
    handle: JoinHandle<()>,
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Default timeout for a single fetch before it counts as a failure.
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Why a waiting poll loop woke up early.
enum Wake {
    Timer,
    Visibility(AppVisibility),
    SignalClosed,
}

async fn visibility_change(visibility: &mut watch::Receiver<AppVisibility>) -> Wake {
    match visibility.changed().await {
        Ok(()) => Wake::Visibility(*visibility.borrow_and_update()),
        Err(_) => Wake::SignalClosed,
    }
}

/// Sleep for `delay`, waking early on a change of the host's foreground state.
async fn sleep_or_visibility(
    delay: std::time::Duration,
    visibility: Option<&mut watch::Receiver<AppVisibility>>,
) -> Wake {
    match visibility {
        Some(visibility) => tokio::select! {
            _ = tokio::time::sleep(delay) => Wake::Timer,
            wake = visibility_change(visibility) => wake,
        },
        None => {
            tokio::time::sleep(delay).await;
            Wake::Timer
        }
    }
}
