use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{FetchFailure, PollerAlreadyRunning};
use super::{
    DEFAULT_REQUEST_TIMEOUT, PollSessionId, PollTask, Wake, sleep_or_visibility, visibility_change,
};
use crate::ids::UserId;
use crate::lifecycle::AppVisibility;
use crate::notification_context::NotificationContext;
use crate::source::{NotificationSource, SourceError};
use crate::state_machine::notification::PollSchedule;

/// Keeps a user's [`NotificationContext`] fresh, backing off while the remote keeps failing.
///
/// Polling is suspended while the host is backgrounded and resumes shortly after it returns to
/// the foreground.
#[derive(Builder)]
pub struct NotificationPoller<S> {
    source: Arc<S>,
    context: Arc<NotificationContext>,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    request_timeout: Duration,
    visibility: Option<watch::Receiver<AppVisibility>>,
    #[builder(skip)]
    task: Mutex<Option<PollTask>>,
}

impl<S> NotificationPoller<S> {
    pub fn context(&self) -> &Arc<NotificationContext> {
        &self.context
    }

    fn task(&self) -> MutexGuard<'_, Option<PollTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.task()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    pub fn stop(&self) -> bool {
        let Some(task) = self.task().take() else {
            return false;
        };

        info!(session_id = %task.session_id, "Stopping notification poller");
        drop(task);
        self.context.end();
        true
    }

    /// Stop polling and detach from the host's foreground signal.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<S: NotificationSource> NotificationPoller<S> {
    /// Begin polling notifications for `user_id`, fetching right away unless backgrounded.
    pub fn start(&self, user_id: UserId) -> Result<PollSessionId, PollerAlreadyRunning> {
        let mut task = self.task();
        if let Some(running) = task.as_ref()
            && !running.handle.is_finished()
        {
            return Err(PollerAlreadyRunning {
                session_id: running.session_id.clone(),
            });
        }

        let mut visibility = self.visibility.clone();
        if let Some(visibility) = visibility.as_mut() {
            let current = *visibility.borrow_and_update();
            self.context.set_visibility(current);
        }

        let session_id = PollSessionId::generate();
        let schedule = self.context.begin(session_id.clone());
        info!(session_id = %session_id, user_id = %user_id, "Starting notification poller");

        let run = NotificationRun {
            source: Arc::clone(&self.source),
            context: Arc::clone(&self.context),
            session_id: session_id.clone(),
            user_id,
            request_timeout: self.request_timeout,
            visibility,
        };
        *task = Some(PollTask {
            session_id: session_id.clone(),
            handle: tokio::spawn(run.run(schedule)),
        });

        Ok(session_id)
    }
}

impl<S> Drop for NotificationPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct NotificationRun<S> {
    source: Arc<S>,
    context: Arc<NotificationContext>,
    session_id: PollSessionId,
    user_id: UserId,
    request_timeout: Duration,
    visibility: Option<watch::Receiver<AppVisibility>>,
}

impl<S: NotificationSource> NotificationRun<S> {
    async fn run(mut self, mut schedule: Option<PollSchedule>) {
        while let Some(next) = schedule {
            let wake = match next {
                PollSchedule::After(delay) => {
                    sleep_or_visibility(delay, self.visibility.as_mut()).await
                }
                PollSchedule::Suspended => match self.visibility.as_mut() {
                    Some(visibility) => {
                        debug!(user_id = %self.user_id, "Backgrounded, suspending notifications");
                        visibility_change(visibility).await
                    }
                    None => Wake::SignalClosed,
                },
            };

            schedule = match wake {
                Wake::Timer => self.tick().await,
                Wake::Visibility(visibility) => self.context.set_visibility(visibility),
                Wake::SignalClosed => {
                    self.visibility = None;
                    self.context.set_visibility(AppVisibility::Foreground)
                }
            };
        }

        debug!(session_id = %self.session_id, "Notification loop ended");
    }

    async fn tick(&self) -> Option<PollSchedule> {
        let fetch = self.source.fetch_notifications(&self.user_id);
        let fetched = tokio::time::timeout(self.request_timeout, fetch)
            .await
            .unwrap_or_else(|elapsed| Err(SourceError::Timeout(elapsed)));

        match fetched {
            Ok(notifications) => {
                debug!(
                    user_id = %self.user_id,
                    count = notifications.len(),
                    "Fetched notifications"
                );
                self.context
                    .apply_fetched(self.session_id.clone(), notifications)
            }
            Err(e) => {
                let failure = FetchFailure::from(e);
                warn!(user_id = %self.user_id, error = %failure, "Notification fetch failed");
                self.context
                    .apply_failure(self.session_id.clone(), failure)
            }
        }
    }
}
