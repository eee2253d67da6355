use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::ids::NotificationId;
use crate::lifecycle::AppVisibility;
use crate::model::NotificationEnvelope;
use crate::poller::PollSessionId;
use crate::poller::error::FetchFailure;
use crate::state_machine::StateMachine;
use crate::state_machine::notification::{
    NotificationInput, NotificationMachine, NotificationOutput, NotificationSnapshot, PollSchedule,
};

/// Caller-owned view of one user's notifications.
///
/// Written by the notification poller and by local read actions; read by badges and lists.
pub struct NotificationContext {
    notification_machine: Mutex<NotificationMachine>,
    snapshots: watch::Sender<Arc<NotificationSnapshot>>,
}

impl std::fmt::Debug for NotificationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationContext")
            .field("notification_machine", &"<NotificationMachine>")
            .field("snapshot", &self.snapshots.borrow())
            .finish()
    }
}

impl NotificationContext {
    pub fn new(machine: NotificationMachine) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(machine.snapshot()));
        Self {
            notification_machine: Mutex::new(machine),
            snapshots,
        }
    }

    fn machine(&self) -> MutexGuard<'_, NotificationMachine> {
        self.notification_machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `input`, publish any changed state, and return what the poller should wait on.
    fn process(&self, input: NotificationInput) -> Option<PollSchedule> {
        let mut machine = self.machine();
        machine.process_input(input);

        while let Some(output) = machine.poll_output() {
            match output {
                Ok(NotificationOutput::Snapshot(snapshot)) => {
                    self.snapshots.send_replace(Arc::new(snapshot));
                }
                Err(schedule) => return Some(schedule),
            }
        }

        None
    }

    pub(crate) fn begin(&self, session: PollSessionId) -> Option<PollSchedule> {
        self.process(NotificationInput::Begin(session))
    }

    pub(crate) fn apply_fetched(
        &self,
        session: PollSessionId,
        notifications: Vec<NotificationEnvelope>,
    ) -> Option<PollSchedule> {
        self.process(NotificationInput::Fetched {
            session,
            notifications,
        })
    }

    pub(crate) fn apply_failure(
        &self,
        session: PollSessionId,
        failure: FetchFailure,
    ) -> Option<PollSchedule> {
        self.process(NotificationInput::Failed { session, failure })
    }

    pub(crate) fn set_visibility(&self, visibility: AppVisibility) -> Option<PollSchedule> {
        self.process(NotificationInput::Visibility(visibility))
    }

    pub(crate) fn end(&self) {
        self.process(NotificationInput::End);
    }

    /// Mark one notification read locally. The flag survives later refreshes.
    pub fn mark_read(&self, id: &NotificationId) {
        self.process(NotificationInput::MarkRead(id.clone()));
    }

    pub fn mark_all_read(&self) {
        self.process(NotificationInput::MarkAllRead);
    }

    pub fn snapshot(&self) -> Arc<NotificationSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    pub fn notifications(&self) -> Arc<[NotificationEnvelope]> {
        Arc::clone(&self.snapshots.borrow().notifications)
    }

    pub fn unread_count(&self) -> usize {
        self.snapshots.borrow().unread_count
    }

    pub fn error(&self) -> Option<FetchFailure> {
        self.snapshots.borrow().error.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<NotificationSnapshot>> {
        self.snapshots.subscribe()
    }

    pub fn updates(&self) -> WatchStream<Arc<NotificationSnapshot>> {
        WatchStream::new(self.subscribe())
    }
}
