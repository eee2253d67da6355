use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::StateMachine;
use super::backoff::{BackoffPolicy, PollState};
use super::wrappers::output::WrappedOutput;
use crate::ids::NotificationId;
use crate::lifecycle::AppVisibility;
use crate::model::NotificationEnvelope;
use crate::poller::PollSessionId;
use crate::poller::error::FetchFailure;

/// Default delay before polling after the host returns to the foreground.
pub const DEFAULT_RESUME_DELAY: Duration = Duration::from_secs(1);

/// Successful refreshes a read id may be absent from the server list before it is forgotten.
pub const READ_ID_RETENTION: u32 = 20;

/// When the runner should fetch next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSchedule {
    After(Duration),
    /// Do not schedule anything until the host is foregrounded again.
    Suspended,
}

/// An immutable, atomically published view of the notification list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationSnapshot {
    pub notifications: Arc<[NotificationEnvelope]>,
    pub unread_count: usize,
    pub error: Option<FetchFailure>,
    /// At least one fetch has succeeded.
    pub loaded: bool,
}

pub struct NotificationMachine {
    session: Option<PollSessionId>,
    poll_state: PollState,
    visibility: AppVisibility,
    resume_delay: Duration,
    /// Pending out-of-band fetch, taking precedence over the regular interval.
    due: Option<Duration>,
    notifications: Vec<NotificationEnvelope>,
    /// Ids known to be read, with the number of consecutive refreshes each has been absent for.
    read_ids: HashMap<NotificationId, u32, ahash::RandomState>,
    loaded: bool,
    error: Option<FetchFailure>,
    pending: bool,
}

impl NotificationMachine {
    pub fn new(policy: BackoffPolicy, resume_delay: Duration) -> Self {
        Self {
            session: None,
            poll_state: PollState::new(policy),
            visibility: AppVisibility::Foreground,
            resume_delay,
            due: None,
            notifications: Vec::new(),
            read_ids: HashMap::default(),
            loaded: false,
            error: None,
            pending: false,
        }
    }

    pub fn session(&self) -> Option<&PollSessionId> {
        self.session.as_ref()
    }

    pub fn notifications(&self) -> &[NotificationEnvelope] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    pub fn interval(&self) -> Duration {
        self.poll_state.interval()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.poll_state.consecutive_failures()
    }

    pub fn visibility(&self) -> AppVisibility {
        self.visibility
    }

    /// The schedule for the next fetch given the current state.
    pub fn schedule(&self) -> PollSchedule {
        if self.visibility == AppVisibility::Background {
            return PollSchedule::Suspended;
        }

        PollSchedule::After(self.due.unwrap_or_else(|| self.poll_state.interval()))
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        NotificationSnapshot {
            notifications: self.notifications.clone().into(),
            unread_count: self.unread_count(),
            error: self.error.clone(),
            loaded: self.loaded,
        }
    }

    fn begin(&mut self, session: PollSessionId) {
        self.session = Some(session);
        self.poll_state.activate();
        self.error = None;
        self.due = Some(Duration::ZERO);
    }

    fn end(&mut self) {
        self.session = None;
        self.due = None;
        self.poll_state.deactivate();
    }

    fn is_current(&self, session: &PollSessionId) -> bool {
        self.session.as_ref() == Some(session)
    }

    fn set_visibility(&mut self, visibility: AppVisibility) {
        self.visibility = visibility;

        // The signal may merge a background spell into a single foreground report, so every
        // foreground report while polling counts as a resume.
        if visibility == AppVisibility::Foreground && self.session.is_some() {
            let resume = self
                .due
                .map_or(self.resume_delay, |due| due.min(self.resume_delay));
            self.due = Some(resume);
        }
    }

    /// Forget read ids that have been absent from the server list for too long.
    fn age_read_ids(&mut self, present: &HashSet<NotificationId, ahash::RandomState>) {
        self.read_ids.retain(|id, absent_for| {
            if present.contains(id) {
                *absent_for = 0;
            } else {
                *absent_for += 1;
            }
            *absent_for <= READ_ID_RETENTION
        });
    }

    pub fn remembered_read_ids(&self) -> usize {
        self.read_ids.len()
    }

    fn accept(&mut self, session: PollSessionId, incoming: Vec<NotificationEnvelope>) {
        if !self.is_current(&session) {
            debug!(session_id = %session, "Dropping notifications from superseded session");
            return;
        }

        self.due = None;
        self.poll_state.record_success();
        if self.error.take().is_some() || !self.loaded {
            self.pending = true;
        }
        self.loaded = true;

        let mut seen: HashSet<NotificationId, ahash::RandomState> = HashSet::default();
        let mut merged = Vec::with_capacity(incoming.len());
        for mut envelope in incoming {
            if !seen.insert(envelope.id.clone()) {
                continue;
            }
            if envelope.read {
                self.read_ids.insert(envelope.id.clone(), 0);
            } else if self.read_ids.contains_key(&envelope.id) {
                envelope.read = true;
            }
            merged.push(envelope);
        }
        self.age_read_ids(&seen);

        if merged != self.notifications {
            self.notifications = merged;
            self.pending = true;
        }
    }

    fn reject(&mut self, session: PollSessionId, failure: FetchFailure) {
        if !self.is_current(&session) {
            debug!(session_id = %session, "Dropping failure from superseded session");
            return;
        }

        self.due = None;
        self.poll_state.record_failure();
        if self.error.as_ref() != Some(&failure) {
            self.error = Some(failure);
            self.pending = true;
        }
    }

    fn mark_read(&mut self, id: NotificationId) {
        if let Some(envelope) = self.notifications.iter_mut().find(|n| n.id == id)
            && !envelope.read
        {
            envelope.read = true;
            self.pending = true;
        }
        self.read_ids.entry(id).or_insert(0);
    }

    fn mark_all_read(&mut self) {
        for envelope in self.notifications.iter_mut() {
            if !envelope.read {
                envelope.read = true;
                self.pending = true;
            }
            self.read_ids.entry(envelope.id.clone()).or_insert(0);
        }
    }

    fn poll_snapshot(&mut self) -> Option<NotificationSnapshot> {
        if self.pending {
            self.pending = false;
            Some(self.snapshot())
        } else {
            None
        }
    }
}

pub enum NotificationInput {
    Begin(PollSessionId),
    Fetched {
        session: PollSessionId,
        notifications: Vec<NotificationEnvelope>,
    },
    Failed {
        session: PollSessionId,
        failure: FetchFailure,
    },
    MarkRead(NotificationId),
    MarkAllRead,
    Visibility(AppVisibility),
    End,
}

pub enum NotificationOutput {
    Snapshot(NotificationSnapshot),
}

impl StateMachine for NotificationMachine {
    type Input = NotificationInput;
    /// Changed state first; otherwise the schedule to wait on, or `None` once ended.
    type Output = WrappedOutput<NotificationOutput, PollSchedule>;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            NotificationInput::Begin(session) => self.begin(session),
            NotificationInput::Fetched {
                session,
                notifications,
            } => self.accept(session, notifications),
            NotificationInput::Failed { session, failure } => self.reject(session, failure),
            NotificationInput::MarkRead(id) => self.mark_read(id),
            NotificationInput::MarkAllRead => self.mark_all_read(),
            NotificationInput::Visibility(visibility) => self.set_visibility(visibility),
            NotificationInput::End => self.end(),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        if let Some(snapshot) = self.poll_snapshot() {
            return Some(Ok(NotificationOutput::Snapshot(snapshot)));
        }

        self.session.as_ref().map(|_| Err(self.schedule()))
    }
}
