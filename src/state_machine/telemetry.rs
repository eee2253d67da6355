use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use super::StateMachine;
use super::backoff::{BackoffPolicy, PollState};
use super::wrappers::input::SystemInput;
use crate::classify::{Classification, classify};
use crate::ids::BinId;
use crate::model::{BinStatus, BinTelemetrySample, get_status};
use crate::poller::PollSessionId;
use crate::poller::error::FetchFailure;
use crate::position::{
    DEFAULT_HISTORY_CAPACITY, GpsHistory, GpsHistoryPoint, LastKnownPositionStore,
};
use crate::resolver::{DEFAULT_LOCATION, DefaultLocation, SafeCoordinates, resolve};

/// Settings the telemetry bookkeeping needs, independent of how it is polled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySettings {
    pub default_location: DefaultLocation,
    pub history_capacity: usize,
    /// A sample whose last sign of life is older than this is flagged timed-out.
    pub sample_timeout: TimeDelta,
}

/// Age after which a sample with no newer sign of life is flagged timed-out.
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            default_location: DEFAULT_LOCATION,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            sample_timeout: TimeDelta::seconds(DEFAULT_SAMPLE_TIMEOUT.as_secs() as i64),
        }
    }
}

/// State derived from the held sample. The only authoritative view of a bin for consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedBinState {
    pub sample: Arc<BinTelemetrySample>,
    pub status: BinStatus,
    pub classification: Classification,
    /// Resolved when the snapshot was published.
    pub coordinates: SafeCoordinates,
}

/// An immutable, atomically published view of one bin's telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub bin_id: Option<BinId>,
    pub derived: Option<DerivedBinState>,
    pub gps_history: Arc<[GpsHistoryPoint]>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub error: Option<FetchFailure>,
}

impl TelemetrySnapshot {
    pub fn empty() -> Self {
        Self {
            bin_id: None,
            derived: None,
            gps_history: Arc::from(Vec::new()),
            last_update_at: None,
            error: None,
        }
    }

    /// No sample has arrived yet and nothing has failed either.
    pub fn is_loading(&self) -> bool {
        self.derived.is_none() && self.error.is_none()
    }

    pub fn current_sample(&self) -> Option<&Arc<BinTelemetrySample>> {
        self.derived.as_ref().map(|derived| &derived.sample)
    }

    pub fn is_gps_valid(&self) -> bool {
        self.current_sample()
            .is_some_and(|sample| sample.valid_fix().is_some())
    }

    /// When the last good update was applied, if the latest fetch failed.
    pub fn offline_since(&self) -> Option<DateTime<Utc>> {
        self.error.as_ref().and(self.last_update_at)
    }
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

pub struct TelemetryMachine {
    settings: TelemetrySettings,
    bin_id: Option<BinId>,
    session: Option<PollSessionId>,
    poll_state: PollState,
    now: Option<DateTime<Utc>>,
    current: Option<Arc<BinTelemetrySample>>,
    last_update_at: Option<DateTime<Utc>>,
    history: GpsHistory,
    position: LastKnownPositionStore,
    error: Option<FetchFailure>,
    pending: bool,
}

impl TelemetryMachine {
    pub fn new(settings: TelemetrySettings) -> Self {
        Self {
            settings,
            bin_id: None,
            session: None,
            poll_state: PollState::new(BackoffPolicy::fixed(Duration::ZERO)),
            now: None,
            current: None,
            last_update_at: None,
            history: GpsHistory::with_capacity(settings.history_capacity),
            position: LastKnownPositionStore::new(),
            error: None,
            pending: false,
        }
    }

    pub fn bin_id(&self) -> Option<&BinId> {
        self.bin_id.as_ref()
    }

    pub fn session(&self) -> Option<&PollSessionId> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.poll_state.is_active()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.poll_state.consecutive_failures()
    }

    pub fn interval(&self) -> Duration {
        self.poll_state.interval()
    }

    pub fn current_sample(&self) -> Option<&Arc<BinTelemetrySample>> {
        self.current.as_ref()
    }

    pub fn gps_history(&self) -> &GpsHistory {
        &self.history
    }

    pub fn position_store(&self) -> &LastKnownPositionStore {
        &self.position
    }

    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        self.last_update_at
    }

    pub fn error(&self) -> Option<&FetchFailure> {
        self.error.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Resolve the coordinate to render at `now` from the held sample and position store.
    pub fn safe_coordinates(&self, now: DateTime<Utc>) -> SafeCoordinates {
        resolve(
            self.current.as_deref(),
            &self.position,
            self.settings.default_location,
            now,
        )
    }

    /// Build the consumer view from the current state.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let now = self
            .now
            .or(self.last_update_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let derived = self.current.as_ref().map(|sample| DerivedBinState {
            sample: Arc::clone(sample),
            status: get_status(sample.fill_level_percent),
            classification: classify(sample, self.position.get().is_some()),
            coordinates: self.safe_coordinates(now),
        });

        TelemetrySnapshot {
            bin_id: self.bin_id.clone(),
            derived,
            gps_history: self.history.to_vec().into(),
            last_update_at: self.last_update_at,
            error: self.error.clone(),
        }
    }

    fn begin(&mut self, session: PollSessionId, bin_id: BinId, interval: Duration) {
        if self.bin_id.as_ref() != Some(&bin_id) {
            self.current = None;
            self.last_update_at = None;
            self.history.clear();
            self.position.clear();
        }

        self.bin_id = Some(bin_id);
        self.session = Some(session);
        self.error = None;
        self.poll_state = PollState::new(BackoffPolicy::fixed(interval));
        self.poll_state.activate();
        self.pending = true;
    }

    fn end(&mut self) {
        self.session = None;
        self.poll_state.deactivate();
    }

    fn is_current(&self, session: &PollSessionId) -> bool {
        self.session.as_ref() == Some(session)
    }

    fn flag_timeout(&self, sample: BinTelemetrySample) -> BinTelemetrySample {
        match self.now {
            Some(now) => sample.with_timeout_flag(now, self.settings.sample_timeout),
            None => sample,
        }
    }

    fn accept_sample(&mut self, session: PollSessionId, sample: BinTelemetrySample) {
        if !self.is_current(&session) {
            debug!(session_id = %session, "Dropping sample from superseded session");
            return;
        }

        self.poll_state.record_success();
        if self.error.take().is_some() {
            self.pending = true;
        }

        let sample = self.flag_timeout(sample);

        let Some(previous) = self.current.as_ref() else {
            self.replace_sample(sample);
            return;
        };

        if sample.differs_from(previous) {
            self.replace_sample(sample);
        } else if sample.timed_out != previous.timed_out {
            // Same reading, but the sensor's last sign of life moved across the timeout window.
            let mut flagged = BinTelemetrySample::clone(previous);
            flagged.timed_out = sample.timed_out;
            flagged.last_active_at = sample.last_active_at;
            self.current = Some(Arc::new(flagged));
            self.pending = true;
        }
    }

    fn replace_sample(&mut self, sample: BinTelemetrySample) {
        self.history.record(&sample);
        self.position.update(&sample);
        self.last_update_at = self.now.or(Some(sample.captured_at));
        self.current = Some(Arc::new(sample));
        self.pending = true;
    }

    fn reject(&mut self, session: PollSessionId, failure: FetchFailure) {
        if !self.is_current(&session) {
            debug!(session_id = %session, "Dropping failure from superseded session");
            return;
        }

        self.poll_state.record_failure();
        if self.error.as_ref() != Some(&failure) {
            self.error = Some(failure);
            self.pending = true;
        }
    }

    fn poll_snapshot(&mut self) -> Option<TelemetrySnapshot> {
        if self.pending {
            self.pending = false;
            Some(self.snapshot())
        } else {
            None
        }
    }
}

pub enum TelemetryInput {
    /// A poller session started for `bin_id`. Switching bins discards held state.
    Begin {
        session: PollSessionId,
        bin_id: BinId,
        interval: Duration,
    },
    Sample {
        session: PollSessionId,
        sample: BinTelemetrySample,
    },
    Failed {
        session: PollSessionId,
        failure: FetchFailure,
    },
    End,
}

pub enum TelemetryOutput {
    Snapshot(TelemetrySnapshot),
}

impl StateMachine for TelemetryMachine {
    type Input = SystemInput<TelemetryInput, DateTime<Utc>>;
    type Output = TelemetryOutput;

    fn process_input(&mut self, input: Self::Input) {
        match input {
            SystemInput::System(now) => self.now = Some(now),
            SystemInput::Input(TelemetryInput::Begin {
                session,
                bin_id,
                interval,
            }) => self.begin(session, bin_id, interval),
            SystemInput::Input(TelemetryInput::Sample { session, sample }) => {
                self.accept_sample(session, sample)
            }
            SystemInput::Input(TelemetryInput::Failed { session, failure }) => {
                self.reject(session, failure)
            }
            SystemInput::Input(TelemetryInput::End) => self.end(),
        }
    }

    fn poll_output(&mut self) -> Option<Self::Output> {
        self.poll_snapshot().map(TelemetryOutput::Snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::CoordinateClass;
    use crate::model::CoordinatesSource;
    use crate::model::tests::{at, sample};

    fn settings() -> TelemetrySettings {
        TelemetrySettings {
            default_location: DefaultLocation {
                latitude: 10.3157,
                longitude: 123.8854,
            },
            history_capacity: 50,
            sample_timeout: TimeDelta::minutes(5),
        }
    }

    fn started() -> (TelemetryMachine, PollSessionId) {
        let mut machine = TelemetryMachine::new(settings());
        let session = PollSessionId::generate();
        machine.process_input(SystemInput::System(at("2024-05-01T12:00:00Z")));
        machine.process_input(SystemInput::Input(TelemetryInput::Begin {
            session: session.clone(),
            bin_id: BinId::from("bin-1"),
            interval: Duration::from_secs(2),
        }));
        (machine, session)
    }

    fn feed(machine: &mut TelemetryMachine, session: &PollSessionId, s: BinTelemetrySample) {
        machine.process_input(SystemInput::Input(TelemetryInput::Sample {
            session: session.clone(),
            sample: s,
        }));
    }

    fn take_snapshot(machine: &mut TelemetryMachine) -> Option<TelemetrySnapshot> {
        machine.poll_output().map(|out| match out {
            TelemetryOutput::Snapshot(snapshot) => snapshot,
        })
    }

    #[test]
    fn test_begin_publishes_loading_snapshot() {
        let (mut machine, _) = started();
        let snapshot = take_snapshot(&mut machine).unwrap();
        assert!(snapshot.is_loading());
        assert_eq!(snapshot.bin_id, Some(BinId::from("bin-1")));
        assert!(take_snapshot(&mut machine).is_none());
    }

    #[test]
    fn test_sample_derives_state() {
        let (mut machine, session) = started();
        take_snapshot(&mut machine);

        feed(&mut machine, &session, sample(88.0, true, 10.21, 123.76));

        let snapshot = take_snapshot(&mut machine).unwrap();
        let derived = snapshot.derived.unwrap();
        assert_eq!(derived.status, BinStatus::Critical);
        assert_eq!(derived.classification.class, CoordinateClass::Live);
        assert!(!derived.coordinates.is_offline);
        assert_eq!(snapshot.gps_history.len(), 1);
        assert_eq!(snapshot.last_update_at, Some(at("2024-05-01T12:00:00Z")));
    }

    #[test]
    fn test_unchanged_sample_keeps_reference() {
        let (mut machine, session) = started();
        feed(&mut machine, &session, sample(40.0, true, 10.21, 123.76));
        take_snapshot(&mut machine);
        let held = Arc::clone(machine.current_sample().unwrap());

        let mut repeat = sample(40.0, true, 10.21, 123.76);
        repeat.weight_kg = Some(1.0);
        feed(&mut machine, &session, repeat);

        assert!(Arc::ptr_eq(&held, machine.current_sample().unwrap()));
        assert!(take_snapshot(&mut machine).is_none());
        assert_eq!(machine.gps_history().len(), 1);
    }

    #[test]
    fn test_invalid_gps_keeps_last_known_fix() {
        let (mut machine, session) = started();
        feed(&mut machine, &session, sample(40.0, true, 10.21, 123.76));

        let mut lost = sample(41.0, false, 0.0, 0.0);
        lost.captured_at = at("2024-05-01T12:00:02Z");
        feed(&mut machine, &session, lost);

        let coords = machine.safe_coordinates(at("2024-05-01T12:03:00Z"));
        assert_eq!((coords.latitude, coords.longitude), (10.21, 123.76));
        assert!(coords.is_offline);
        assert!(!coords.staleness_label.is_empty());
        assert_eq!(machine.gps_history().len(), 1);

        let snapshot = take_snapshot(&mut machine).unwrap();
        assert!(!snapshot.is_gps_valid());
        let derived = snapshot.derived.unwrap();
        assert_eq!(derived.classification.class, CoordinateClass::Offline);
    }

    #[test]
    fn test_failure_retains_previous_sample() {
        let (mut machine, session) = started();
        feed(&mut machine, &session, sample(40.0, true, 10.21, 123.76));
        take_snapshot(&mut machine);

        machine.process_input(SystemInput::Input(TelemetryInput::Failed {
            session: session.clone(),
            failure: FetchFailure::NetworkFailure("connection refused".to_string()),
        }));

        let snapshot = take_snapshot(&mut machine).unwrap();
        assert!(snapshot.current_sample().is_some());
        assert!(snapshot.error.is_some());
        assert_eq!(snapshot.offline_since(), Some(at("2024-05-01T12:00:00Z")));
        assert_eq!(machine.consecutive_failures(), 1);

        // The same failure again does not republish.
        machine.process_input(SystemInput::Input(TelemetryInput::Failed {
            session: session.clone(),
            failure: FetchFailure::NetworkFailure("connection refused".to_string()),
        }));
        assert!(take_snapshot(&mut machine).is_none());
        assert_eq!(machine.consecutive_failures(), 2);

        // Recovery clears the flag even when the reading itself is unchanged.
        feed(&mut machine, &session, sample(40.0, true, 10.21, 123.76));
        let snapshot = take_snapshot(&mut machine).unwrap();
        assert!(snapshot.error.is_none());
        assert_eq!(machine.consecutive_failures(), 0);
    }

    #[test]
    fn test_first_failure_is_not_loading() {
        let (mut machine, session) = started();
        machine.process_input(SystemInput::Input(TelemetryInput::Failed {
            session,
            failure: FetchFailure::MalformedResponse("missing binLevel".to_string()),
        }));
        let snapshot = take_snapshot(&mut machine).unwrap();
        assert!(!snapshot.is_loading());
        assert!(snapshot.derived.is_none());
        assert_eq!(snapshot.offline_since(), None);
    }

    #[test]
    fn test_superseded_session_is_ignored() {
        let (mut machine, old_session) = started();
        let new_session = PollSessionId::generate();
        machine.process_input(SystemInput::Input(TelemetryInput::Begin {
            session: new_session.clone(),
            bin_id: BinId::from("bin-1"),
            interval: Duration::from_secs(2),
        }));

        feed(&mut machine, &old_session, sample(40.0, true, 10.21, 123.76));
        assert!(machine.current_sample().is_none());

        feed(&mut machine, &new_session, sample(40.0, true, 10.21, 123.76));
        assert!(machine.current_sample().is_some());
    }

    #[test]
    fn test_restart_resets_failures_and_switching_bins_clears_state() {
        let (mut machine, session) = started();
        feed(&mut machine, &session, sample(40.0, true, 10.21, 123.76));
        for _ in 0..3 {
            machine.process_input(SystemInput::Input(TelemetryInput::Failed {
                session: session.clone(),
                failure: FetchFailure::NetworkFailure("timeout".to_string()),
            }));
        }
        machine.process_input(SystemInput::Input(TelemetryInput::End));
        assert!(!machine.is_active());

        machine.process_input(SystemInput::Input(TelemetryInput::Begin {
            session: PollSessionId::generate(),
            bin_id: BinId::from("bin-1"),
            interval: Duration::from_secs(2),
        }));
        assert_eq!(machine.consecutive_failures(), 0);
        assert!(machine.error().is_none());
        assert!(machine.current_sample().is_some());

        machine.process_input(SystemInput::Input(TelemetryInput::Begin {
            session: PollSessionId::generate(),
            bin_id: BinId::from("bin-2"),
            interval: Duration::from_secs(2),
        }));
        assert!(machine.current_sample().is_none());
        assert!(machine.position_store().get().is_none());
        assert!(machine.gps_history().is_empty());
    }

    #[test]
    fn test_quiet_sensor_becomes_timed_out() {
        let (mut machine, session) = started();
        let mut reading = sample(40.0, true, 10.21, 123.76);
        reading.coordinates_source = CoordinatesSource::Live;
        feed(&mut machine, &session, reading.clone());
        take_snapshot(&mut machine);

        machine.process_input(SystemInput::System(at("2024-05-01T12:06:00Z")));
        feed(&mut machine, &session, reading);

        let snapshot = take_snapshot(&mut machine).unwrap();
        let derived = snapshot.derived.unwrap();
        assert!(derived.sample.timed_out);
        assert_eq!(derived.classification.class, CoordinateClass::Offline);
        // Not a new reading, so no new update time.
        assert_eq!(snapshot.last_update_at, Some(at("2024-05-01T12:00:00Z")));
    }

    #[test]
    fn test_revived_sensor_carries_new_activity_time() {
        let (mut machine, session) = started();
        machine.process_input(SystemInput::System(at("2024-05-01T12:10:00Z")));
        let mut quiet = sample(40.0, true, 10.21, 123.76);
        quiet.last_active_at = Some(at("2024-05-01T12:00:00Z"));
        feed(&mut machine, &session, quiet.clone());
        assert!(machine.current_sample().unwrap().timed_out);
        take_snapshot(&mut machine);

        let mut revived = quiet;
        revived.last_active_at = Some(at("2024-05-01T12:09:59Z"));
        feed(&mut machine, &session, revived);

        let held = machine.current_sample().unwrap();
        assert!(!held.timed_out);
        assert_eq!(held.last_active_at, Some(at("2024-05-01T12:09:59Z")));
        assert!(take_snapshot(&mut machine).is_some());
    }

    #[test]
    fn test_history_bounded_across_many_samples() {
        let (mut machine, session) = started();
        for i in 0..75 {
            let mut s = sample(40.0, true, 10.21 + i as f64 * 0.0001, 123.76);
            s.captured_at += TimeDelta::seconds(i * 2);
            feed(&mut machine, &session, s);
        }
        assert_eq!(machine.gps_history().len(), 50);
    }
}
