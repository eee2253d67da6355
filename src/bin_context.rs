use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::ids::BinId;
use crate::model::BinTelemetrySample;
use crate::poller::PollSessionId;
use crate::poller::error::FetchFailure;
use crate::position::GpsHistoryPoint;
use crate::resolver::SafeCoordinates;
use crate::state_machine::StateMachine;
use crate::state_machine::telemetry::{
    TelemetryInput, TelemetryMachine, TelemetryOutput, TelemetrySnapshot,
};
use crate::state_machine::wrappers::input::{SystemInput, SystemResource};

/// Caller-owned view of one bin's telemetry, shared between its poller and any number of
/// consumers.
///
/// The poller is the only writer. Every input is applied under one lock and published as a
/// whole new [`TelemetrySnapshot`], so readers never observe a partial update.
pub struct BinContext {
    telemetry_machine: Mutex<TelemetryMachine>,
    snapshots: watch::Sender<Arc<TelemetrySnapshot>>,
}

impl std::fmt::Debug for BinContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinContext")
            .field("telemetry_machine", &"<TelemetryMachine>")
            .field("snapshot", &self.snapshots.borrow())
            .finish()
    }
}

impl BinContext {
    pub fn new(machine: TelemetryMachine) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(machine.snapshot()));
        Self {
            telemetry_machine: Mutex::new(machine),
            snapshots,
        }
    }

    fn machine(&self) -> MutexGuard<'_, TelemetryMachine> {
        self.telemetry_machine
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn process(&self, input: TelemetryInput) {
        let mut machine = self.machine();
        machine.process_input(SystemInput::System(DateTime::<Utc>::generate()));
        machine.process_input(SystemInput::Input(input));

        while let Some(output) = machine.poll_output() {
            match output {
                TelemetryOutput::Snapshot(snapshot) => {
                    self.snapshots.send_replace(Arc::new(snapshot));
                }
            }
        }
    }

    pub(crate) fn begin(&self, session: PollSessionId, bin_id: BinId, interval: Duration) {
        self.process(TelemetryInput::Begin {
            session,
            bin_id,
            interval,
        });
    }

    pub(crate) fn apply_sample(&self, session: PollSessionId, sample: BinTelemetrySample) {
        self.process(TelemetryInput::Sample { session, sample });
    }

    pub(crate) fn apply_failure(&self, session: PollSessionId, failure: FetchFailure) {
        self.process(TelemetryInput::Failed { session, failure });
    }

    pub(crate) fn end(&self) {
        self.process(TelemetryInput::End);
    }

    pub fn bin_id(&self) -> Option<BinId> {
        self.snapshots.borrow().bin_id.clone()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    pub fn current_sample(&self) -> Option<Arc<BinTelemetrySample>> {
        self.snapshots.borrow().current_sample().cloned()
    }

    /// The coordinate to render right now, with the staleness label computed against the
    /// current time rather than the time of the last publication.
    pub fn safe_coordinates(&self) -> SafeCoordinates {
        self.machine()
            .safe_coordinates(DateTime::<Utc>::generate())
    }

    pub fn gps_history(&self) -> Arc<[GpsHistoryPoint]> {
        Arc::clone(&self.snapshots.borrow().gps_history)
    }

    pub fn is_gps_valid(&self) -> bool {
        self.snapshots.borrow().is_gps_valid()
    }

    pub fn error(&self) -> Option<FetchFailure> {
        self.snapshots.borrow().error.clone()
    }

    /// Failed fetches since the last success or (re)start.
    pub fn consecutive_failures(&self) -> u32 {
        self.machine().consecutive_failures()
    }

    /// Subscribe to snapshot publications.
    pub fn subscribe(&self) -> watch::Receiver<Arc<TelemetrySnapshot>> {
        self.snapshots.subscribe()
    }

    /// Snapshot publications as a stream, starting with the current one.
    pub fn updates(&self) -> WatchStream<Arc<TelemetrySnapshot>> {
        WatchStream::new(self.subscribe())
    }
}
