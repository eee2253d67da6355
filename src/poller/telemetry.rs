use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bon::Builder;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{FetchFailure, PollerAlreadyRunning};
use super::{DEFAULT_REQUEST_TIMEOUT, PollSessionId, PollTask, Wake, sleep_or_visibility};
use crate::bin_context::BinContext;
use crate::ids::BinId;
use crate::lifecycle::{AppVisibility, wait_for_foreground};
use crate::source::{SourceError, TelemetrySource};

/// Keeps one bin's [`BinContext`] fresh by fetching on a fixed interval.
///
/// The first fetch happens as soon as the task is scheduled. Fetches never overlap: the interval
/// is measured from the end of one fetch to the start of the next. While the host reports the
/// background, no fetches are made; returning to the foreground triggers one immediately.
#[derive(Builder)]
pub struct TelemetryPoller<S> {
    source: Arc<S>,
    context: Arc<BinContext>,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    request_timeout: Duration,
    /// Host foreground signal. Without one the poller behaves as if always in the foreground.
    visibility: Option<watch::Receiver<AppVisibility>>,
    #[builder(skip)]
    task: Mutex<Option<PollTask>>,
}

impl<S> TelemetryPoller<S> {
    pub fn context(&self) -> &Arc<BinContext> {
        &self.context
    }

    fn task(&self) -> MutexGuard<'_, Option<PollTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The session of the running loop, if any.
    pub fn session(&self) -> Option<PollSessionId> {
        self.task().as_ref().map(|task| task.session_id.clone())
    }

    pub fn is_running(&self) -> bool {
        self.task()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Cancel the pending timer and any outstanding fetch.
    ///
    /// Returns `false` if the poller was not running.
    pub fn stop(&self) -> bool {
        let Some(task) = self.task().take() else {
            return false;
        };

        info!(session_id = %task.session_id, "Stopping telemetry poller");
        drop(task);
        self.context.end();
        true
    }

    /// Stop polling and release the foreground signal.
    pub fn dispose(self) {
        drop(self);
    }
}

impl<S: TelemetrySource> TelemetryPoller<S> {
    /// Begin polling `bin_id` every `interval`, fetching once right away.
    ///
    /// Counters and any error from a previous run are reset.
    pub fn start(
        &self,
        bin_id: BinId,
        interval: Duration,
    ) -> Result<PollSessionId, PollerAlreadyRunning> {
        let mut task = self.task();
        if let Some(running) = task.as_ref()
            && !running.handle.is_finished()
        {
            return Err(PollerAlreadyRunning {
                session_id: running.session_id.clone(),
            });
        }

        let session_id = PollSessionId::generate();
        self.context.begin(session_id.clone(), bin_id.clone(), interval);

        info!(
            session_id = %session_id,
            bin_id = %bin_id,
            interval_ms = interval.as_millis() as u64,
            "Starting telemetry poller"
        );

        let run = TelemetryRun {
            source: Arc::clone(&self.source),
            context: Arc::clone(&self.context),
            session_id: session_id.clone(),
            bin_id,
            interval,
            request_timeout: self.request_timeout,
            visibility: self.visibility.clone(),
        };
        *task = Some(PollTask {
            session_id: session_id.clone(),
            handle: tokio::spawn(run.run()),
        });

        Ok(session_id)
    }
}

impl<S> Drop for TelemetryPoller<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything one spawned loop owns.
struct TelemetryRun<S> {
    source: Arc<S>,
    context: Arc<BinContext>,
    session_id: PollSessionId,
    bin_id: BinId,
    interval: Duration,
    request_timeout: Duration,
    visibility: Option<watch::Receiver<AppVisibility>>,
}

impl<S: TelemetrySource> TelemetryRun<S> {
    async fn run(mut self) {
        loop {
            self.wait_while_backgrounded().await;
            self.tick().await;
            self.wait_for_next_tick().await;
        }
    }

    async fn tick(&self) {
        let fetch = self.source.fetch_bin(&self.bin_id);
        let fetched = tokio::time::timeout(self.request_timeout, fetch)
            .await
            .unwrap_or_else(|elapsed| Err(SourceError::Timeout(elapsed)));

        match fetched {
            Ok(sample) => {
                debug!(
                    bin_id = %self.bin_id,
                    fill_level = sample.fill_level_percent,
                    gps_valid = sample.gps_valid,
                    "Fetched telemetry"
                );
                self.context.apply_sample(self.session_id.clone(), sample);
            }
            Err(e) => {
                let failure = FetchFailure::from(e);
                warn!(bin_id = %self.bin_id, error = %failure, "Telemetry fetch failed");
                self.context.apply_failure(self.session_id.clone(), failure);
            }
        }
    }

    async fn wait_while_backgrounded(&mut self) {
        let Some(visibility) = self.visibility.as_mut() else {
            return;
        };
        if *visibility.borrow_and_update() == AppVisibility::Foreground {
            return;
        }

        debug!(bin_id = %self.bin_id, "Backgrounded, suspending telemetry");
        let signal_alive = wait_for_foreground(visibility).await;
        if !signal_alive {
            self.visibility = None;
        }
    }

    async fn wait_for_next_tick(&mut self) {
        loop {
            match sleep_or_visibility(self.interval, self.visibility.as_mut()).await {
                Wake::Timer | Wake::Visibility(_) => return,
                Wake::SignalClosed => self.visibility = None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use reqwest::StatusCode;

    use super::*;
    use crate::bin_map::BinMap;
    use crate::lifecycle::HostLifecycle;
    use crate::model::BinTelemetrySample;
    use crate::model::tests::sample;
    use crate::state_machine::telemetry::{TelemetryMachine, TelemetrySettings};

    enum Reply {
        Sample(BinTelemetrySample),
        Hang,
    }

    #[derive(Default)]
    struct ScriptedSource {
        replies: std::sync::Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn with(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: std::sync::Mutex::new(replies.into_iter().collect()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TelemetrySource for ScriptedSource {
        async fn fetch_bin(&self, _bin_id: &BinId) -> Result<BinTelemetrySample, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Reply::Sample(sample)) => Ok(sample),
                Some(Reply::Hang) => std::future::pending().await,
                None => {
                    Err(SourceError::Status(StatusCode::SERVICE_UNAVAILABLE))
                }
            }
        }
    }

    fn context() -> Arc<BinContext> {
        Arc::new(BinContext::new(TelemetryMachine::new(
            TelemetrySettings::default(),
        )))
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    const INTERVAL: Duration = Duration::from_secs(2);

    #[tokio::test(start_paused = true)]
    async fn test_fetches_immediately_then_on_interval() {
        let source = ScriptedSource::with([
            Reply::Sample(sample(40.0, true, 10.21, 123.76)),
            Reply::Sample(sample(55.0, true, 10.21, 123.76)),
        ]);
        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&source))
            .context(context())
            .build();

        poller.start(BinId::from("bin-1"), INTERVAL).unwrap();
        assert!(poller.context().snapshot().is_loading());

        advance(10).await;
        assert_eq!(source.calls(), 1);
        let held = poller.context().current_sample().unwrap();
        assert_eq!(held.fill_level_percent, 40.0);

        advance(1_000).await;
        assert_eq!(source.calls(), 1);

        advance(1_000).await;
        assert_eq!(source.calls(), 2);
        let held = poller.context().current_sample().unwrap();
        assert_eq!(held.fill_level_percent, 55.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_last_sample() {
        let source = ScriptedSource::with([Reply::Sample(sample(40.0, true, 10.21, 123.76))]);
        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&source))
            .context(context())
            .build();

        poller.start(BinId::from("bin-1"), INTERVAL).unwrap();
        advance(2_010).await;

        assert_eq!(source.calls(), 2);
        let snapshot = poller.context().snapshot();
        assert!(matches!(snapshot.error, Some(FetchFailure::NetworkFailure(_))));
        assert_eq!(snapshot.current_sample().unwrap().fill_level_percent, 40.0);
        assert!(snapshot.offline_since().is_some());
        assert_eq!(poller.context().consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_fetch_times_out() {
        let source = ScriptedSource::with([Reply::Hang]);
        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&source))
            .context(context())
            .build();

        poller.start(BinId::from("bin-1"), INTERVAL).unwrap();

        advance(9_000).await;
        assert_eq!(source.calls(), 1);
        assert!(poller.context().error().is_none());

        advance(1_010).await;
        assert!(matches!(
            poller.context().error(),
            Some(FetchFailure::NetworkFailure(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_timer() {
        let source = Arc::new(ScriptedSource::default());
        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&source))
            .context(context())
            .build();

        poller.start(BinId::from("bin-1"), INTERVAL).unwrap();
        advance(10).await;
        assert!(poller.is_running());

        assert!(poller.stop());
        assert!(!poller.is_running());
        assert!(!poller.stop());

        advance(10_000).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_resets_failures() {
        let source = Arc::new(ScriptedSource::default());
        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&source))
            .context(context())
            .build();

        let first = poller.start(BinId::from("bin-1"), INTERVAL).unwrap();
        let err = poller.start(BinId::from("bin-1"), INTERVAL).unwrap_err();
        assert_eq!(err.session_id, first);

        advance(4_010).await;
        assert_eq!(poller.context().consecutive_failures(), 3);

        poller.stop();
        let second = poller.start(BinId::from("bin-1"), INTERVAL).unwrap();
        assert_ne!(first, second);
        assert_eq!(poller.context().consecutive_failures(), 0);
        assert!(poller.context().error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_suspends_and_foreground_fetches() {
        let host = HostLifecycle::new(AppVisibility::Background);
        let source = Arc::new(ScriptedSource::default());
        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&source))
            .context(context())
            .visibility(host.subscribe())
            .build();

        poller.start(BinId::from("bin-1"), INTERVAL).unwrap();
        advance(10_000).await;
        assert_eq!(source.calls(), 0);

        host.set_foreground();
        advance(10).await;
        assert_eq!(source.calls(), 1);

        host.set_background();
        advance(10_000).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_bin_from_map_stops_polling() {
        let source = Arc::new(ScriptedSource::default());
        let pollers = BinMap::new();
        let bin_ref = pollers
            .insert_bin(
                BinId::from("bin-1"),
                TelemetryPoller::builder()
                    .source(Arc::clone(&source))
                    .context(context())
                    .build(),
            )
            .unwrap();

        bin_ref
            .view(|poller| poller.start(BinId::from("bin-1"), INTERVAL))
            .unwrap()
            .unwrap();
        advance(10).await;
        assert_eq!(source.calls(), 1);

        for bin_id in pollers.bin_ids() {
            pollers.remove_bin(&bin_id).unwrap();
        }
        assert!(bin_ref.view(|poller| poller.is_running()).is_err());

        advance(10_000).await;
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_polling() {
        let host = HostLifecycle::default();
        let source = Arc::new(ScriptedSource::default());
        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&source))
            .context(context())
            .visibility(host.subscribe())
            .build();

        poller.start(BinId::from("bin-1"), INTERVAL).unwrap();
        advance(10).await;
        poller.dispose();

        advance(10_000).await;
        assert_eq!(source.calls(), 1);
        assert_eq!(host.listener_count(), 0);
    }
}
