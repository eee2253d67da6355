use std::time::Duration;

/// Default base interval between notification polls.
pub const NOTIFICATION_BASE_INTERVAL: Duration = Duration::from_secs(30);

/// Default ceiling for the notification poll interval under backoff.
pub const NOTIFICATION_MAX_INTERVAL: Duration = Duration::from_secs(300);

/// How a polling loop stretches its interval under repeated failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub base_interval: Duration,
    pub max_interval: Duration,
    /// Factor applied per failure once the threshold is exceeded. Values below 1 are treated as 1.
    pub multiplier: f64,
    /// Failures tolerated at the base interval before backing off.
    pub failure_threshold: u32,
}

impl BackoffPolicy {
    /// A policy that never backs off, retrying at `interval` regardless of failures.
    pub fn fixed(interval: Duration) -> Self {
        Self {
            base_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            failure_threshold: u32::MAX,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_interval: NOTIFICATION_BASE_INTERVAL,
            max_interval: NOTIFICATION_MAX_INTERVAL,
            multiplier: 1.5,
            failure_threshold: 3,
        }
    }
}

/// Per-loop polling state. Internal to a poller, never exposed to consumers.
#[derive(Debug, Clone)]
pub struct PollState {
    policy: BackoffPolicy,
    interval: Duration,
    consecutive_failures: u32,
    is_active: bool,
}

impl PollState {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            interval: policy.base_interval,
            policy,
            consecutive_failures: 0,
            is_active: false,
        }
    }

    /// Mark the loop active with fresh counters.
    pub fn activate(&mut self) {
        self.reset();
        self.is_active = true;
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    pub fn record_success(&mut self) {
        self.reset();
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if self.consecutive_failures > self.policy.failure_threshold {
            let multiplier = if self.policy.multiplier.is_finite() {
                self.policy.multiplier.max(1.0)
            } else {
                1.0
            };
            let max = self.policy.max_interval.max(self.policy.base_interval);
            let next = self.interval.as_secs_f64() * multiplier;
            self.interval = if next >= max.as_secs_f64() {
                max
            } else {
                Duration::from_secs_f64(next)
            };
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    fn reset(&mut self) {
        self.interval = self.policy.base_interval;
        self.consecutive_failures = 0;
    }
}
