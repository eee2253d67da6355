use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use crate::model::BinTelemetrySample;

/// Default number of points kept in a [`GpsHistory`].
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// A remembered valid GPS position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub observed_at: DateTime<Utc>,
}

/// Holds the most recent valid fix independently of whether the newest sample carries one.
///
/// Only written through [`update`](Self::update), which ignores any sample that is not a
/// position update candidate.
#[derive(Debug, Clone, Default)]
pub struct LastKnownPositionStore {
    fix: Option<PositionFix>,
}

impl LastKnownPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored fix from `sample` if it carries a valid fix, returning whether the
    /// store changed.
    pub fn update(&mut self, sample: &BinTelemetrySample) -> bool {
        let Some((latitude, longitude)) = sample.valid_fix() else {
            return false;
        };

        self.fix = Some(PositionFix {
            latitude,
            longitude,
            observed_at: sample.captured_at,
        });
        true
    }

    pub fn get(&self) -> Option<&PositionFix> {
        self.fix.as_ref()
    }

    pub(crate) fn clear(&mut self) {
        self.fix = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsHistoryPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
}

/// Append-only trail of recent valid fixes in arrival order, bounded to a fixed capacity.
///
/// When full, the oldest point is dropped to make room.
#[derive(Debug, Clone)]
pub struct GpsHistory {
    points: VecDeque<GpsHistoryPoint>,
    capacity: usize,
}

impl GpsHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append the fix of `sample`, if it has one. Returns whether a point was appended.
    pub fn record(&mut self, sample: &BinTelemetrySample) -> bool {
        let Some((latitude, longitude)) = sample.valid_fix() else {
            return false;
        };

        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(GpsHistoryPoint {
            latitude,
            longitude,
            captured_at: sample.captured_at,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &GpsHistoryPoint> {
        self.points.iter()
    }

    pub fn to_vec(&self) -> Vec<GpsHistoryPoint> {
        self.points.iter().copied().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.points.clear();
    }
}

impl Default for GpsHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}
