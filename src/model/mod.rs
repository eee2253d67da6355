//! Data carried between the remote API, the pollers, and consumers.

pub mod activity;
pub mod notification;
pub mod wire;

use chrono::{DateTime, TimeDelta, Utc};

use crate::ids::BinId;

pub use activity::{ActivityLog, ActivityLogUpdate, ActivityStatus};
pub use notification::{NotificationEnvelope, NotificationPriority};

/// Fill level at or above which a bin is reported as [`BinStatus::Warning`].
pub const WARNING_FILL_PERCENT: f64 = 70.0;

/// Fill level at or above which a bin is reported as [`BinStatus::Critical`].
pub const CRITICAL_FILL_PERCENT: f64 = 85.0;

/// Provenance label the source attaches to the position data of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinatesSource {
    Live,
    Stale,
    Backup,
    Offline,
    Default,
    NoData,
}

impl CoordinatesSource {
    /// Parse the source's label. Unknown or empty labels map to [`CoordinatesSource::NoData`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "live" | "gps" => Self::Live,
            "stale" => Self::Stale,
            "backup" => Self::Backup,
            "offline" => Self::Offline,
            "default" => Self::Default,
            _ => Self::NoData,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Stale => "stale",
            Self::Backup => "backup",
            Self::Offline => "offline",
            Self::Default => "default",
            Self::NoData => "noData",
        }
    }
}

/// One snapshot of a bin's sensors.
///
/// Samples are never mutated once published; a newer poll supersedes the held sample as a
/// whole. Latitude and longitude may carry residual values while `gps_valid` is false, so
/// position consumers go through [`valid_fix`](Self::valid_fix) instead of reading them raw.
#[derive(Debug, Clone, PartialEq)]
pub struct BinTelemetrySample {
    pub bin_id: BinId,
    pub fill_level_percent: f64,
    pub weight_kg: Option<f64>,
    pub distance_cm: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub gps_valid: bool,
    pub satellite_count: u32,
    pub captured_at: DateTime<Utc>,
    pub coordinates_source: CoordinatesSource,
    pub last_active_at: Option<DateTime<Utc>>,
    /// Set at ingest when the sensor has not been active within the configured window.
    pub timed_out: bool,
}

impl BinTelemetrySample {
    /// The coordinate pair if this sample is a position update candidate.
    ///
    /// Requires `gps_valid` and both coordinates present and non-zero.
    pub fn valid_fix(&self) -> Option<(f64, f64)> {
        if !self.gps_valid {
            return None;
        }

        match (self.latitude, self.longitude) {
            (Some(lat), Some(lng)) if lat != 0.0 && lng != 0.0 => Some((lat, lng)),
            _ => None,
        }
    }

    /// Whether this sample differs from `previous` on the fields that drive derived state.
    pub fn differs_from(&self, previous: &BinTelemetrySample) -> bool {
        self.fill_level_percent != previous.fill_level_percent
            || self.captured_at != previous.captured_at
            || self.latitude != previous.latitude
            || self.longitude != previous.longitude
    }

    /// Flag the sample as timed-out when its last sign of life is older than `window`.
    pub fn with_timeout_flag(mut self, now: DateTime<Utc>, window: TimeDelta) -> Self {
        let last_seen = self.last_active_at.unwrap_or(self.captured_at);
        self.timed_out = now.signed_duration_since(last_seen) > window;
        self
    }
}

/// Fill status shared by every consumer of derived bin state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinStatus {
    Normal,
    Warning,
    Critical,
}

impl BinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

/// Map a fill level to its [`BinStatus`].
pub fn get_status(fill_level_percent: f64) -> BinStatus {
    if fill_level_percent >= CRITICAL_FILL_PERCENT {
        BinStatus::Critical
    } else if fill_level_percent >= WARNING_FILL_PERCENT {
        BinStatus::Warning
    } else {
        BinStatus::Normal
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .unwrap()
            .with_timezone(&Utc)
    }

    pub(crate) fn sample(fill: f64, gps_valid: bool, lat: f64, lng: f64) -> BinTelemetrySample {
        BinTelemetrySample {
            bin_id: BinId::from("bin-1"),
            fill_level_percent: fill,
            weight_kg: Some(12.5),
            distance_cm: Some(40.0),
            latitude: Some(lat),
            longitude: Some(lng),
            gps_valid,
            satellite_count: 7,
            captured_at: at("2024-05-01T12:00:00Z"),
            coordinates_source: CoordinatesSource::Live,
            last_active_at: None,
            timed_out: false,
        }
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(get_status(0.0), BinStatus::Normal);
        assert_eq!(get_status(69.9), BinStatus::Normal);
        assert_eq!(get_status(70.0), BinStatus::Warning);
        assert_eq!(get_status(84.9), BinStatus::Warning);
        assert_eq!(get_status(85.0), BinStatus::Critical);
        assert_eq!(get_status(100.0), BinStatus::Critical);
    }

    #[test]
    fn test_invalid_gps_is_never_a_fix() {
        let s = sample(10.0, false, 10.21, 123.76);
        assert_eq!(s.valid_fix(), None);
    }

    #[test]
    fn test_zero_coordinate_is_not_a_fix() {
        assert_eq!(sample(10.0, true, 0.0, 123.76).valid_fix(), None);
        assert_eq!(sample(10.0, true, 10.21, 0.0).valid_fix(), None);
        assert_eq!(
            sample(10.0, true, 10.21, 123.76).valid_fix(),
            Some((10.21, 123.76))
        );
    }

    #[test]
    fn test_material_change_fields() {
        let base = sample(40.0, true, 10.21, 123.76);

        let mut same = base.clone();
        same.weight_kg = Some(99.0);
        same.satellite_count = 2;
        assert!(!same.differs_from(&base));

        let mut moved = base.clone();
        moved.longitude = Some(123.77);
        assert!(moved.differs_from(&base));

        let mut newer = base.clone();
        newer.captured_at = at("2024-05-01T12:00:02Z");
        assert!(newer.differs_from(&base));
    }

    #[test]
    fn test_timeout_flag_prefers_last_active() {
        let mut s = sample(40.0, true, 10.21, 123.76);
        s.last_active_at = Some(at("2024-05-01T12:09:00Z"));

        let flagged = s
            .clone()
            .with_timeout_flag(at("2024-05-01T12:10:00Z"), TimeDelta::minutes(5));
        assert!(!flagged.timed_out);

        s.last_active_at = None;
        let flagged = s.with_timeout_flag(at("2024-05-01T12:10:00Z"), TimeDelta::minutes(5));
        assert!(flagged.timed_out);
    }

    #[test]
    fn test_coordinates_source_labels() {
        assert_eq!(CoordinatesSource::from_label("LIVE"), CoordinatesSource::Live);
        assert_eq!(CoordinatesSource::from_label(" backup "), CoordinatesSource::Backup);
        assert_eq!(CoordinatesSource::from_label("satellite"), CoordinatesSource::NoData);
        assert_eq!(CoordinatesSource::from_label(""), CoordinatesSource::NoData);
    }
}
