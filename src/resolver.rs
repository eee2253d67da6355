use chrono::{DateTime, Utc};

use crate::elapsed::format_elapsed;
use crate::model::BinTelemetrySample;
use crate::position::LastKnownPositionStore;

/// Label for a position taken from the current sample.
pub const LIVE_LABEL: &str = "Live";

/// Label when neither the current sample nor the store has a position.
pub const NO_GPS_LABEL: &str = "No GPS data";

/// A fixed coordinate pair rendered when no fix has ever been seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultLocation {
    pub latitude: f64,
    pub longitude: f64,
}

/// Fallback coordinate used unless the deployment configures its own.
pub const DEFAULT_LOCATION: DefaultLocation = DefaultLocation {
    latitude: 10.3157,
    longitude: 123.8854,
};

/// The coordinate a consumer should render right now.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeCoordinates {
    pub latitude: f64,
    pub longitude: f64,
    pub is_offline: bool,
    pub staleness_label: String,
}

/// Resolve the coordinate to render from the current sample, falling back to the last known
/// fix and then to `default`.
///
/// Reads `store` and never writes it.
pub fn resolve(
    current: Option<&BinTelemetrySample>,
    store: &LastKnownPositionStore,
    default: DefaultLocation,
    now: DateTime<Utc>,
) -> SafeCoordinates {
    if let Some((latitude, longitude)) = current.and_then(BinTelemetrySample::valid_fix) {
        return SafeCoordinates {
            latitude,
            longitude,
            is_offline: false,
            staleness_label: LIVE_LABEL.to_string(),
        };
    }

    if let Some(fix) = store.get() {
        return SafeCoordinates {
            latitude: fix.latitude,
            longitude: fix.longitude,
            is_offline: true,
            staleness_label: format_elapsed(fix.observed_at, now),
        };
    }

    SafeCoordinates {
        latitude: default.latitude,
        longitude: default.longitude,
        is_offline: true,
        staleness_label: NO_GPS_LABEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::model::tests::sample;

    const DEFAULT: DefaultLocation = DefaultLocation {
        latitude: 10.3157,
        longitude: 123.8854,
    };

    #[test]
    fn test_live_sample_wins() {
        let mut store = LastKnownPositionStore::new();
        let s = sample(50.0, true, 10.21, 123.76);
        store.update(&s);

        let coords = resolve(Some(&s), &store, DEFAULT, s.captured_at);
        assert_eq!((coords.latitude, coords.longitude), (10.21, 123.76));
        assert!(!coords.is_offline);
        assert_eq!(coords.staleness_label, "Live");
    }

    #[test]
    fn test_falls_back_to_last_known_fix() {
        let mut store = LastKnownPositionStore::new();
        let good = sample(50.0, true, 10.21, 123.76);
        store.update(&good);

        let mut lost = sample(52.0, false, 99.0, 99.0);
        lost.captured_at = good.captured_at + TimeDelta::minutes(3);
        store.update(&lost);

        let now = good.captured_at + TimeDelta::minutes(5);
        let coords = resolve(Some(&lost), &store, DEFAULT, now);
        assert_eq!((coords.latitude, coords.longitude), (10.21, 123.76));
        assert!(coords.is_offline);
        assert_eq!(coords.staleness_label, "5 minutes ago");
    }

    #[test]
    fn test_default_location_without_any_fix() {
        let store = LastKnownPositionStore::new();
        let s = sample(50.0, false, 0.0, 0.0);

        for current in [None, Some(&s)] {
            let coords = resolve(current, &store, DEFAULT, s.captured_at);
            assert_eq!((coords.latitude, coords.longitude), (10.3157, 123.8854));
            assert!(coords.is_offline);
            assert_eq!(coords.staleness_label, "No GPS data");
        }
    }
}
