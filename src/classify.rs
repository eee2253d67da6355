use crate::model::{BinTelemetrySample, CoordinatesSource};

/// Trust classification of a sample's position data.
///
/// Anything not provably live or stale is offline; there is no unknown class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoordinateClass {
    Live,
    Stale,
    Offline,
}

impl CoordinateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Stale => "stale",
            Self::Offline => "offline",
        }
    }
}

/// Rendering hints for a [`CoordinateClass`]. Carries no behaviour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayStatus {
    pub label: &'static str,
    pub color: &'static str,
    pub opacity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub class: CoordinateClass,
    pub display: DisplayStatus,
}

const LIVE: DisplayStatus = DisplayStatus {
    label: "Live",
    color: "#16a34a",
    opacity: 1.0,
};

const STALE: DisplayStatus = DisplayStatus {
    label: "Stale",
    color: "#d97706",
    opacity: 0.75,
};

const BACKUP: DisplayStatus = DisplayStatus {
    label: "Backup",
    ..STALE
};

const OFFLINE_WITH_FIX: DisplayStatus = DisplayStatus {
    label: "Offline",
    color: "#6b7280",
    opacity: 0.6,
};

const OFFLINE_NO_FIX: DisplayStatus = DisplayStatus {
    label: "No GPS data",
    color: "#6b7280",
    opacity: 0.4,
};

/// Classify the position data of `sample`.
///
/// Rules are evaluated in order and the first match wins. Invalid or timed-out GPS dominates
/// whatever label the source reported. `has_last_known_fix` only affects the display hint of
/// the offline case.
pub fn classify(sample: &BinTelemetrySample, has_last_known_fix: bool) -> Classification {
    let offline = || Classification {
        class: CoordinateClass::Offline,
        display: if has_last_known_fix {
            OFFLINE_WITH_FIX
        } else {
            OFFLINE_NO_FIX
        },
    };

    if !sample.gps_valid || sample.timed_out {
        return offline();
    }

    match (sample.latitude, sample.longitude) {
        (Some(lat), Some(lng)) if !(lat == 0.0 && lng == 0.0) => {}
        _ => return offline(),
    }

    // gps_valid and not timed out from here on.
    match sample.coordinates_source {
        CoordinatesSource::Live => Classification {
            class: CoordinateClass::Live,
            display: LIVE,
        },
        CoordinatesSource::Stale => Classification {
            class: CoordinateClass::Stale,
            display: STALE,
        },
        CoordinatesSource::Backup => Classification {
            class: CoordinateClass::Stale,
            display: BACKUP,
        },
        CoordinatesSource::Offline | CoordinatesSource::Default | CoordinatesSource::NoData => {
            offline()
        }
    }
}
