//! JSON shapes returned by the remote API and their validation into domain types.
//!
//! Decoding is deliberately lenient about representation (numeric or string ids, epoch or
//! RFC 3339 timestamps, bare or wrapped lists) and strict about meaning: a reading without a
//! fill level or capture time is rejected rather than guessed.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::ids::{ActivityLogId, BinId, NotificationId};
use crate::model::{
    ActivityLog, ActivityStatus, BinTelemetrySample, CoordinatesSource, NotificationEnvelope,
    NotificationPriority,
};

/// Epoch values below this are interpreted as seconds, at or above as milliseconds.
const EPOCH_MILLIS_CUTOFF: i64 = 100_000_000_000;

/// Indicates that a response body had an unexpected shape or content.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("response body is not valid JSON for this endpoint: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not a finite number")]
    NotFinite { field: &'static str },

    #[error("unrecognised timestamp `{0}`")]
    InvalidTimestamp(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Epoch(i64),
    Text(String),
}

impl WireTimestamp {
    pub fn to_utc(&self) -> Result<DateTime<Utc>, DecodeError> {
        let parsed = match self {
            Self::Epoch(value) if value.unsigned_abs() < EPOCH_MILLIS_CUTOFF.unsigned_abs() => {
                DateTime::from_timestamp(*value, 0)
            }
            Self::Epoch(value) => DateTime::from_timestamp_millis(*value),
            Self::Text(text) => parse_text_timestamp(text),
        };

        parsed.ok_or_else(|| DecodeError::InvalidTimestamp(self.to_string()))
    }
}

impl std::fmt::Display for WireTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Epoch(value) => value.fmt(f),
            Self::Text(text) => text.fmt(f),
        }
    }
}

fn parse_text_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(epoch) = text.parse::<i64>() {
        return WireTimestamp::Epoch(epoch).to_utc().ok();
    }

    // Naive timestamps from the backend database are UTC.
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Number(value) => value.to_string(),
            Self::Text(text) => text,
        }
    }
}

/// Body of `GET /bin/{id}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinReading {
    pub bin_level: Option<f64>,
    pub weight_kg: Option<f64>,
    pub distance_cm: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub gps_valid: bool,
    pub satellites: Option<i64>,
    pub timestamp: Option<WireTimestamp>,
    pub coordinates_source: Option<String>,
    pub last_active: Option<WireTimestamp>,
}

impl BinReading {
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Validate the reading into a sample for `bin_id`.
    ///
    /// Fill levels are clamped into `0..=100`; the timed-out flag is left unset for the
    /// caller, which owns the clock.
    pub fn into_sample(self, bin_id: BinId) -> Result<BinTelemetrySample, DecodeError> {
        let fill = self.bin_level.ok_or(DecodeError::MissingField("binLevel"))?;
        if !fill.is_finite() {
            return Err(DecodeError::NotFinite { field: "binLevel" });
        }

        let captured_at = self
            .timestamp
            .as_ref()
            .ok_or(DecodeError::MissingField("timestamp"))?
            .to_utc()?;

        let last_active_at = self
            .last_active
            .as_ref()
            .map(WireTimestamp::to_utc)
            .transpose()?;

        Ok(BinTelemetrySample {
            bin_id,
            fill_level_percent: fill.clamp(0.0, 100.0),
            weight_kg: self.weight_kg.filter(|v| v.is_finite()),
            distance_cm: self.distance_cm.filter(|v| v.is_finite()),
            latitude: self.latitude.filter(|v| v.is_finite()),
            longitude: self.longitude.filter(|v| v.is_finite()),
            gps_valid: self.gps_valid,
            satellite_count: self
                .satellites
                .map(|count| u32::try_from(count.max(0)).unwrap_or(u32::MAX))
                .unwrap_or(0),
            captured_at,
            coordinates_source: self
                .coordinates_source
                .as_deref()
                .map(CoordinatesSource::from_label)
                .unwrap_or(CoordinatesSource::NoData),
            last_active_at,
            timed_out: false,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireList<T> {
    Bare(Vec<T>),
    Wrapped {
        #[serde(alias = "notifications", alias = "logs", alias = "items")]
        data: Vec<T>,
    },
}

impl<T> WireList<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Bare(items) | Self::Wrapped { data: items } => items,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationWire {
    id: WireId,
    bin_id: Option<WireId>,
    #[serde(alias = "type")]
    kind: Option<String>,
    priority: Option<NotificationPriority>,
    created_at: Option<WireTimestamp>,
    #[serde(default)]
    read: bool,
}

impl NotificationWire {
    fn into_envelope(self) -> Result<NotificationEnvelope, DecodeError> {
        let created_at = self
            .created_at
            .as_ref()
            .ok_or(DecodeError::MissingField("createdAt"))?
            .to_utc()?;

        Ok(NotificationEnvelope {
            id: NotificationId::from(self.id.into_string()),
            bin_id: self.bin_id.map(|id| BinId::from(id.into_string())),
            kind: self.kind.unwrap_or_default(),
            priority: self.priority.unwrap_or_default(),
            created_at,
            read: self.read,
        })
    }
}

/// Decode the body of `GET /notifications/{userId}`.
pub fn decode_notifications(body: &[u8]) -> Result<Vec<NotificationEnvelope>, DecodeError> {
    let list: WireList<NotificationWire> = serde_json::from_slice(body)?;
    list.into_vec()
        .into_iter()
        .map(NotificationWire::into_envelope)
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityLogWire {
    id: WireId,
    bin_id: WireId,
    status: ActivityStatus,
    assigned_janitor_id: Option<WireId>,
    created_at: Option<WireTimestamp>,
}

impl ActivityLogWire {
    fn into_log(self) -> Result<ActivityLog, DecodeError> {
        let created_at = self
            .created_at
            .as_ref()
            .ok_or(DecodeError::MissingField("createdAt"))?
            .to_utc()?;

        Ok(ActivityLog {
            id: ActivityLogId::from(self.id.into_string()),
            bin_id: BinId::from(self.bin_id.into_string()),
            status: self.status,
            assigned_janitor_id: self.assigned_janitor_id.map(WireId::into_string),
            created_at,
        })
    }
}

/// Decode the body of `GET /activity-logs`.
pub fn decode_activity_logs(body: &[u8]) -> Result<Vec<ActivityLog>, DecodeError> {
    let list: WireList<ActivityLogWire> = serde_json::from_slice(body)?;
    list.into_vec()
        .into_iter()
        .map(ActivityLogWire::into_log)
        .collect()
}
