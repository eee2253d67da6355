use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ActivityLogId, BinId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

/// A pickup task or activity record from `GET /activity-logs`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLog {
    pub id: ActivityLogId,
    pub bin_id: BinId,
    pub status: ActivityStatus,
    pub assigned_janitor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Partial update body for `PUT /activity-logs/{id}`. Unset fields are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ActivityStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_janitor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ActivityLogUpdate {
    /// Claim the task for `janitor_id`, moving it to in-progress.
    pub fn claim(janitor_id: impl Into<String>) -> Self {
        Self {
            status: Some(ActivityStatus::InProgress),
            assigned_janitor_id: Some(janitor_id.into()),
            ..Self::default()
        }
    }

    /// Mark the task completed at `completed_at`.
    pub fn complete(completed_at: DateTime<Utc>) -> Self {
        Self {
            status: Some(ActivityStatus::Completed),
            completed_at: Some(completed_at),
            ..Self::default()
        }
    }
}
