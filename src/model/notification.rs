use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::ids::{BinId, NotificationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
    #[serde(other)]
    Unknown,
}

/// A pending-task notification as tracked by the client.
///
/// Everything except `read` is owned by the server. The local `read` flag is merged across
/// polls by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEnvelope {
    pub id: NotificationId,
    pub bin_id: Option<BinId>,
    pub kind: String,
    pub priority: NotificationPriority,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
