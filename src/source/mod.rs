//! External collaborators the pollers fetch from.
//!
//! The traits are the seam between the polling engine and the network. [`HttpApi`] is the
//! production implementation; tests substitute scripted in-memory sources.

pub mod error;
pub mod http;

use std::future::Future;

use crate::ids::{ActivityLogId, BinId, UserId};
use crate::model::{ActivityLog, ActivityLogUpdate, BinTelemetrySample, NotificationEnvelope};

pub use error::SourceError;
pub use http::HttpApi;

/// Returns the latest known reading for one monitored bin.
pub trait TelemetrySource: Send + Sync + 'static {
    fn fetch_bin(
        &self,
        bin_id: &BinId,
    ) -> impl Future<Output = Result<BinTelemetrySample, SourceError>> + Send;
}

/// Returns the pending-task notifications of one user.
pub trait NotificationSource: Send + Sync + 'static {
    fn fetch_notifications(
        &self,
        user_id: &UserId,
    ) -> impl Future<Output = Result<Vec<NotificationEnvelope>, SourceError>> + Send;
}

/// Reads and updates activity logs (pickup tasks).
pub trait ActivitySource: Send + Sync + 'static {
    fn list_activity_logs(&self)
    -> impl Future<Output = Result<Vec<ActivityLog>, SourceError>> + Send;

    fn update_activity_log(
        &self,
        id: &ActivityLogId,
        update: &ActivityLogUpdate,
    ) -> impl Future<Output = Result<(), SourceError>> + Send;
}
