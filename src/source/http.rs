use std::time::Duration;

use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use super::{ActivitySource, NotificationSource, SourceError, TelemetrySource};
use crate::ids::{ActivityLogId, BinId, UserId};
use crate::model::wire::{BinReading, decode_activity_logs, decode_notifications};
use crate::model::{ActivityLog, ActivityLogUpdate, BinTelemetrySample, NotificationEnvelope};
use crate::{ACTIVITY_LOGS_SEGMENT, BIN_SEGMENT, NOTIFICATIONS_SEGMENT};

/// JSON-over-HTTP client for the monitoring backend.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client for the API rooted at `base_url`, failing requests after `timeout`.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, SourceError> {
        if base_url.cannot_be_a_base() {
            return Err(SourceError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the URL for `segments` below the base URL, percent-encoding each segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SourceError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Vec<u8>, SourceError> {
        debug!(url = %url, "GET");
        let response = self.client.get(url).send().await?;
        let response = check_status(response)?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SourceError::Status(status))
    }
}

impl TelemetrySource for HttpApi {
    async fn fetch_bin(&self, bin_id: &BinId) -> Result<BinTelemetrySample, SourceError> {
        let url = self.endpoint(&[BIN_SEGMENT, bin_id.as_str()])?;
        let body = self.get(url).await?;
        Ok(BinReading::from_slice(&body)?.into_sample(bin_id.clone())?)
    }
}

impl NotificationSource for HttpApi {
    async fn fetch_notifications(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<NotificationEnvelope>, SourceError> {
        let url = self.endpoint(&[NOTIFICATIONS_SEGMENT, user_id.as_str()])?;
        let body = self.get(url).await?;
        Ok(decode_notifications(&body)?)
    }
}

impl ActivitySource for HttpApi {
    async fn list_activity_logs(&self) -> Result<Vec<ActivityLog>, SourceError> {
        let url = self.endpoint(&[ACTIVITY_LOGS_SEGMENT])?;
        let body = self.get(url).await?;
        Ok(decode_activity_logs(&body)?)
    }

    async fn update_activity_log(
        &self,
        id: &ActivityLogId,
        update: &ActivityLogUpdate,
    ) -> Result<(), SourceError> {
        let url = self.endpoint(&[ACTIVITY_LOGS_SEGMENT, id.as_str()])?;
        debug!(url = %url, "PUT");
        let response = self.client.put(url).json(update).send().await?;
        check_status(response)?;
        Ok(())
    }
}
