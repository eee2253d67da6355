use std::sync::Arc;

use anyhow::{Context, Result};
use binwatch::elapsed::format_elapsed;
use binwatch::model::ActivityStatus;
use binwatch::source::ActivitySource;
use binwatch::state_machine::notification::NotificationSnapshot;
use binwatch::state_machine::telemetry::TelemetrySnapshot;
use binwatch::{
    BinId, BinMap, HostLifecycle, MonitorConfig, NotificationPoller, TelemetryPoller, UserId,
};
use chrono::Utc;
use futures::{Stream, StreamExt};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = MonitorConfig::from_env()?;
    let api = Arc::new(config.http_api().context("failed to create API client")?);

    let bin_ids: Vec<BinId> = std::env::var("BINWATCH_BIN_IDS")
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(BinId::from)
        .collect();
    let user_id = std::env::var("BINWATCH_USER_ID").ok().map(UserId::from);

    info!(
        api = %config.api_base_url,
        bins = bin_ids.len(),
        user_id = ?user_id,
        "Monitor starting"
    );

    match api.list_activity_logs().await {
        Ok(logs) => {
            let pending = logs
                .iter()
                .filter(|log| log.status == ActivityStatus::Pending)
                .count();
            info!(total = logs.len(), pending, "Loaded activity logs");
        }
        Err(e) => warn!(error = %e, "Failed to load activity logs"),
    }

    let host = HostLifecycle::default();
    let pollers = BinMap::new();

    for bin_id in bin_ids {
        let context = Arc::new(config.bin_context());
        let updates = context.updates();

        let poller = TelemetryPoller::builder()
            .source(Arc::clone(&api))
            .context(context)
            .request_timeout(config.request_timeout)
            .visibility(host.subscribe())
            .build();
        let bin_ref = match pollers.insert_bin(bin_id.clone(), poller) {
            Ok(bin_ref) => bin_ref,
            Err(e) => {
                warn!(error = %e, "Skipping duplicate bin");
                continue;
            }
        };

        let started =
            bin_ref.view(|poller| poller.start(bin_id.clone(), config.telemetry_interval))?;
        if let Err(e) = started {
            warn!(bin_id = %bin_id, error = %e, "Failed to start bin poller");
            pollers.remove_bin(&bin_id)?;
            continue;
        }
        tokio::spawn(log_bin_updates(bin_id, updates));
    }

    let notifications = match user_id {
        Some(user_id) => {
            let context = Arc::new(config.notification_context());
            tokio::spawn(log_notification_updates(context.updates()));

            let poller = NotificationPoller::builder()
                .source(Arc::clone(&api))
                .context(context)
                .request_timeout(config.request_timeout)
                .visibility(host.subscribe())
                .build();
            poller.start(user_id)?;
            Some(poller)
        }
        None => None,
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!(bins = pollers.len(), "Shutting down");
    for bin_id in pollers.bin_ids() {
        pollers.remove_bin(&bin_id)?;
        info!(bin_id = %bin_id, "Stopped monitoring bin");
    }
    if let Some(poller) = notifications {
        poller.dispose();
    }

    Ok(())
}

async fn log_bin_updates(
    bin_id: BinId,
    mut updates: impl Stream<Item = Arc<TelemetrySnapshot>> + Unpin,
) {
    while let Some(snapshot) = updates.next().await {
        if let Some(derived) = &snapshot.derived {
            info!(
                bin_id = %bin_id,
                fill_level = derived.sample.fill_level_percent,
                status = ?derived.status,
                gps = derived.classification.display.label,
                latitude = derived.coordinates.latitude,
                longitude = derived.coordinates.longitude,
                position_age = %derived.coordinates.staleness_label,
                reading_age = %format_elapsed(derived.sample.captured_at, Utc::now()),
                "Bin updated"
            );
        }

        if let Some(error) = &snapshot.error {
            let since = snapshot
                .offline_since()
                .map(|at| format_elapsed(at, Utc::now()));
            warn!(bin_id = %bin_id, error = %error, last_update = ?since, "Bin unreachable");
        }
    }
}

async fn log_notification_updates(
    mut updates: impl Stream<Item = Arc<NotificationSnapshot>> + Unpin,
) {
    while let Some(snapshot) = updates.next().await {
        if !snapshot.loaded && snapshot.error.is_none() {
            continue;
        }

        info!(
            total = snapshot.notifications.len(),
            unread = snapshot.unread_count,
            "Notifications updated"
        );
        if let Some(error) = &snapshot.error {
            warn!(error = %error, "Notifications unavailable");
        }
    }
}
