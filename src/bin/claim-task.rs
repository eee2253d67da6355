use anyhow::{Context, Result};
use binwatch::model::ActivityLogUpdate;
use binwatch::source::ActivitySource;
use binwatch::{ActivityLogId, MonitorConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = MonitorConfig::from_env()?;
    let task_id = std::env::var("TASK_ID").context("missing env var TASK_ID")?;
    let task_id = ActivityLogId::from(task_id);
    let janitor_id = std::env::var("JANITOR_ID").context("missing env var JANITOR_ID")?;

    let api = config.http_api().context("failed to create API client")?;
    let update = ActivityLogUpdate::claim(janitor_id.as_str());
    api.update_activity_log(&task_id, &update)
        .await
        .with_context(|| format!("failed to claim task {task_id}"))?;

    info!(task_id = %task_id, janitor_id = %janitor_id, "Task claimed");
    Ok(())
}
