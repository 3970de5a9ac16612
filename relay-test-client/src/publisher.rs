use anyhow::{Context, Result};
use clap::Args;
use redis::AsyncCommands;
use serde_json::{json, Value};
use sse::channel::StatusChannel;
use sse::message::StatusEvent;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// initializing, queued, running, completed, error, aborted or not_found
    #[arg(long)]
    status: String,

    /// Free-form progress, e.g. "40%" or "3/10 prompts"
    #[arg(long)]
    progress: Option<String>,

    /// Error message (with --status error)
    #[arg(long)]
    error: Option<String>,

    /// Results as JSON (with --status completed)
    #[arg(long)]
    results: Option<String>,

    #[arg(long)]
    runtime_seconds: Option<f64>,
}

impl StatusArgs {
    /// Builds the event from the same flat JSON the compute service publishes, so status
    /// names map to `StatusKind` exactly as subscribers parse them.
    pub fn into_event(self) -> Result<StatusEvent> {
        let results: Option<Value> = self
            .results
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .context("--results must be valid JSON")?;

        let wire = json!({
            "status": self.status,
            "progress": self.progress,
            "error": self.error,
            "results": results,
            "runtime_seconds": self.runtime_seconds,
        });
        serde_json::from_value(wire).context("Invalid status event")
    }
}

/// Publishes `event` on the test's status channel and returns how many subscribers
/// received it.
pub async fn publish(redis_url: &str, test_id: &str, event: &StatusEvent) -> Result<i64> {
    let channel = StatusChannel::for_test(test_id).map_err(|e| anyhow::anyhow!("{e}"))?;
    let payload = serde_json::to_string(event)?;

    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;
    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .with_context(|| format!("Failed to connect to {redis_url}"))?;

    let receivers: i64 = conn.publish(channel.name(), payload).await?;
    Ok(receivers)
}
