//! Run metrics. Recording goes through the `metrics` facade and is a no-op
//! until a recorder is installed, so the run never depends on it.

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::path::Path;

use crate::decision::AlertDecision;
use crate::signals::SurgeResult;
use crate::sources::SourceResult;

pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("runs_total", "Completed runs.");
        describe_histogram!("run_duration_seconds", "Wall time of a full run.");
        describe_counter!("source_fetch_total", "Source polls by provider and outcome.");
        describe_histogram!("source_fetch_latency_ms", "Source poll latency in milliseconds.");
        describe_counter!("source_items_total", "Items returned by sources.");
        describe_counter!("news_surge_checks_total", "News surge evaluations.");
        describe_counter!("alerts_dispatched_total", "Decisions that passed gating.");
        describe_counter!("alerts_skipped_total", "Decisions suppressed by dedupe or cooldown.");
        describe_counter!("channel_delivery_total", "Per-channel delivery outcomes.");
    });
}

pub fn record_run_start(run_id: &str) {
    ensure_metrics_described();
    tracing::debug!(target: "metrics", run_id, "run started");
}

pub fn record_run_end(duration_secs: f64) {
    counter!("runs_total").increment(1);
    histogram!("run_duration_seconds").record(duration_secs);
}

pub fn record_fetch(result: &SourceResult) {
    let ok = if result.ok { "true" } else { "false" };
    counter!("source_fetch_total", "provider" => result.provider.clone(), "ok" => ok).increment(1);
    if let Some(ms) = result.latency_ms {
        histogram!("source_fetch_latency_ms", "provider" => result.provider.clone()).record(ms as f64);
    }
    counter!("source_items_total", "provider" => result.provider.clone())
        .increment(result.items.len() as u64);
}

pub fn record_surge(surge: &SurgeResult) {
    let tripped = if surge.tripped { "true" } else { "false" };
    counter!("news_surge_checks_total", "tripped" => tripped).increment(1);
}

pub fn record_alert(decision: &AlertDecision, channels: &std::collections::BTreeMap<String, bool>) {
    counter!(
        "alerts_dispatched_total",
        "provider" => decision.provider.clone(),
        "priority" => decision.priority.to_string()
    )
    .increment(1);
    for (channel, delivered) in channels {
        let delivered = if *delivered { "true" } else { "false" };
        counter!("channel_delivery_total", "channel" => channel.clone(), "delivered" => delivered)
            .increment(1);
    }
}

pub fn record_skip(reason: &'static str) {
    counter!("alerts_skipped_total", "reason" => reason).increment(1);
}

/// Install the Prometheus recorder for this process.
pub fn install_prometheus() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}

/// Write the current exposition text next to the state file.
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    crate::state::write_atomic(path, handle.render().as_bytes())
        .with_context(|| format!("writing metrics to {}", path.display()))
}
