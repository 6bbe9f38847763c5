//! Run summary: one JSON document per run, replacing the previous one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::decision::{AlertDecision, Priority};
use crate::signals::SurgeResult;
use crate::sources::SourceResult;
use crate::state::write_atomic;

/// Health of one source poll. Items themselves are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub ok: bool,
    pub count: usize,
    pub error: Option<String>,
    pub latency_ms: Option<u64>,
}

impl From<&SourceResult> for SourceHealth {
    fn from(r: &SourceResult) -> Self {
        Self {
            ok: r.ok,
            count: r.items.len(),
            error: r.error.clone(),
            latency_ms: r.latency_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub provider: String,
    pub title: String,
    pub priority: Priority,
    pub reason: String,
    pub channels: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipRecord {
    pub provider: String,
    pub title: String,
    /// `duplicate` or `cooldown`.
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub sources: BTreeMap<String, SourceHealth>,
    pub alerts: Vec<AlertRecord>,
    pub skipped: Vec<SkipRecord>,
    pub surges: Vec<SurgeResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub locations: BTreeMap<String, LocationSummary>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: None,
            dry_run,
            locations: BTreeMap::new(),
        }
    }

    fn location(&mut self, location_id: &str) -> &mut LocationSummary {
        self.locations.entry(location_id.to_string()).or_default()
    }

    pub fn record_source(&mut self, result: &SourceResult) {
        self.location(&result.location_id)
            .sources
            .insert(result.provider.clone(), SourceHealth::from(result));
    }

    pub fn record_alert(&mut self, decision: &AlertDecision, channels: &BTreeMap<String, bool>) {
        self.location(&decision.location_id).alerts.push(AlertRecord {
            provider: decision.provider.clone(),
            title: decision.title.clone(),
            priority: decision.priority,
            reason: decision.reason.clone(),
            channels: channels.clone(),
        });
    }

    pub fn record_skip(&mut self, decision: &AlertDecision, reason: &str) {
        self.location(&decision.location_id).skipped.push(SkipRecord {
            provider: decision.provider.clone(),
            title: decision.title.clone(),
            reason: reason.to_string(),
        });
    }

    pub fn record_surge(&mut self, surge: &SurgeResult) {
        self.location(&surge.location_id).surges.push(surge.clone());
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    /// Pretty JSON, written via tmp file + rename.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("serializing run summary")?;
        write_atomic(path, &json).with_context(|| format!("writing run summary to {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading run summary from {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }
}
