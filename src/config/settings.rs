// src/config/settings.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::classifier::ClassifierConfig;
use crate::rolling::DEFAULT_WINDOW;

fn default_schedule_minutes() -> u32 {
    10
}
fn default_source_timeout_secs() -> u64 {
    20
}
fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}
fn default_true() -> bool {
    true
}
fn default_baseline_window() -> usize {
    DEFAULT_WINDOW
}
fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputsConfig {
    pub use_email: bool,
    pub use_pushover: bool,
    pub emergency_retry_sec: u32,
    pub emergency_expire_sec: u32,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default)]
    pub pushover_sound: Option<String>,
    #[serde(default)]
    pub pushover_device: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default)]
    pub allowlist_domains: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_schedule_minutes")]
    pub schedule_minutes: u32,
    /// Hard upper bound on a single source poll.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    /// Official-alert severities that count as emergencies (e.g. Severe, Extreme).
    pub nws_severity_emergency: Vec<String>,
    pub news_spike_factor: f64,
    pub news_min_mentions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HysteriaConfig {
    pub require_sources: usize,
    pub cooldown_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeConfig {
    pub require_distinct_domains: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsStackConfig {
    #[serde(default)]
    pub rss_sources: Vec<String>,
    /// Templates with `<CITY STATE>` / `<COUNTY STATE>` markers.
    #[serde(default)]
    pub google_news_queries_per_location: Vec<String>,
    #[serde(default)]
    pub hazard_keywords: Vec<String>,
    #[serde(default = "default_true")]
    pub require_hazard: bool,
    pub surge: SurgeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_baseline_window")]
    pub baseline_window: usize,
    /// Carry news baselines across runs through the state file metadata.
    #[serde(default = "default_true")]
    pub persist_baselines: bool,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            baseline_window: default_baseline_window(),
            persist_baselines: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateConfig {
    /// Age after which `seen` entries are pruned at load. 0 keeps them forever.
    #[serde(default = "default_retention_days")]
    pub seen_retention_days: u32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            seen_retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuakeOverrides {
    #[serde(default)]
    pub quake_min_mag_normal: Option<f64>,
    #[serde(default)]
    pub quake_min_mag_emergency: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestingConfig {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsConfig {
    pub global: GlobalConfig,
    pub thresholds: ThresholdsConfig,
    pub hysteria: HysteriaConfig,
    pub news_stack: NewsStackConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub per_location_overrides: BTreeMap<String, QuakeOverrides>,
    #[serde(default)]
    pub testing: TestingConfig,
}

impl SettingsConfig {
    pub(crate) fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        let g = &self.global;
        if g.schedule_minutes == 0 {
            out.push("global.schedule_minutes must be > 0".to_string());
        }
        if g.source_timeout_secs == 0 {
            out.push("global.source_timeout_secs must be > 0".to_string());
        }
        if g.outputs.emergency_retry_sec == 0 {
            out.push("global.outputs.emergency_retry_sec must be > 0".to_string());
        }
        if g.outputs.emergency_expire_sec == 0 {
            out.push("global.outputs.emergency_expire_sec must be > 0".to_string());
        }
        let t = &self.thresholds;
        if t.news_spike_factor <= 0.0 || !t.news_spike_factor.is_finite() {
            out.push("thresholds.news_spike_factor must be > 0".to_string());
        }
        if t.news_min_mentions == 0 {
            out.push("thresholds.news_min_mentions must be > 0".to_string());
        }
        if self.hysteria.require_sources == 0 {
            out.push("hysteria.require_sources must be > 0".to_string());
        }
        if self.hysteria.cooldown_minutes <= 0 {
            out.push("hysteria.cooldown_minutes must be > 0".to_string());
        }
        if self.news_stack.surge.require_distinct_domains <= 1 {
            out.push("news_stack.surge.require_distinct_domains must be > 1".to_string());
        }
        if self.signals.baseline_window == 0 {
            out.push("signals.baseline_window must be > 0".to_string());
        }
        for (id, o) in &self.per_location_overrides {
            if let (Some(n), Some(e)) = (o.quake_min_mag_normal, o.quake_min_mag_emergency) {
                if e < n {
                    out.push(format!(
                        "per_location_overrides.{id}: emergency magnitude must be >= normal magnitude"
                    ));
                }
            }
        }
        out.extend(self.classifier.problems());
        out
    }
}
