// src/config/classifier.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_api_key() -> String {
    "ENV".to_string()
}
fn default_max_items() -> usize {
    10
}
fn default_max_chars() -> usize {
    1000
}
fn default_min_severity() -> u8 {
    1
}
fn default_emit_min_severity() -> u8 {
    2
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    20
}

/// Optional news classifier settings (`[classifier]` in settings.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only "openai" is wired up.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// "ENV" means: read from OPENAI_API_KEY.
    #[serde(default = "default_api_key")]
    pub api_key: String,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    /// Severity floor (1..=3) for an item to count as corroboration.
    #[serde(default = "default_min_severity")]
    pub min_severity: u8,
    #[serde(default)]
    pub emit_alerts: bool,
    /// Severity floor (1..=3) for an accepted item to become an alert.
    #[serde(default = "default_emit_min_severity")]
    pub emit_min_severity: u8,
    #[serde(default = "default_true")]
    pub enrich_fulltext: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            model: default_model(),
            api_key: default_api_key(),
            max_items: default_max_items(),
            max_chars: default_max_chars(),
            min_severity: default_min_severity(),
            emit_alerts: false,
            emit_min_severity: default_emit_min_severity(),
            enrich_fulltext: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClassifierConfig {
    /// Resolve the API key, following the "ENV" convention. Empty ⇒ `None`.
    pub fn resolve_api_key(&self) -> Option<String> {
        let key = if self.api_key.trim().eq_ignore_ascii_case("env") {
            match self.provider.to_ascii_lowercase().as_str() {
                "openai" => env::var("OPENAI_API_KEY").unwrap_or_default(),
                _ => String::new(),
            }
        } else {
            self.api_key.clone()
        };
        let key = key.trim().to_string();
        (!key.is_empty()).then_some(key)
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, v) in [
            ("min_severity", self.min_severity),
            ("emit_min_severity", self.emit_min_severity),
        ] {
            if !(1..=3).contains(&v) {
                out.push(format!("classifier.{name} must be within 1..=3, got {v}"));
            }
        }
        if self.max_items == 0 {
            out.push("classifier.max_items must be > 0".to_string());
        }
        if self.enabled && !self.provider.eq_ignore_ascii_case("openai") {
            out.push(format!(
                "classifier.provider `{}` is not supported",
                self.provider
            ));
        }
        out
    }
}
