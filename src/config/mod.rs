//! Configuration: three TOML documents in one directory.
//!
//! - `locations.toml`: monitored places and default quake thresholds
//! - `settings.toml`: thresholds, hysteria, news stack, outputs, classifier
//! - `keywords.toml`: per-location geo terms, roads and locality names
//!
//! Loading validates everything up front; an invalid configuration stops the
//! run before any source is polled.

pub mod classifier;
pub mod keywords;
pub mod locations;
pub mod settings;

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub use classifier::ClassifierConfig;
pub use keywords::{KeywordEntry, KeywordsConfig, Locality};
pub use locations::{Location, LocationDefaults, LocationsConfig};
pub use settings::SettingsConfig;

use crate::signals::SignalParams;

pub const LOCATIONS_FILE: &str = "locations.toml";
pub const SETTINGS_FILE: &str = "settings.toml";
pub const KEYWORDS_FILE: &str = "keywords.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub locations: LocationsConfig,
    pub settings: SettingsConfig,
    pub keywords: KeywordsConfig,
}

impl AppConfig {
    /// Load and validate all three files from `dir`. `keywords.toml` is optional.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let locations: LocationsConfig = load_toml(&dir.join(LOCATIONS_FILE))?;
        let settings: SettingsConfig = load_toml(&dir.join(SETTINGS_FILE))?;
        let kw_path = dir.join(KEYWORDS_FILE);
        let keywords = if kw_path.exists() {
            load_toml(&kw_path)?
        } else {
            tracing::debug!(path = %kw_path.display(), "no keywords file, deriving from labels");
            KeywordsConfig::default()
        };
        let cfg = Self {
            locations,
            settings,
            keywords,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fail with every problem found, one per line.
    pub fn validate(&self) -> Result<()> {
        let mut problems = self.locations.problems();
        problems.extend(self.settings.problems());
        for id in self.settings.per_location_overrides.keys() {
            if self.locations.get(id).is_none() {
                problems.push(format!("per_location_overrides.{id}: unknown location"));
            }
        }
        for id in self.keywords.locations.keys() {
            if self.locations.get(id).is_none() {
                problems.push(format!("keywords.locations.{id}: unknown location"));
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            bail!("invalid configuration:\n  - {}", problems.join("\n  - "))
        }
    }

    /// Configured keywords for `location`, or a fallback derived from its label.
    pub fn keywords_for(&self, location: &Location) -> KeywordEntry {
        self.keywords
            .locations
            .get(&location.id)
            .cloned()
            .unwrap_or_else(|| KeywordEntry::derive(location))
    }

    /// `(normal, emergency)` minimum magnitudes, per-location overrides first.
    pub fn quake_thresholds(&self, location_id: &str) -> (f64, f64) {
        let d = &self.locations.defaults;
        let o = self.settings.per_location_overrides.get(location_id);
        (
            o.and_then(|o| o.quake_min_mag_normal)
                .unwrap_or(d.quake_min_mag_normal),
            o.and_then(|o| o.quake_min_mag_emergency)
                .unwrap_or(d.quake_min_mag_emergency),
        )
    }

    pub fn signal_params(&self) -> SignalParams {
        let s = &self.settings;
        SignalParams {
            news_min_mentions: s.thresholds.news_min_mentions,
            news_spike_factor: s.thresholds.news_spike_factor,
            require_domains: s.news_stack.surge.require_distinct_domains,
            hysteria_sources: s.hysteria.require_sources,
            baseline_window: s.signals.baseline_window,
        }
    }
}

/// Behaviour switches for one run, resolved once and handed to the runner.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub classifier: ClassifierOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierOptions {
    pub enabled: bool,
    pub max_items: usize,
    pub max_chars: usize,
    pub min_severity: u8,
    pub emit_alerts: bool,
    pub emit_min_severity: u8,
    pub enrich_fulltext: bool,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self::from(&ClassifierConfig::default())
    }
}

impl From<&ClassifierConfig> for ClassifierOptions {
    fn from(c: &ClassifierConfig) -> Self {
        Self {
            enabled: c.enabled,
            max_items: c.max_items,
            max_chars: c.max_chars,
            min_severity: c.min_severity,
            emit_alerts: c.emit_alerts,
            emit_min_severity: c.emit_min_severity,
            enrich_fulltext: c.enrich_fulltext,
        }
    }
}

impl RunOptions {
    /// `dry_run` is on when either the CLI flag or `[testing] dry_run` asks for it.
    pub fn from_settings(settings: &SettingsConfig, dry_run_flag: bool) -> Self {
        Self {
            dry_run: dry_run_flag || settings.testing.dry_run,
            classifier: ClassifierOptions::from(&settings.classifier),
        }
    }
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}
