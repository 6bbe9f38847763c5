//! # Signals Engine
//! Per-location surge detection over news mention counts, plus the run-scoped
//! corroboration sets that drive hysteria.
//!
//! A surge trips when all three hold:
//!   - volume: `count >= news_min_mentions`
//!   - spike: baseline is zero, or `count >= baseline * news_spike_factor`
//!   - diversity: `distinct_domains >= require_domains`
//!
//! Corroboration is cleared by `reset_run_state` at the end of every run;
//! baselines live as long as the engine (and can be exported for persistence).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::rolling::{RollingBaseline, DEFAULT_WINDOW};

/// Corroboration tag registered by a tripped news surge.
pub const NEWS_SIGNAL: &str = "news";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalParams {
    pub news_min_mentions: u32,
    pub news_spike_factor: f64,
    pub require_domains: u32,
    pub hysteria_sources: usize,
    pub baseline_window: usize,
}

impl Default for SignalParams {
    fn default() -> Self {
        Self {
            news_min_mentions: 3,
            news_spike_factor: 2.0,
            require_domains: 2,
            hysteria_sources: 2,
            baseline_window: DEFAULT_WINDOW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgeResult {
    pub location_id: String,
    pub count: u32,
    /// Median of prior observations.
    pub baseline: f64,
    /// `count / baseline`, or the raw count when the baseline is zero.
    pub factor: f64,
    pub distinct_domains: u32,
    pub tripped: bool,
}

#[derive(Debug, Default)]
pub struct SignalsEngine {
    params: SignalParams,
    baselines: HashMap<String, RollingBaseline>,
    confirmations: HashMap<String, BTreeSet<String>>,
}

impl SignalsEngine {
    pub fn new(params: SignalParams) -> Self {
        Self {
            params,
            baselines: HashMap::new(),
            confirmations: HashMap::new(),
        }
    }

    pub fn params(&self) -> &SignalParams {
        &self.params
    }

    pub fn record_news(
        &mut self,
        location_id: &str,
        count: u32,
        distinct_domains: u32,
    ) -> SurgeResult {
        let window = self.params.baseline_window;
        let baseline = self
            .baselines
            .entry(location_id.to_string())
            .or_insert_with(|| RollingBaseline::with_window(window))
            .observe(count);

        let factor = if baseline == 0.0 {
            f64::from(count)
        } else {
            f64::from(count) / baseline
        };

        let tripped = count >= self.params.news_min_mentions
            && (baseline == 0.0 || f64::from(count) >= baseline * self.params.news_spike_factor)
            && distinct_domains >= self.params.require_domains;

        if tripped {
            self.record_confirmation(location_id, NEWS_SIGNAL);
        }

        SurgeResult {
            location_id: location_id.to_string(),
            count,
            baseline,
            factor,
            distinct_domains,
            tripped,
        }
    }

    pub fn record_confirmation(&mut self, location_id: &str, source_name: &str) {
        self.confirmations
            .entry(location_id.to_string())
            .or_default()
            .insert(source_name.to_string());
    }

    pub fn hysteria_active(&self, location_id: &str) -> bool {
        self.confirmations
            .get(location_id)
            .map_or(0, BTreeSet::len)
            >= self.params.hysteria_sources
    }

    /// Sorted names of the sources that corroborated `location_id` this run.
    pub fn corroborating_sources(&self, location_id: &str) -> Vec<String> {
        self.confirmations
            .get(location_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn reset_run_state(&mut self) {
        self.confirmations.clear();
    }

    /// Samples currently held for `location_id` (oldest first).
    pub fn baseline_samples(&self, location_id: &str) -> Vec<u32> {
        self.baselines
            .get(location_id)
            .map(RollingBaseline::samples)
            .unwrap_or_default()
    }

    /// Replace the baseline for `location_id` with persisted samples.
    pub fn seed_baseline(&mut self, location_id: &str, samples: Vec<u32>) {
        let b = RollingBaseline::from_samples(self.params.baseline_window, samples);
        self.baselines.insert(location_id.to_string(), b);
    }
}
