//! # Runner
//! One pass over every configured location:
//!
//! 1. poll each source (failures become health records, never errors)
//! 2. feed news counts to the surge detector, buffer official and seismic items
//! 3. optionally enrich + classify news and register corroboration
//! 4. compute hysteria, turn buffered items into decisions
//! 5. gate each decision (seen, then cooldown), dispatch, record
//!
//! State and the run summary are written once, after the last location.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::classify::{
    ArticleFetcher, ClassifiedItem, ClassifyMeta, ClassifyRequest, Classifier, OpenAiClassifier,
};
use crate::config::{AppConfig, KeywordEntry, Location, RunOptions};
use crate::decision::AlertDecision;
use crate::engine::{self, QuakeThresholds, CLASSIFIED_PROVIDER};
use crate::metrics;
use crate::notify::{AlertPayload, Dispatcher};
use crate::signals::SignalsEngine;
use crate::sources::{self, NewsItem, OfficialAlert, QuakeEvent, Source, SourceItem, SourceKind, SourceResult};
use crate::state::{AlertKey, StateStore};
use crate::summary::RunSummary;

pub const STATE_FILE: &str = "state.json";
pub const SUMMARY_FILE: &str = "latest_run.json";
pub const METRICS_FILE: &str = "metrics.prom";

const BASELINE_KEY_PREFIX: &str = "baseline:";

/// Where a run reads and writes its files.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
    pub state: PathBuf,
    pub summary: PathBuf,
    pub metrics: PathBuf,
}

impl DataPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            state: dir.join(STATE_FILE),
            summary: dir.join(SUMMARY_FILE),
            metrics: dir.join(METRICS_FILE),
        }
    }
}

fn baseline_key(location_id: &str) -> String {
    format!("{BASELINE_KEY_PREFIX}{location_id}")
}

/// What a location's sources produced, before decisions are made.
#[derive(Default)]
struct Collected {
    official: Vec<OfficialAlert>,
    quakes: Vec<QuakeEvent>,
    news: Vec<NewsItem>,
}

pub struct Runner {
    config: AppConfig,
    options: RunOptions,
    paths: DataPaths,
    sources: Vec<Box<dyn Source>>,
    dispatcher: Dispatcher,
    classifier: Option<Box<dyn Classifier>>,
    enricher: Option<ArticleFetcher>,
    signals: SignalsEngine,
    state: StateStore,
    /// Gated this run but delivered nowhere; released again before save.
    undelivered: Vec<(AlertKey, String)>,
}

impl Runner {
    /// Load state (pruned, baselines re-seeded) and wire the production
    /// sources, channels and classifier.
    pub fn new(config: AppConfig, options: RunOptions, paths: DataPaths) -> Result<Self> {
        let mut state = StateStore::load(&paths.state)?;
        let retention = config.settings.state.seen_retention_days;
        if retention > 0 {
            let pruned = state.prune_seen(ChronoDuration::days(i64::from(retention)), Utc::now());
            if pruned > 0 {
                tracing::info!(target: "runner", pruned, retention_days = retention, "pruned old seen entries");
            }
        }

        let mut signals = SignalsEngine::new(config.signal_params());
        if config.settings.signals.persist_baselines {
            for loc in &config.locations.locations {
                let Some(raw) = state.get_metadata(&baseline_key(&loc.id), None) else {
                    continue;
                };
                match serde_json::from_str::<Vec<u32>>(&raw) {
                    Ok(samples) => signals.seed_baseline(&loc.id, samples),
                    Err(e) => tracing::warn!(
                        target: "runner",
                        location = %loc.id,
                        error = %e,
                        "ignoring unreadable persisted baseline"
                    ),
                }
            }
        }

        let sources = sources::default_sources(&config)?;
        let dispatcher = Dispatcher::from_config(&config.settings.global.outputs, options.dry_run)?;
        let (classifier, enricher) = build_classifier(&config, &options)?;

        Ok(Self {
            config,
            options,
            paths,
            sources,
            dispatcher,
            classifier,
            enricher,
            signals,
            state,
            undelivered: Vec::new(),
        })
    }

    pub fn with_sources(mut self, sources: Vec<Box<dyn Source>>) -> Self {
        self.sources = sources;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_enricher(mut self, enricher: Option<ArticleFetcher>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn signals(&self) -> &SignalsEngine {
        &self.signals
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Run every location once. Only persistence failures are errors.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let t0 = Instant::now();
        let mut summary = RunSummary::new(Utc::now(), self.options.dry_run);
        metrics::record_run_start(&summary.run_id);
        tracing::info!(
            target: "runner",
            run_id = %summary.run_id,
            dry_run = self.options.dry_run,
            locations = self.config.locations.locations.len(),
            "starting run"
        );

        let locations = self.config.locations.locations.clone();
        for location in &locations {
            self.process_location(location, &mut summary).await;
        }

        let persisted = self.persist(&mut summary);
        self.signals.reset_run_state();
        persisted?;

        let secs = t0.elapsed().as_secs_f64();
        metrics::record_run_end(secs);
        tracing::info!(
            target: "runner",
            run_id = %summary.run_id,
            duration_secs = secs,
            "run finished"
        );
        Ok(summary)
    }

    async fn process_location(&mut self, location: &Location, summary: &mut RunSummary) {
        tracing::info!(target: "runner", location = %location.id, "processing location");
        let keywords = self.config.keywords_for(location);
        let collected = self.poll_sources(location, &keywords, summary).await;

        let mut decisions: Vec<AlertDecision> = Vec::new();
        if !collected.news.is_empty() {
            decisions.extend(
                self.classify_news(location, &keywords, &collected.news, summary)
                    .await,
            );
        }

        let hysteria = self.signals.hysteria_active(&location.id);
        if hysteria {
            tracing::info!(
                target: "runner",
                location = %location.id,
                sources = ?self.signals.corroborating_sources(&location.id),
                "hysteria active"
            );
        }

        let emergency = &self.config.settings.thresholds.nws_severity_emergency;
        decisions.extend(collected.official.iter().filter_map(|a| {
            engine::decide_official_alert(location, &keywords, a, hysteria, emergency)
        }));
        let thresholds = QuakeThresholds::from(self.config.quake_thresholds(&location.id));
        decisions.extend(
            collected
                .quakes
                .iter()
                .filter_map(|q| engine::decide_quake(&location.id, q, thresholds)),
        );

        for decision in decisions {
            self.gate_and_dispatch(decision, summary).await;
        }
    }

    async fn poll_sources(
        &mut self,
        location: &Location,
        keywords: &KeywordEntry,
        summary: &mut RunSummary,
    ) -> Collected {
        let timeout = Duration::from_secs(self.config.settings.global.source_timeout_secs);
        let mut out = Collected::default();

        for source in &self.sources {
            let result = sources::poll(source.as_ref(), location, keywords, timeout).await;
            summary.record_source(&result);
            metrics::record_fetch(&result);

            match source.kind() {
                SourceKind::News if result.ok => {
                    let domains: BTreeSet<&str> = result
                        .news_items()
                        .map(|n| n.domain.as_str())
                        .filter(|d| !d.is_empty())
                        .collect();
                    let surge = self.signals.record_news(
                        &location.id,
                        u32::try_from(result.items.len()).unwrap_or(u32::MAX),
                        u32::try_from(domains.len()).unwrap_or(u32::MAX),
                    );
                    tracing::info!(
                        target: "runner",
                        location = %location.id,
                        count = surge.count,
                        baseline = surge.baseline,
                        distinct_domains = surge.distinct_domains,
                        tripped = surge.tripped,
                        "news surge check"
                    );
                    metrics::record_surge(&surge);
                    summary.record_surge(&surge);
                    out.news.extend(result.news_items().cloned());
                }
                SourceKind::Official => out.official.extend(result.official_alerts().cloned()),
                SourceKind::Seismic => out.quakes.extend(result.quakes().cloned()),
                SourceKind::Corroborating if !result.items.is_empty() => {
                    self.signals.record_confirmation(&location.id, &result.provider);
                }
                _ => {}
            }
        }
        out
    }

    /// Classifier path. Returns decisions to emit (empty unless emission is on).
    async fn classify_news(
        &mut self,
        location: &Location,
        keywords: &KeywordEntry,
        news: &[NewsItem],
        summary: &mut RunSummary,
    ) -> Vec<AlertDecision> {
        let Some(classifier) = &self.classifier else {
            return Vec::new();
        };
        let opts = &self.options.classifier;
        let t0 = Instant::now();

        let batch: Vec<NewsItem> = match (&self.enricher, opts.enrich_fulltext) {
            (Some(fetcher), true) => fetcher.enrich(news, opts.max_items, opts.max_chars).await,
            _ => news.iter().take(opts.max_items.max(1)).cloned().collect(),
        };
        let req = ClassifyRequest {
            location_id: &location.id,
            geo_terms: &keywords.geo_terms,
            locality: &keywords.metadata,
            items: &batch,
            max_items: opts.max_items,
            max_chars: opts.max_chars,
        };
        let (items, meta): (Vec<ClassifiedItem>, ClassifyMeta) = match classifier.classify(&req).await {
            Ok(out) => (out.items, out.meta),
            Err(e) => {
                tracing::warn!(
                    target: "runner",
                    location = %location.id,
                    classifier = classifier.name(),
                    error = %format!("{e:#}"),
                    "classifier failed, continuing without it"
                );
                (
                    Vec::new(),
                    ClassifyMeta {
                        used: true,
                        error: Some(format!("{e:#}")),
                        ..ClassifyMeta::default()
                    },
                )
            }
        };

        let accepted = engine::accept_classified(items, keywords, opts.min_severity);
        let latency_ms = Some(t0.elapsed().as_millis() as u64);
        let health = SourceResult {
            provider: CLASSIFIED_PROVIDER.to_string(),
            location_id: location.id.clone(),
            items: accepted.iter().map(|c| SourceItem::News(c.item.clone())).collect(),
            ok: meta.error.is_none(),
            error: if accepted.is_empty() {
                Some(meta.error.clone().unwrap_or_else(|| "no_relevant_items".to_string()))
            } else {
                meta.error.clone()
            },
            latency_ms,
        };
        summary.record_source(&health);
        metrics::record_fetch(&health);

        if accepted.is_empty() {
            return Vec::new();
        }
        self.signals.record_confirmation(&location.id, CLASSIFIED_PROVIDER);
        if !opts.emit_alerts {
            return Vec::new();
        }
        accepted
            .iter()
            .filter_map(|c| engine::decide_classified(&location.id, c, opts.emit_min_severity))
            .collect()
    }

    /// seen → cooldown → dispatch → record → mark seen + cooldown.
    /// The gate closes even when every channel fails, so nothing is
    /// re-attempted within the run.
    async fn gate_and_dispatch(&mut self, decision: AlertDecision, summary: &mut RunSummary) {
        let key = decision.key();
        let bucket = decision.cooldown_bucket();

        if self.state.is_seen(&key) {
            tracing::info!(target: "runner", title = %decision.title, "skipping duplicate alert");
            summary.record_skip(&decision, "duplicate");
            metrics::record_skip("duplicate");
            return;
        }
        if self.state.in_cooldown(&bucket) {
            tracing::info!(target: "runner", bucket = %bucket, title = %decision.title, "cooldown active");
            summary.record_skip(&decision, "cooldown");
            metrics::record_skip("cooldown");
            return;
        }

        let payload = AlertPayload::from(&decision);
        let channels: BTreeMap<String, bool> = self.dispatcher.dispatch(&payload).await;
        summary.record_alert(&decision, &channels);
        metrics::record_alert(&decision, &channels);

        self.state.mark_seen(&key);
        self.state
            .start_cooldown(&bucket, self.config.settings.hysteria.cooldown_minutes);

        if channels.is_empty() || channels.values().any(|d| *d) {
            tracing::info!(
                target: "runner",
                alert_id = %key.fingerprint(),
                title = %decision.title,
                priority = decision.priority.as_u8(),
                "alert dispatched"
            );
        } else {
            tracing::warn!(
                target: "runner",
                title = %decision.title,
                "no channel delivered, will retry next run"
            );
            self.undelivered.push((key, bucket));
        }
    }

    fn persist(&mut self, summary: &mut RunSummary) -> Result<()> {
        if self.config.settings.signals.persist_baselines {
            for loc in &self.config.locations.locations {
                let samples = self.signals.baseline_samples(&loc.id);
                if samples.is_empty() {
                    continue;
                }
                let json = serde_json::to_string(&samples).context("serializing baseline")?;
                self.state.set_metadata(baseline_key(&loc.id), json);
            }
        }
        for (key, bucket) in self.undelivered.drain(..) {
            self.state.forget_seen(&key);
            self.state.clear_cooldown(&bucket);
        }
        self.state.set_metadata("last_run_id", summary.run_id.clone());
        self.state.save(&self.paths.state)?;

        summary.finish(Utc::now());
        summary.write(&self.paths.summary)
    }
}

fn build_classifier(
    config: &AppConfig,
    options: &RunOptions,
) -> Result<(Option<Box<dyn Classifier>>, Option<ArticleFetcher>)> {
    if !options.classifier.enabled {
        return Ok((None, None));
    }
    let cc = &config.settings.classifier;
    let Some(api_key) = cc.resolve_api_key() else {
        tracing::warn!(target: "runner", provider = %cc.provider, "classifier enabled but no api key; running without it");
        return Ok((None, None));
    };
    let timeout = Duration::from_secs(cc.timeout_secs);
    let classifier = OpenAiClassifier::new(api_key, cc.model.clone(), timeout)?;
    let enricher = if options.classifier.enrich_fulltext {
        let client = sources::http_client(Duration::from_secs(8).min(timeout))?;
        Some(ArticleFetcher::new(
            client,
            &config.settings.global.safety.allowlist_domains,
        ))
    } else {
        None
    };
    Ok((Some(Box::new(classifier)), enricher))
}
