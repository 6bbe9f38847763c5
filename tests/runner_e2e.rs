// tests/runner_e2e.rs
// Full runs against in-process sources and channels; no network.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

use prepper_alerts::classify::{ClassifiedItem, ClassifyMeta, ClassifyOutcome, ClassifyRequest, Classifier};
use prepper_alerts::config::{AppConfig, KeywordEntry, Location, RunOptions};
use prepper_alerts::notify::{AlertPayload, Dispatcher, Notifier};
use prepper_alerts::runner::{DataPaths, Runner};
use prepper_alerts::sources::{
    AirQualityObservation, NewsItem, OfficialAlert, Source, SourceItem, SourceKind, WildfireEvent,
};
use prepper_alerts::state::StateStore;

const LOCATIONS: &str = r#"
[[locations]]
id = "home"
label = "Fairfax, Virginia"
role = "home"
lat = 38.8462
lon = -77.3064
radius_km = 80.0
roads = ["Route 50"]

[defaults]
quake_min_mag_normal = 3.0
quake_min_mag_emergency = 5.0
"#;

const SETTINGS: &str = r#"
[global]
schedule_minutes = 10
source_timeout_secs = 2

[global.outputs]
use_email = false
use_pushover = false
emergency_retry_sec = 60
emergency_expire_sec = 3600

[thresholds]
nws_severity_emergency = ["Severe", "Extreme"]
news_spike_factor = 2.0
news_min_mentions = 3

[hysteria]
require_sources = 2
cooldown_minutes = 60

[news_stack]
require_hazard = false

[news_stack.surge]
require_distinct_domains = 2
"#;

const KEYWORDS: &str = r#"
[locations.home]
geo_terms = ["Fairfax"]
roads = ["Route 50"]

[locations.home.metadata]
city = "Fairfax"
county = "Fairfax County"
state = "Virginia"
state_code = "VA"
"#;

struct Workspace {
    _dir: tempfile::TempDir,
    config: AppConfig,
    paths: DataPaths,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let cfg_dir = dir.path().join("config");
    std::fs::create_dir_all(&cfg_dir).unwrap();
    std::fs::write(cfg_dir.join("locations.toml"), LOCATIONS).unwrap();
    std::fs::write(cfg_dir.join("settings.toml"), SETTINGS).unwrap();
    std::fs::write(cfg_dir.join("keywords.toml"), KEYWORDS).unwrap();
    let config = AppConfig::load_dir(&cfg_dir).unwrap();
    let paths = DataPaths::in_dir(&dir.path().join("data"));
    Workspace {
        _dir: dir,
        config,
        paths,
    }
}

// ---- in-process sources ----

struct Fixed {
    name: &'static str,
    kind: SourceKind,
    items: Vec<SourceItem>,
}

#[async_trait]
impl Source for Fixed {
    fn name(&self) -> &str {
        self.name
    }
    fn kind(&self) -> SourceKind {
        self.kind
    }
    async fn fetch(&self, _: &Location, _: &KeywordEntry) -> Result<Vec<SourceItem>> {
        Ok(self.items.clone())
    }
}

struct Failing(&'static str, SourceKind);

#[async_trait]
impl Source for Failing {
    fn name(&self) -> &str {
        self.0
    }
    fn kind(&self) -> SourceKind {
        self.1
    }
    async fn fetch(&self, _: &Location, _: &KeywordEntry) -> Result<Vec<SourceItem>> {
        Err(anyhow!("upstream returned 503"))
    }
}

fn official(event: &str, severity: &str, urgency: &str) -> SourceItem {
    SourceItem::OfficialAlert(OfficialAlert {
        id: Some(format!("urn:{event}")),
        event: Some(event.into()),
        severity: Some(severity.into()),
        urgency: Some(urgency.into()),
        headline: Some(format!("{event} for Fairfax")),
        description: Some("Move to higher ground.".into()),
        expires: None,
        area_desc: Some("Fairfax, VA".into()),
        uri: Some("https://api.weather.gov/alerts/x".into()),
    })
}

fn news(title: &str, domain: &str) -> SourceItem {
    SourceItem::News(NewsItem {
        title: title.into(),
        summary: String::new(),
        link: format!("https://{domain}/{}", title.len()),
        domain: domain.into(),
        published_at: None,
        content: None,
    })
}

// ---- in-process channel ----

#[derive(Default)]
struct Recorder {
    fail: bool,
    sent: Mutex<Vec<AlertPayload>>,
}

#[async_trait]
impl Notifier for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }
    fn is_configured(&self) -> bool {
        true
    }
    async fn send(&self, payload: &AlertPayload) -> Result<()> {
        self.sent.lock().push(payload.clone());
        if self.fail {
            Err(anyhow!("channel down"))
        } else {
            Ok(())
        }
    }
}

fn runner(ws: &Workspace, options: RunOptions, sources: Vec<Box<dyn Source>>, channel: Arc<Recorder>) -> Runner {
    Runner::new(ws.config.clone(), options, ws.paths.clone())
        .unwrap()
        .with_sources(sources)
        .with_dispatcher(Dispatcher::new(vec![channel as Arc<dyn Notifier>], false))
}

fn options(ws: &Workspace) -> RunOptions {
    RunOptions::from_settings(&ws.config.settings, false)
}

fn state_at(path: &Path) -> StateStore {
    StateStore::load(path).unwrap()
}

#[tokio::test]
async fn failing_source_is_recorded_and_run_completes() {
    let ws = workspace();
    let channel = Arc::new(Recorder::default());
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(Failing("usgs", SourceKind::Seismic)),
        Box::new(Fixed {
            name: "nws",
            kind: SourceKind::Official,
            items: vec![official("Flash Flood Warning", "Severe", "Immediate")],
        }),
    ];
    let mut r = runner(&ws, options(&ws), sources, channel.clone());

    let summary = r.run().await.unwrap();
    let home = &summary.locations["home"];
    let usgs = &home.sources["usgs"];
    assert!(!usgs.ok);
    assert!(usgs.error.as_deref().unwrap().contains("503"));
    assert!(home.sources["nws"].ok);
    assert_eq!(home.alerts.len(), 1);
    assert_eq!(home.alerts[0].channels.get("recorder"), Some(&true));

    let sent = channel.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, "[HOME] Flash Flood Warning");
    assert!(sent[0].body.ends_with("\nReason: severity=Severe"));

    assert!(ws.paths.state.exists());
    assert!(ws.paths.summary.exists());
    assert!(summary.finished_at.is_some());
}

#[tokio::test]
async fn same_alert_is_delivered_once_across_runs() {
    let ws = workspace();
    let channel = Arc::new(Recorder::default());
    let make_sources = || -> Vec<Box<dyn Source>> {
        vec![Box::new(Fixed {
            name: "nws",
            kind: SourceKind::Official,
            items: vec![official("Tornado Warning", "Extreme", "Immediate")],
        })]
    };

    let mut first = runner(&ws, options(&ws), make_sources(), channel.clone());
    first.run().await.unwrap();

    // Fresh process: state comes back from disk.
    let mut second = runner(&ws, options(&ws), make_sources(), channel.clone());
    let summary = second.run().await.unwrap();

    assert_eq!(channel.sent.lock().len(), 1);
    let home = &summary.locations["home"];
    assert!(home.alerts.is_empty());
    assert_eq!(home.skipped.len(), 1);
    assert_eq!(home.skipped[0].reason, "duplicate");
}

#[tokio::test]
async fn cooldown_suppresses_a_burst_of_similar_alerts() {
    let ws = workspace();
    let channel = Arc::new(Recorder::default());
    let sources: Vec<Box<dyn Source>> = vec![Box::new(Fixed {
        name: "nws",
        kind: SourceKind::Official,
        items: vec![
            official("Flash Flood Warning", "Severe", "Immediate"),
            official("Severe Thunderstorm Warning", "Severe", "Immediate"),
        ],
    })];
    let mut r = runner(&ws, options(&ws), sources, channel.clone());
    let summary = r.run().await.unwrap();

    let home = &summary.locations["home"];
    assert_eq!(home.alerts.len(), 1);
    assert_eq!(home.skipped.len(), 1);
    assert_eq!(home.skipped[0].reason, "cooldown");
    assert_eq!(channel.sent.lock().len(), 1);
}

#[tokio::test]
async fn undelivered_alert_is_retried_next_run() {
    let ws = workspace();
    let channel = Arc::new(Recorder {
        fail: true,
        ..Recorder::default()
    });
    let make_sources = || -> Vec<Box<dyn Source>> {
        vec![Box::new(Fixed {
            name: "nws",
            kind: SourceKind::Official,
            items: vec![official("Tornado Warning", "Extreme", "Immediate")],
        })]
    };

    let summary = runner(&ws, options(&ws), make_sources(), channel.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(summary.locations["home"].alerts[0].channels.get("recorder"), Some(&false));
    assert_eq!(state_at(&ws.paths.state).seen_len(), 0);
    assert_eq!(state_at(&ws.paths.state).cooldowns_len(), 0);

    runner(&ws, options(&ws), make_sources(), channel.clone())
        .run()
        .await
        .unwrap();
    assert_eq!(channel.sent.lock().len(), 2);
}

#[tokio::test]
async fn failed_delivery_is_attempted_once_per_run() {
    let ws = workspace();
    let channel = Arc::new(Recorder {
        fail: true,
        ..Recorder::default()
    });
    // Two copies of one warning plus a second warning in the same home:nws:2 bucket.
    let sources: Vec<Box<dyn Source>> = vec![Box::new(Fixed {
        name: "nws",
        kind: SourceKind::Official,
        items: vec![
            official("Tornado Warning", "Extreme", "Immediate"),
            official("Tornado Warning", "Extreme", "Immediate"),
            official("Flash Flood Warning", "Severe", "Immediate"),
        ],
    })];
    let summary = runner(&ws, options(&ws), sources, channel.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(channel.sent.lock().len(), 1);
    let home = &summary.locations["home"];
    assert_eq!(home.alerts.len(), 1);
    let reasons: Vec<&str> = home.skipped.iter().map(|s| s.reason.as_str()).collect();
    assert_eq!(reasons, vec!["duplicate", "cooldown"]);

    // Released on save so the next run retries.
    let state = state_at(&ws.paths.state);
    assert_eq!(state.seen_len(), 0);
    assert_eq!(state.cooldowns_len(), 0);
}

#[tokio::test]
async fn air_quality_readings_never_corroborate() {
    let ws = workspace();
    let channel = Arc::new(Recorder::default());
    let reading = SourceItem::AirQuality(AirQualityObservation {
        reporting_area: "Metropolitan Washington".into(),
        parameter: "PM2.5".into(),
        aqi: Some(160),
        ..AirQualityObservation::default()
    });
    let sources: Vec<Box<dyn Source>> = vec![
        Box::new(Fixed {
            name: "nws",
            kind: SourceKind::Official,
            items: vec![official("Flood Watch", "Moderate", "Future")],
        }),
        Box::new(Fixed {
            name: "airnow",
            kind: SourceKind::AirQuality,
            items: vec![reading.clone()],
        }),
        Box::new(Fixed {
            name: "airnow_backup",
            kind: SourceKind::AirQuality,
            items: vec![reading],
        }),
    ];
    let summary = runner(&ws, options(&ws), sources, channel.clone()).run().await.unwrap();

    let home = &summary.locations["home"];
    assert!(home.sources["airnow"].ok);
    assert!(home.alerts.is_empty());
    assert!(channel.sent.lock().is_empty());
}

#[tokio::test]
async fn corroboration_unlocks_watches() {
    let ws = workspace();
    let watch = || official("Flood Watch", "Moderate", "Future");

    // Alone, a watch is suppressed.
    let channel = Arc::new(Recorder::default());
    let quiet: Vec<Box<dyn Source>> = vec![Box::new(Fixed {
        name: "nws",
        kind: SourceKind::Official,
        items: vec![watch()],
    })];
    let summary = runner(&ws, options(&ws), quiet, channel.clone()).run().await.unwrap();
    assert!(summary.locations["home"].alerts.is_empty());

    // A news surge plus a wildfire feed hit make two corroborating sources.
    let loud: Vec<Box<dyn Source>> = vec![
        Box::new(Fixed {
            name: "news_rss",
            kind: SourceKind::News,
            items: vec![
                news("Fairfax flooding one", "wtop.com"),
                news("Fairfax flooding two", "fox5dc.com"),
                news("Fairfax flooding three", "wtop.com"),
            ],
        }),
        Box::new(Fixed {
            name: "eonet",
            kind: SourceKind::Corroborating,
            items: vec![SourceItem::Wildfire(WildfireEvent {
                id: "EONET_1".into(),
                title: "Brush fire".into(),
                link: None,
                distance_km: Some(12.0),
            })],
        }),
        Box::new(Fixed {
            name: "nws",
            kind: SourceKind::Official,
            items: vec![watch()],
        }),
    ];
    let mut r = runner(&ws, options(&ws), loud, channel.clone());
    let summary = r.run().await.unwrap();
    let home = &summary.locations["home"];
    assert_eq!(home.surges.len(), 1);
    assert!(home.surges[0].tripped);
    assert_eq!(home.alerts.len(), 1);
    assert_eq!(home.alerts[0].reason, "severity=Moderate;hysteria");
    // Run-scoped corroboration is gone once the run ends.
    assert!(!r.signals().hysteria_active("home"));
}

struct Broken;

#[async_trait]
impl Classifier for Broken {
    fn name(&self) -> &str {
        "broken"
    }
    async fn classify(&self, _req: &ClassifyRequest<'_>) -> Result<ClassifyOutcome> {
        Err(anyhow!("classifier timed out"))
    }
}

/// Marks every item relevant at a fixed severity.
struct Agreeable(u8);

#[async_trait]
impl Classifier for Agreeable {
    fn name(&self) -> &str {
        "agreeable"
    }
    async fn classify(&self, req: &ClassifyRequest<'_>) -> Result<ClassifyOutcome> {
        let items: Vec<ClassifiedItem> = req
            .batch()
            .iter()
            .map(|n| ClassifiedItem {
                item: n.clone(),
                relevant: true,
                category: "flood".into(),
                reason: "local flooding".into(),
                severity: self.0,
            })
            .collect();
        Ok(ClassifyOutcome {
            meta: ClassifyMeta {
                used: true,
                model: Some("test".into()),
                input: req.batch().len(),
                kept: items.len(),
                error: None,
            },
            items,
        })
    }
}

fn one_news_source() -> Vec<Box<dyn Source>> {
    vec![Box::new(Fixed {
        name: "news_rss",
        kind: SourceKind::News,
        items: vec![
            news("Route 50 closed by flooding", "wtop.com"),
            news("Flooding reported across Virginia", "wtop.com"),
        ],
    })]
}

#[tokio::test]
async fn classifier_failure_degrades_to_no_results() {
    let ws = workspace();
    let channel = Arc::new(Recorder::default());
    let mut r = runner(&ws, options(&ws), one_news_source(), channel).with_classifier(Box::new(Broken));
    let summary = r.run().await.unwrap();
    let llm = &summary.locations["home"].sources["llm_news"];
    assert!(!llm.ok);
    assert_eq!(llm.count, 0);
    assert!(llm.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn accepted_news_emits_only_locally_specific_items() {
    let ws = workspace();
    let channel = Arc::new(Recorder::default());
    let mut opts = options(&ws);
    opts.classifier.emit_alerts = true;
    opts.classifier.emit_min_severity = 2;
    let mut r = runner(&ws, opts, one_news_source(), channel.clone()).with_classifier(Box::new(Agreeable(3)));

    let summary = r.run().await.unwrap();
    let home = &summary.locations["home"];
    // The state-wide item is rejected; the Route 50 item is kept and emitted.
    assert_eq!(home.sources["llm_news"].count, 1);
    assert_eq!(home.alerts.len(), 1);
    assert_eq!(home.alerts[0].provider, "llm_news");
    assert_eq!(home.alerts[0].reason, "llm:flood sev=3; local flooding");
    let sent = channel.sent.lock();
    assert_eq!(sent[0].title, "[HOME] Route 50 closed by flooding");
    assert_eq!(sent[0].priority.as_u8(), 2);
}

#[tokio::test]
async fn news_baselines_carry_across_processes() {
    let ws = workspace();
    let channel = Arc::new(Recorder::default());
    runner(&ws, options(&ws), one_news_source(), channel.clone())
        .run()
        .await
        .unwrap();

    let state = state_at(&ws.paths.state);
    assert_eq!(state.get_metadata("baseline:home", None).as_deref(), Some("[2]"));

    let second = runner(&ws, options(&ws), one_news_source(), channel);
    assert_eq!(second.signals().baseline_samples("home"), vec![2]);
}
