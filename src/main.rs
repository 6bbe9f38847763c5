//! prepper-alerts: binary entrypoint.
//! One invocation = one run; schedule it externally (cron, systemd timer).

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use prepper_alerts::config::{AppConfig, RunOptions};
use prepper_alerts::decision::Priority;
use prepper_alerts::notify::{AlertPayload, Dispatcher};
use prepper_alerts::runner::{DataPaths, Runner};
use prepper_alerts::sources::{self, news_rss::NewsRssSource, SourceItem};

#[derive(Debug, Parser)]
#[command(name = "prepper-alerts", version, about = "Local hazard alerting from public feeds")]
struct Cli {
    /// Directory holding locations.toml, settings.toml and keywords.toml.
    #[arg(long, global = true, env = "PREPPER_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Directory for state.json, latest_run.json and metrics.prom.
    #[arg(long, global = true, env = "PREPPER_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll every source for every location and dispatch alerts.
    Run {
        /// Log what would be sent instead of sending.
        #[arg(long)]
        dry_run: bool,
    },
    /// Load and validate the configuration, then exit.
    Validate,
    /// Send one test notification through every enabled channel.
    SendTest,
    /// Print the news items one location would see right now.
    DebugNews {
        #[arg(long)]
        location: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("prepper_alerts=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // No-op when there is no .env file.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load_dir(&cli.config_dir)
        .with_context(|| format!("loading configuration from {}", cli.config_dir.display()))?;

    match cli.command {
        Command::Validate => {
            println!(
                "configuration OK: {} location(s)",
                config.locations.locations.len()
            );
            Ok(())
        }
        Command::Run { dry_run } => run(config, &cli.data_dir, dry_run).await,
        Command::SendTest => send_test(&config).await,
        Command::DebugNews { location, limit } => debug_news(&config, &location, limit).await,
    }
}

async fn run(config: AppConfig, data_dir: &std::path::Path, dry_run: bool) -> Result<()> {
    let handle = match prepper_alerts::metrics::install_prometheus() {
        Ok(h) => Some(h),
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "metrics disabled");
            None
        }
    };

    let options = RunOptions::from_settings(&config.settings, dry_run);
    let paths = DataPaths::in_dir(data_dir);
    let mut runner = Runner::new(config, options, paths.clone())?;
    let summary = runner.run().await?;

    if let Some(handle) = &handle {
        if let Err(e) = prepper_alerts::metrics::write_snapshot(handle, &paths.metrics) {
            tracing::warn!(error = %format!("{e:#}"), "could not write metrics snapshot");
        }
    }

    let alerts: usize = summary.locations.values().map(|l| l.alerts.len()).sum();
    let failed: usize = summary
        .locations
        .values()
        .flat_map(|l| l.sources.values())
        .filter(|s| !s.ok)
        .count();
    println!(
        "run {}: {} alert(s), {} failed source poll(s), summary at {}",
        summary.run_id,
        alerts,
        failed,
        paths.summary.display()
    );
    Ok(())
}

async fn send_test(config: &AppConfig) -> Result<()> {
    let dispatcher = Dispatcher::from_config(&config.settings.global.outputs, config.settings.testing.dry_run)?;
    if dispatcher.channel_names().is_empty() {
        return Err(anyhow!("no output channel is enabled in [global.outputs]"));
    }
    let payload = AlertPayload {
        title: "[TEST] prepper-alerts".to_string(),
        body: "Test notification. No action needed.".to_string(),
        priority: Priority::Normal,
        url: None,
        location_id: "test".to_string(),
    };
    let report = dispatcher.dispatch(&payload).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.values().any(|d| *d) {
        Ok(())
    } else {
        Err(anyhow!("no channel delivered the test notification"))
    }
}

async fn debug_news(config: &AppConfig, location_id: &str, limit: usize) -> Result<()> {
    let location = config
        .locations
        .get(location_id)
        .ok_or_else(|| anyhow!("unknown location `{location_id}`"))?;
    let keywords = config.keywords_for(location);
    let timeout = Duration::from_secs(config.settings.global.source_timeout_secs);
    let ns = &config.settings.news_stack;
    let source = NewsRssSource::new(
        sources::http_client(timeout)?,
        ns.rss_sources.clone(),
        config.settings.global.safety.allowlist_domains.clone(),
        ns.google_news_queries_per_location.clone(),
        ns.hazard_keywords.clone(),
        ns.require_hazard,
    );
    let result = sources::poll(&source, location, &keywords, timeout).await;
    if let Some(err) = &result.error {
        eprintln!("news_rss failed: {err}");
    }
    for item in result.items.iter().take(limit) {
        if let SourceItem::News(n) = item {
            println!("{:<20} {}\n{:<20} {}", n.domain, n.title, "", n.link);
        }
    }
    println!("{} item(s) total", result.items.len());
    Ok(())
}
