// src/sources/mod.rs
pub mod airnow;
pub mod eonet;
pub mod news_rss;
pub mod nws;
pub mod types;
pub mod usgs;

use anyhow::{Context, Result};
use std::time::{Duration, Instant};

use crate::config::{AppConfig, KeywordEntry, Location};
pub use crate::sources::types::{
    AirQualityObservation, NewsItem, OfficialAlert, QuakeEvent, Source, SourceItem, SourceKind,
    SourceResult, WildfireEvent,
};

const DEFAULT_USER_AGENT: &str = "prepper-alerts/0.1 (contact@example.com)";

/// Shared HTTP client for upstream feeds. `NWS_USER_AGENT` overrides the UA,
/// which api.weather.gov requires to carry a contact.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    let ua = std::env::var("NWS_USER_AGENT").unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string());
    reqwest::Client::builder()
        .user_agent(ua)
        .connect_timeout(Duration::from_secs(5).min(timeout))
        .timeout(timeout)
        .build()
        .context("building http client")
}

/// The production source set, in polling order.
pub fn default_sources(cfg: &AppConfig) -> Result<Vec<Box<dyn Source>>> {
    let timeout = Duration::from_secs(cfg.settings.global.source_timeout_secs);
    let client = http_client(timeout)?;
    let ns = &cfg.settings.news_stack;
    Ok(vec![
        Box::new(nws::NwsSource::new(client.clone())),
        Box::new(usgs::UsgsSource::new(client.clone())),
        Box::new(news_rss::NewsRssSource::new(
            client.clone(),
            ns.rss_sources.clone(),
            cfg.settings.global.safety.allowlist_domains.clone(),
            ns.google_news_queries_per_location.clone(),
            ns.hazard_keywords.clone(),
            ns.require_hazard,
        )),
        Box::new(eonet::EonetSource::new(client.clone())),
        Box::new(airnow::AirNowSource::from_env(client)),
    ])
}

/// Poll one source for one location. Errors and timeouts come back as a
/// failed `SourceResult`; nothing escapes.
pub async fn poll(
    source: &dyn Source,
    location: &Location,
    keywords: &KeywordEntry,
    timeout: Duration,
) -> SourceResult {
    let t0 = Instant::now();
    let outcome = tokio::time::timeout(timeout, source.fetch(location, keywords)).await;
    let latency_ms = Some(t0.elapsed().as_millis() as u64);

    match outcome {
        Ok(Ok(items)) => {
            tracing::debug!(
                target: "sources",
                provider = source.name(),
                location = %location.id,
                count = items.len(),
                "fetched"
            );
            SourceResult::success(source.name(), &location.id, items, latency_ms)
        }
        Ok(Err(e)) => {
            tracing::warn!(
                target: "sources",
                provider = source.name(),
                location = %location.id,
                error = %format!("{e:#}"),
                "source fetch failed"
            );
            SourceResult::failure(source.name(), &location.id, format!("{e:#}"), latency_ms)
        }
        Err(_) => {
            tracing::warn!(
                target: "sources",
                provider = source.name(),
                location = %location.id,
                "source fetch timed out"
            );
            SourceResult::failure(
                source.name(),
                &location.id,
                format!("timed out after {}s", timeout.as_secs()),
                latency_ms,
            )
        }
    }
}

/// Decode entities, strip tags, normalize quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());

    // Tags first: decoding first would turn `&lt;b&gt;` text into markup.
    let out = re_tags.replace_all(s, " ");
    let out = html_escape::decode_html_entities(&out)
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");
    re_ws.replace_all(&out, " ").trim().to_string()
}
