// src/sources/news_rss.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashSet;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::config::{KeywordEntry, Location};
use crate::geo::{fold, registered_domain};
use crate::sources::{clean_text, NewsItem, Source, SourceItem, SourceKind};

const GOOGLE_NEWS_SEARCH: &str = "https://news.google.com/rss/search";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// One raw feed entry before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub published_at: Option<i64>,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<i64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
}

/// quick-xml only knows the five XML entities; feeds routinely carry HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

/// Parse an RSS 2.0 document into entries, cleaning titles and summaries.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let rss: Rss = from_str(&scrub_html_entities_for_xml(xml)).context("parsing rss xml")?;
    Ok(rss
        .channel
        .item
        .into_iter()
        .map(|it| FeedEntry {
            title: clean_text(it.title.as_deref().unwrap_or_default()),
            summary: clean_text(it.description.as_deref().unwrap_or_default()),
            link: it.link.unwrap_or_default().trim().to_string(),
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822_to_unix),
        })
        .collect())
}

/// Fill `<CITY STATE>` and `<COUNTY STATE>` markers from the locality,
/// falling back to the location label.
pub fn format_query(template: &str, location: &Location, keywords: &KeywordEntry) -> String {
    let m = &keywords.metadata;
    let city = non_empty(&m.city).unwrap_or_else(|| location.city().trim().to_string());
    let county = non_empty(&m.county).unwrap_or_else(|| city.clone());
    let state = non_empty(&m.state).unwrap_or_else(|| location.state().trim().to_string());
    let state_code = non_empty(&m.state_code).unwrap_or_else(|| state.chars().take(2).collect());
    template
        .replace("<CITY STATE>", format!("{city} {state_code}").trim())
        .replace("<COUNTY STATE>", format!("{county} {state_code}").trim())
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

pub fn google_news_url(query: &str) -> Result<String> {
    let url = reqwest::Url::parse_with_params(
        GOOGLE_NEWS_SEARCH,
        &[("hl", "en-US"), ("gl", "US"), ("ceid", "US:en"), ("q", query)],
    )
    .context("building google news url")?;
    Ok(url.into())
}

/// Publisher link and domain. Google News redirect links carry the real
/// article in a `url=` query parameter.
pub fn resolve_publisher(link: &str) -> (String, String) {
    let raw_domain = registered_domain(link).unwrap_or_default();
    if raw_domain == "google.com" {
        if let Ok(u) = reqwest::Url::parse(link) {
            if let Some((_, target)) = u.query_pairs().find(|(k, _)| k == "url") {
                let target = target.into_owned();
                if let Some(d) = registered_domain(&target) {
                    return (target, d);
                }
            }
        }
    }
    (link.to_string(), raw_domain)
}

/// Curated RSS feeds plus per-location Google News searches, filtered down to
/// local, hazard-related items from allowed publishers.
pub struct NewsRssSource {
    client: reqwest::Client,
    feeds: Vec<String>,
    allow_domains: HashSet<String>,
    query_templates: Vec<String>,
    hazard_keywords: Vec<String>,
    require_hazard: bool,
}

impl NewsRssSource {
    pub fn new(
        client: reqwest::Client,
        feeds: Vec<String>,
        allow_domains: Vec<String>,
        query_templates: Vec<String>,
        hazard_keywords: Vec<String>,
        require_hazard: bool,
    ) -> Self {
        let hazard_keywords: Vec<String> = hazard_keywords
            .iter()
            .map(|h| fold(h))
            .filter(|h| !h.is_empty())
            .collect();
        Self {
            client,
            feeds,
            allow_domains: allow_domains.iter().map(|d| d.trim().to_lowercase()).collect(),
            query_templates,
            // An empty hazard list cannot require anything.
            require_hazard: require_hazard && !hazard_keywords.is_empty(),
            hazard_keywords,
        }
    }

    /// Apply dedupe, allowlist, locality and hazard filters to raw entries.
    pub fn filter_entries(
        &self,
        entries: Vec<FeedEntry>,
        keywords: &KeywordEntry,
        seen: &mut HashSet<String>,
    ) -> Vec<NewsItem> {
        let geo_terms: Vec<String> = keywords
            .geo_terms
            .iter()
            .map(|t| fold(t))
            .filter(|t| !t.is_empty())
            .collect();
        let mut out = Vec::new();
        for e in entries {
            let dedupe_key = if e.link.is_empty() {
                e.title.clone()
            } else {
                e.link.clone()
            };
            if dedupe_key.is_empty() || seen.contains(&dedupe_key) {
                continue;
            }
            let (link, domain) = resolve_publisher(&e.link);
            if !self.allow_domains.is_empty() && !self.allow_domains.contains(&domain) {
                continue;
            }
            let haystack = fold(&format!("{} {}", e.title, e.summary));
            if !geo_terms.is_empty() && !geo_terms.iter().any(|t| haystack.contains(t.as_str())) {
                continue;
            }
            if self.require_hazard
                && !self
                    .hazard_keywords
                    .iter()
                    .any(|h| haystack.contains(h.as_str()))
            {
                continue;
            }
            seen.insert(dedupe_key);
            out.push(NewsItem {
                title: e.title,
                summary: e.summary,
                link,
                domain,
                published_at: e.published_at,
                content: None,
            });
        }
        out
    }

    async fn pull(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("rss http get()")?
            .error_for_status()
            .context("rss http status")?
            .text()
            .await
            .context("rss http .text()")?;
        parse_feed(&body)
    }
}

#[async_trait]
impl Source for NewsRssSource {
    fn name(&self) -> &str {
        "news_rss"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::News
    }

    async fn fetch(&self, location: &Location, keywords: &KeywordEntry) -> Result<Vec<SourceItem>> {
        let mut urls = self.feeds.clone();
        for template in &self.query_templates {
            urls.push(google_news_url(&format_query(template, location, keywords))?);
        }

        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut failures = 0usize;
        let mut last_err = None;
        for url in &urls {
            match self.pull(url).await {
                Ok(entries) => items.extend(self.filter_entries(entries, keywords, &mut seen)),
                Err(e) => {
                    tracing::warn!(
                        target: "sources",
                        provider = "news_rss",
                        feed = %url,
                        error = %format!("{e:#}"),
                        "feed failed"
                    );
                    failures += 1;
                    last_err = Some(e);
                }
            }
        }
        // One bad feed is noise; all of them failing is a source failure.
        if !urls.is_empty() && failures == urls.len() {
            return Err(last_err.unwrap_or_else(|| anyhow!("all feeds failed")))
                .context("every news feed failed");
        }
        Ok(items.into_iter().map(SourceItem::News).collect())
    }
}
