// src/classify/fulltext.rs
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashSet;

use crate::decision::truncate_chars;
use crate::sources::{clean_text, NewsItem};

/// Paragraph text shorter than this falls back to the whole page.
const MIN_PARAGRAPH_CHARS: usize = 200;

const NOISE_TAGS: &[&str] = &["script", "style", "noscript", "header", "footer", "aside", "form", "nav"];

fn noise_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        let alts: Vec<String> = NOISE_TAGS
            .iter()
            .map(|t| format!(r"<{t}\b.*?</{t}\s*>"))
            .collect();
        Regex::new(&format!("(?is){}", alts.join("|"))).unwrap()
    })
}

fn paragraph_regex() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<p\b[^>]*>(.*?)</p\s*>").unwrap())
}

/// Best-effort main text: paragraphs when there are enough of them,
/// otherwise the whole page minus scripts and chrome.
pub fn extract_article_text(html: &str) -> String {
    let stripped = noise_regex().replace_all(html, " ");
    let paragraphs: Vec<String> = paragraph_regex()
        .captures_iter(&stripped)
        .map(|c| clean_text(&c[1]))
        .filter(|p| !p.is_empty())
        .collect();
    let joined = paragraphs.join(" ");
    if joined.chars().count() >= MIN_PARAGRAPH_CHARS {
        joined
    } else {
        clean_text(&stripped)
    }
}

/// Fetches article bodies for a bounded number of news items.
pub struct ArticleFetcher {
    client: reqwest::Client,
    allow_domains: HashSet<String>,
}

impl ArticleFetcher {
    pub fn new(client: reqwest::Client, allow_domains: &[String]) -> Self {
        Self {
            client,
            allow_domains: allow_domains.iter().map(|d| d.trim().to_lowercase()).collect(),
        }
    }

    fn allowed(&self, domain: &str) -> bool {
        self.allow_domains.is_empty()
            || domain.is_empty()
            || self.allow_domains.contains(&domain.to_lowercase())
    }

    async fn fetch_text(&self, url: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("article http get()")?
            .error_for_status()
            .context("article http status")?
            .text()
            .await
            .context("article http .text()")?;
        Ok(extract_article_text(&body))
    }

    /// The first `max_items` items (at least one), with `content` filled where
    /// a fetch succeeded. Items outside the allowlist are passed through.
    pub async fn enrich(&self, items: &[NewsItem], max_items: usize, max_chars: usize) -> Vec<NewsItem> {
        let mut out = Vec::new();
        for item in items.iter().take(max_items.max(1)) {
            let mut item = item.clone();
            if item.link.is_empty() || !self.allowed(&item.domain) {
                out.push(item);
                continue;
            }
            match self.fetch_text(&item.link).await {
                Ok(text) if !text.is_empty() => {
                    item.content = Some(truncate_chars(&text, max_chars));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(target: "classify", link = %item.link, error = %format!("{e:#}"), "article fetch failed");
                }
            }
            out.push(item);
        }
        out
    }
}
