// src/sources/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::{KeywordEntry, Location};

/// How the run loop treats a source's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Official hazard bulletins (weather-service alerts).
    Official,
    /// Earthquake feeds.
    Seismic,
    /// News mentions; feeds the surge detector.
    News,
    /// Independent feeds whose non-empty results corroborate a hazard.
    Corroborating,
    /// Ambient readings; recorded for source health only.
    AirQuality,
}

/// Weather-service alert (CAP fields the decision engine reads).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfficialAlert {
    pub id: Option<String>,
    pub event: Option<String>,
    pub severity: Option<String>,
    pub urgency: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub expires: Option<String>,
    pub area_desc: Option<String>,
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuakeEvent {
    pub id: Option<String>,
    pub mag: Option<f64>,
    pub place: Option<String>,
    /// Origin time, unix milliseconds.
    pub time_ms: Option<i64>,
    pub url: Option<String>,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub link: String,
    /// Registrable domain of the publisher.
    pub domain: String,
    pub published_at: Option<i64>,
    /// Extracted article text, filled by full-text enrichment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WildfireEvent {
    pub id: String,
    pub title: String,
    pub link: Option<String>,
    pub distance_km: Option<f64>,
}

/// One pollutant reading from an AirNow reporting area.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AirQualityObservation {
    pub reporting_area: String,
    pub state_code: Option<String>,
    pub parameter: String,
    pub aqi: Option<i64>,
    pub category: Option<String>,
    pub category_number: Option<u8>,
    pub date_observed: Option<String>,
    pub hour_observed: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceItem {
    OfficialAlert(OfficialAlert),
    Quake(QuakeEvent),
    News(NewsItem),
    Wildfire(WildfireEvent),
    AirQuality(AirQualityObservation),
}

/// Outcome of polling one source for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub provider: String,
    pub location_id: String,
    pub items: Vec<SourceItem>,
    pub ok: bool,
    pub error: Option<String>,
    pub latency_ms: Option<u64>,
}

impl SourceResult {
    pub fn success(
        provider: impl Into<String>,
        location_id: impl Into<String>,
        items: Vec<SourceItem>,
        latency_ms: Option<u64>,
    ) -> Self {
        Self {
            provider: provider.into(),
            location_id: location_id.into(),
            items,
            ok: true,
            error: None,
            latency_ms,
        }
    }

    pub fn failure(
        provider: impl Into<String>,
        location_id: impl Into<String>,
        error: impl Into<String>,
        latency_ms: Option<u64>,
    ) -> Self {
        Self {
            provider: provider.into(),
            location_id: location_id.into(),
            items: Vec::new(),
            ok: false,
            error: Some(error.into()),
            latency_ms,
        }
    }

    pub fn news_items(&self) -> impl Iterator<Item = &NewsItem> {
        self.items.iter().filter_map(|i| match i {
            SourceItem::News(n) => Some(n),
            _ => None,
        })
    }

    pub fn official_alerts(&self) -> impl Iterator<Item = &OfficialAlert> {
        self.items.iter().filter_map(|i| match i {
            SourceItem::OfficialAlert(a) => Some(a),
            _ => None,
        })
    }

    pub fn quakes(&self) -> impl Iterator<Item = &QuakeEvent> {
        self.items.iter().filter_map(|i| match i {
            SourceItem::Quake(q) => Some(q),
            _ => None,
        })
    }
}

/// A pollable upstream feed. Implementations return errors freely; the run
/// loop only ever sees them through `sources::poll`, which never fails.
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> SourceKind;
    async fn fetch(&self, location: &Location, keywords: &KeywordEntry) -> Result<Vec<SourceItem>>;
}
