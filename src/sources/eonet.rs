// src/sources/eonet.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{KeywordEntry, Location};
use crate::geo::haversine_km;
use crate::sources::{Source, SourceItem, SourceKind, WildfireEvent};

const EONET_EVENTS: &str = "https://eonet.gsfc.nasa.gov/api/v3/events";

#[derive(Debug, Deserialize)]
struct Events {
    #[serde(default)]
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    id: String,
    #[serde(default)]
    title: String,
    link: Option<String>,
    #[serde(default)]
    geometry: Vec<Geometry>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    #[serde(rename = "type")]
    kind: Option<String>,
    /// Points are `[lon, lat]`; polygons nest further and are skipped.
    #[serde(default)]
    coordinates: serde_json::Value,
}

impl Geometry {
    fn point(&self) -> Option<(f64, f64)> {
        if self.kind.as_deref() != Some("Point") {
            return None;
        }
        let arr = self.coordinates.as_array()?;
        let lon = arr.first()?.as_f64()?;
        let lat = arr.get(1)?.as_f64()?;
        Some((lat, lon))
    }
}

/// Open wildfire events from NASA EONET. Used only as corroboration.
pub struct EonetSource {
    client: reqwest::Client,
    endpoint: String,
}

impl EonetSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: EONET_EVENTS.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Keep events whose latest point geometry falls inside the location's radius.
pub fn parse_wildfires(body: &str, location: &Location) -> Result<Vec<SourceItem>> {
    let ev: Events = serde_json::from_str(body).context("parsing eonet events")?;
    let mut out = Vec::new();
    for e in ev.events {
        let Some(p) = e.geometry.iter().rev().find_map(Geometry::point) else {
            continue;
        };
        let d = haversine_km(location.point(), p);
        if d > location.radius_km {
            continue;
        }
        out.push(SourceItem::Wildfire(WildfireEvent {
            id: e.id,
            title: e.title,
            link: e.link,
            distance_km: Some(d),
        }));
    }
    Ok(out)
}

#[async_trait]
impl Source for EonetSource {
    fn name(&self) -> &str {
        "eonet"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Corroborating
    }

    async fn fetch(&self, location: &Location, _keywords: &KeywordEntry) -> Result<Vec<SourceItem>> {
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[("status", "open"), ("category", "wildfires")])
            .send()
            .await
            .context("eonet http get()")?
            .error_for_status()
            .context("eonet http status")?
            .text()
            .await
            .context("eonet http .text()")?;
        parse_wildfires(&body, location)
    }
}
