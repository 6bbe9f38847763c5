// src/sources/usgs.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use serde::Deserialize;

use crate::config::{KeywordEntry, Location};
use crate::geo::haversine_km;
use crate::sources::{QuakeEvent, Source, SourceItem, SourceKind};

const USGS_QUERY: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";
const LOOKBACK_MINUTES: i64 = 60;

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: Option<String>,
    #[serde(default)]
    properties: Properties,
    geometry: Option<Geometry>,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    mag: Option<f64>,
    place: Option<String>,
    time: Option<i64>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    /// `[lon, lat, depth]`
    #[serde(default)]
    coordinates: Vec<f64>,
}

/// Recent earthquakes around a location, from the USGS event service.
pub struct UsgsSource {
    client: reqwest::Client,
    endpoint: String,
}

impl UsgsSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: USGS_QUERY.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Parse a GeoJSON body, keeping events inside the location's radius.
/// Events without coordinates are dropped.
pub fn parse_quakes(body: &str, location: &Location) -> Result<Vec<SourceItem>> {
    let fc: FeatureCollection = serde_json::from_str(body).context("parsing usgs geojson")?;
    let mut out = Vec::new();
    for f in fc.features {
        let Some(coords) = f.geometry.map(|g| g.coordinates) else {
            continue;
        };
        if coords.len() < 2 {
            continue;
        }
        let distance_km = haversine_km(location.point(), (coords[1], coords[0]));
        if distance_km > location.radius_km {
            continue;
        }
        out.push(SourceItem::Quake(QuakeEvent {
            id: f.id,
            mag: f.properties.mag,
            place: f.properties.place,
            time_ms: f.properties.time,
            url: f.properties.url,
            distance_km,
        }));
    }
    Ok(out)
}

#[async_trait]
impl Source for UsgsSource {
    fn name(&self) -> &str {
        "usgs"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Seismic
    }

    async fn fetch(&self, location: &Location, _keywords: &KeywordEntry) -> Result<Vec<SourceItem>> {
        let end = Utc::now();
        let start = end - Duration::minutes(LOOKBACK_MINUTES);
        let body = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "geojson".to_string()),
                ("latitude", location.lat.to_string()),
                ("longitude", location.lon.to_string()),
                ("maxradiuskm", location.radius_km.to_string()),
                ("starttime", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("endtime", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
                ("orderby", "time".to_string()),
            ])
            .send()
            .await
            .context("usgs http get()")?
            .error_for_status()
            .context("usgs http status")?
            .text()
            .await
            .context("usgs http .text()")?;
        parse_quakes(&body, location)
    }
}
