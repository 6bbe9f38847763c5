// src/sources/nws.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{KeywordEntry, Location};
use crate::sources::{OfficialAlert, Source, SourceItem, SourceKind};

const NWS_BASE: &str = "https://api.weather.gov";

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
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Properties {
    id: Option<String>,
    #[serde(rename = "@id")]
    at_id: Option<String>,
    event: Option<String>,
    severity: Option<String>,
    urgency: Option<String>,
    headline: Option<String>,
    description: Option<String>,
    expires: Option<String>,
    area_desc: Option<String>,
}

/// Active alerts from the National Weather Service for a point.
pub struct NwsSource {
    client: reqwest::Client,
    base_url: String,
}

impl NwsSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: NWS_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Parse an `alerts/active` GeoJSON body.
pub fn parse_alerts(body: &str) -> Result<Vec<SourceItem>> {
    let fc: FeatureCollection = serde_json::from_str(body).context("parsing nws geojson")?;
    Ok(fc
        .features
        .into_iter()
        .map(|f| {
            let p = f.properties;
            let uri = p.at_id.clone().or_else(|| f.id.clone());
            SourceItem::OfficialAlert(OfficialAlert {
                id: p.id.or(f.id),
                event: p.event,
                severity: p.severity,
                urgency: p.urgency,
                headline: p.headline,
                description: p.description,
                expires: p.expires,
                area_desc: p.area_desc,
                uri,
            })
        })
        .collect())
}

#[async_trait]
impl Source for NwsSource {
    fn name(&self) -> &str {
        "nws"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Official
    }

    async fn fetch(&self, location: &Location, _keywords: &KeywordEntry) -> Result<Vec<SourceItem>> {
        let url = format!("{}/alerts/active", self.base_url.trim_end_matches('/'));
        let point = format!("{:.4},{:.4}", location.lat, location.lon);
        let body = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/geo+json")
            .query(&[
                ("point", point.as_str()),
                ("status", "actual"),
                ("message_type", "alert"),
            ])
            .send()
            .await
            .context("nws http get()")?
            .error_for_status()
            .context("nws http status")?
            .text()
            .await
            .context("nws http .text()")?;
        parse_alerts(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "id": "https://api.weather.gov/alerts/urn:oid:2.49.0.1.840.0.abc",
          "properties": {
            "@id": "https://api.weather.gov/alerts/urn:oid:2.49.0.1.840.0.abc",
            "id": "urn:oid:2.49.0.1.840.0.abc",
            "areaDesc": "Fairfax; Arlington",
            "event": "Flash Flood Warning",
            "severity": "Severe",
            "urgency": "Immediate",
            "headline": "Flash Flood Warning issued for Fairfax",
            "description": "Heavy rain.",
            "expires": "2026-06-01T18:00:00-04:00"
          }
        },
        { "id": "x2", "properties": {} }
      ]
    }"#;

    #[test]
    fn parses_features() {
        let items = parse_alerts(BODY).unwrap();
        assert_eq!(items.len(), 2);
        match &items[0] {
            SourceItem::OfficialAlert(a) => {
                assert_eq!(a.id.as_deref(), Some("urn:oid:2.49.0.1.840.0.abc"));
                assert_eq!(a.severity.as_deref(), Some("Severe"));
                assert_eq!(a.area_desc.as_deref(), Some("Fairfax; Arlington"));
                assert!(a.uri.as_deref().unwrap().starts_with("https://api.weather.gov"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &items[1] {
            SourceItem::OfficialAlert(a) => assert_eq!(a.id.as_deref(), Some("x2")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_alerts("<html>").is_err());
    }
}
