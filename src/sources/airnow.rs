// src/sources/airnow.rs
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::config::{KeywordEntry, Location};
use crate::sources::{AirQualityObservation, Source, SourceItem, SourceKind};

const AIRNOW_CURRENT: &str = "https://www.airnowapi.org/aq/observation/latLong/current/";
pub const API_KEY_ENV: &str = "AIRNOW_API_KEY";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Observation {
    date_observed: Option<String>,
    hour_observed: Option<u8>,
    #[serde(default)]
    reporting_area: String,
    state_code: Option<String>,
    #[serde(default)]
    parameter_name: String,
    #[serde(rename = "AQI")]
    aqi: Option<i64>,
    category: Option<Category>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Category {
    number: Option<u8>,
    name: Option<String>,
}

/// Current AirNow observations near a location. Needs `AIRNOW_API_KEY`.
pub struct AirNowSource {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl AirNowSource {
    pub fn new(client: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            endpoint: AIRNOW_CURRENT.to_string(),
        }
    }

    pub fn from_env(client: reqwest::Client) -> Self {
        Self::new(client, std::env::var(API_KEY_ENV).ok())
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

pub fn parse_observations(body: &str) -> Result<Vec<SourceItem>> {
    let obs: Vec<Observation> = serde_json::from_str(body).context("parsing airnow observations")?;
    Ok(obs
        .into_iter()
        .map(|o| {
            let (category_number, category) = match o.category {
                Some(c) => (c.number, c.name),
                None => (None, None),
            };
            SourceItem::AirQuality(AirQualityObservation {
                reporting_area: o.reporting_area,
                state_code: o.state_code,
                parameter: o.parameter_name,
                aqi: o.aqi,
                category,
                category_number,
                date_observed: o.date_observed.map(|d| d.trim().to_string()),
                hour_observed: o.hour_observed,
            })
        })
        .collect())
}

#[async_trait]
impl Source for AirNowSource {
    fn name(&self) -> &str {
        "airnow"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::AirQuality
    }

    async fn fetch(&self, location: &Location, _keywords: &KeywordEntry) -> Result<Vec<SourceItem>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("{API_KEY_ENV} missing"))?;
        let (lat, lon) = (location.lat.to_string(), location.lon.to_string());
        let distance = (location.radius_km as i64).to_string();
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "application/json"),
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                ("distance", distance.as_str()),
                ("API_KEY", key),
            ])
            .send()
            .await
            .context("airnow http get()")?;
        let status = resp.status();
        let body = resp.text().await.context("airnow http .text()")?;
        if !status.is_success() {
            bail!("{}", body.trim());
        }
        parse_observations(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::poll;
    use std::time::Duration;

    fn loc() -> Location {
        Location {
            id: "home".into(),
            label: "Fairfax, Virginia".into(),
            role: String::new(),
            lat: 38.85,
            lon: -77.3,
            radius_km: 40.0,
            roads: vec![],
        }
    }

    #[tokio::test]
    async fn missing_key_is_a_failed_result() {
        let source = AirNowSource::new(reqwest::Client::new(), Some("  ".into()));
        let r = poll(&source, &loc(), &KeywordEntry::default(), Duration::from_secs(1)).await;
        assert!(!r.ok);
        assert_eq!(r.provider, "airnow");
        assert_eq!(r.error.as_deref(), Some("AIRNOW_API_KEY missing"));
        assert!(r.items.is_empty());
    }

    #[test]
    fn category_is_optional() {
        let items = parse_observations(r#"[{"ReportingArea":"Boise","ParameterName":"PM2.5","AQI":-1}]"#).unwrap();
        let SourceItem::AirQuality(o) = &items[0] else {
            panic!("expected an observation");
        };
        assert_eq!(o.aqi, Some(-1));
        assert_eq!(o.category, None);
        assert_eq!(parse_observations("[]").unwrap().len(), 0);
    }
}
