// src/config/keywords.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::locations::Location;
use crate::geo::normalize_ascii;

/// Administrative names for a location. State-level names are kept apart
/// from city/county names because they are too broad to prove locality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub county: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub state_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordEntry {
    #[serde(default)]
    pub geo_terms: Vec<String>,
    #[serde(default)]
    pub roads: Vec<String>,
    #[serde(default)]
    pub metadata: Locality,
}

impl KeywordEntry {
    /// Offline fallback built from the location label alone.
    pub fn derive(location: &Location) -> Self {
        let city = normalize_ascii(location.city());
        let state = normalize_ascii(location.state());
        let county = if city.is_empty() {
            String::new()
        } else {
            format!("{city} County")
        };
        let state_code: String = state.chars().take(2).collect::<String>().to_uppercase();

        let mut geo_terms: Vec<String> = [&city, &county, &state, &state_code]
            .into_iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();
        geo_terms.sort();
        geo_terms.dedup();

        let mut roads: Vec<String> = location.roads.iter().map(|r| normalize_ascii(r)).collect();
        roads.sort();
        roads.dedup();

        Self {
            geo_terms,
            roads,
            metadata: Locality {
                city,
                county,
                state,
                state_code,
            },
        }
    }

    /// Tokens specific enough to prove an item is about this place:
    /// city, county (with and without the "County" suffix) and roads.
    /// State names and codes are deliberately absent.
    pub fn locality_tokens(&self) -> Vec<String> {
        let county = self.metadata.county.trim();
        let county_bare = county
            .strip_suffix(" County")
            .or_else(|| county.strip_suffix(" county"))
            .unwrap_or(county);
        let mut out: Vec<String> = [self.metadata.city.trim(), county, county_bare]
            .into_iter()
            .chain(self.roads.iter().map(|r| r.trim()))
            .filter(|s| !s.is_empty())
            .map(crate::geo::fold)
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordsConfig {
    #[serde(default)]
    pub locations: BTreeMap<String, KeywordEntry>,
}
