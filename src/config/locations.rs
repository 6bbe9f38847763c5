// src/config/locations.rs
use serde::{Deserialize, Serialize};

/// A monitored place. Static for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    /// Human label, conventionally `"City, State"`.
    pub label: String,
    #[serde(default)]
    pub role: String,
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
    #[serde(default)]
    pub roads: Vec<String>,
}

impl Location {
    pub fn point(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    /// First comma-separated part of the label.
    pub fn city(&self) -> &str {
        self.label.split(',').next().unwrap_or_default().trim()
    }

    /// Last comma-separated part of the label (empty when there is no comma).
    pub fn state(&self) -> &str {
        match self.label.rsplit_once(',') {
            Some((_, s)) => s.trim(),
            None => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationDefaults {
    pub quake_min_mag_normal: f64,
    pub quake_min_mag_emergency: f64,
}

impl Default for LocationDefaults {
    fn default() -> Self {
        Self {
            quake_min_mag_normal: 3.0,
            quake_min_mag_emergency: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationsConfig {
    pub locations: Vec<Location>,
    #[serde(default)]
    pub defaults: LocationDefaults,
}

impl LocationsConfig {
    pub fn get(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id == id)
    }

    pub(crate) fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.locations.is_empty() {
            out.push("locations: at least one location is required".to_string());
        }
        let mut ids = std::collections::BTreeSet::new();
        for l in &self.locations {
            if l.id.trim().is_empty() {
                out.push("locations: id must not be empty".to_string());
            }
            if !ids.insert(l.id.as_str()) {
                out.push(format!("locations: duplicate id `{}`", l.id));
            }
            if !(-90.0..=90.0).contains(&l.lat) {
                out.push(format!("locations.{}: lat {} outside [-90, 90]", l.id, l.lat));
            }
            if !(-180.0..=180.0).contains(&l.lon) {
                out.push(format!("locations.{}: lon {} outside [-180, 180]", l.id, l.lon));
            }
            if l.radius_km <= 0.0 {
                out.push(format!("locations.{}: radius_km must be > 0", l.id));
            }
        }
        let d = &self.defaults;
        if d.quake_min_mag_normal < 0.0 || d.quake_min_mag_emergency < 0.0 {
            out.push("defaults: quake magnitudes must be >= 0".to_string());
        }
        if d.quake_min_mag_emergency < d.quake_min_mag_normal {
            out.push("defaults: emergency magnitude must be >= normal magnitude".to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(id: &str, label: &str) -> Location {
        Location {
            id: id.into(),
            label: label.into(),
            role: "home".into(),
            lat: 38.9,
            lon: -77.0,
            radius_km: 50.0,
            roads: vec![],
        }
    }

    #[test]
    fn label_parts() {
        let l = loc("home", "Fairfax, Virginia");
        assert_eq!(l.city(), "Fairfax");
        assert_eq!(l.state(), "Virginia");
        assert_eq!(loc("x", "Nowhere").state(), "");
    }

    #[test]
    fn duplicate_ids_rejected() {
        let cfg = LocationsConfig {
            locations: vec![loc("home", "A, B"), loc("home", "C, D")],
            defaults: LocationDefaults::default(),
        };
        let p = cfg.problems();
        assert!(p.iter().any(|m| m.contains("duplicate id `home`")), "{p:?}");
    }
}
