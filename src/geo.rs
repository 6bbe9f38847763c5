//! # Geo helpers
//! Text normalization for locality matching, distance math for radius
//! filters, and domain extraction for news diversity counts.

use unicode_normalization::UnicodeNormalization;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Second-level labels that make a three-label registrable domain (`bbc.co.uk`).
const SECOND_LEVEL: &[&str] = &["co", "com", "org", "net", "gov", "ac", "edu"];

/// NFKD-decompose and drop everything outside ASCII (`"Montréal"` → `"Montreal"`).
pub fn normalize_ascii(value: &str) -> String {
    value.nfkd().filter(|c| c.is_ascii()).collect()
}

/// Lowercase ASCII slug with dashes (`"St. John's Rd"` → `"st-johns-rd"`).
pub fn slugify(value: &str) -> String {
    normalize_ascii(value)
        .to_ascii_lowercase()
        .replace('\'', "")
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect()
}

/// Great-circle distance between two `(lat, lon)` points in kilometres.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Registrable domain of a URL, lowercased, or `None` when the URL has no host.
pub fn registered_domain(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return Some(labels.join("."));
    }
    let n = labels.len();
    let keep = if labels[n - 1].len() == 2 && SECOND_LEVEL.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    Some(labels[n - keep..].join("."))
}

/// Lowercased ASCII form used for every substring match in the decision engine.
pub fn fold(value: &str) -> String {
    normalize_ascii(value).to_lowercase()
}
