//! # Decision Engine
//! Pure conversions from source items to [`AlertDecision`]s, one per source
//! type. Nothing here touches state, the network or the clock; gating and
//! dispatch happen in the runner.

use crate::classify::ClassifiedItem;
use crate::config::{KeywordEntry, Location};
use crate::decision::{location_title, truncate_chars, AlertDecision, Priority, MAX_BODY_CHARS};
use crate::geo::{fold, normalize_ascii};
use crate::sources::{OfficialAlert, QuakeEvent};

pub const OFFICIAL_PROVIDER: &str = "nws";
pub const SEISMIC_PROVIDER: &str = "usgs";
pub const CLASSIFIED_PROVIDER: &str = "llm_news";

/// `(normal, emergency)` minimum magnitudes for one location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuakeThresholds {
    pub normal: f64,
    pub emergency: f64,
}

impl From<(f64, f64)> for QuakeThresholds {
    fn from((normal, emergency): (f64, f64)) -> Self {
        Self { normal, emergency }
    }
}

/// "severe" → "Severe", matching how emergency severities are configured.
fn title_case(s: &str) -> String {
    let mut chars = s.trim().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Does the alert's area text or headline name this location?
/// Alerts with neither are treated as applying everywhere.
pub fn official_alert_impacts_location(
    location: &Location,
    keywords: &KeywordEntry,
    alert: &OfficialAlert,
) -> bool {
    let area = fold(alert.area_desc.as_deref().unwrap_or_default());
    let headline = fold(alert.headline.as_deref().unwrap_or_default());
    let text = format!("{area} {headline}");
    if text.trim().is_empty() {
        return true;
    }
    std::iter::once(fold(&location.label))
        .chain(std::iter::once(location.id.to_lowercase()))
        .chain(keywords.geo_terms.iter().map(|t| fold(t)))
        .any(|token| !token.is_empty() && text.contains(&token))
}

/// Official alert → decision. Outside hysteria only emergency-class
/// severities pass; watches and minor/moderate items need hysteria.
pub fn decide_official_alert(
    location: &Location,
    keywords: &KeywordEntry,
    alert: &OfficialAlert,
    hysteria_active: bool,
    emergency_severities: &[String],
) -> Option<AlertDecision> {
    if !official_alert_impacts_location(location, keywords, alert) {
        return None;
    }
    let severity = title_case(alert.severity.as_deref().unwrap_or_default());
    let event = alert
        .event
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or("NWS Alert");
    let is_watch = event.to_lowercase().contains("watch")
        || matches!(severity.to_lowercase().as_str(), "minor" | "moderate");
    if is_watch && !hysteria_active {
        return None;
    }
    let severe = emergency_severities
        .iter()
        .any(|s| s.trim().eq_ignore_ascii_case(&severity));
    if !severe && !hysteria_active {
        return None;
    }
    let immediate = alert
        .urgency
        .as_deref()
        .is_some_and(|u| u.trim().eq_ignore_ascii_case("immediate"));
    let priority = if severe || immediate {
        Priority::Emergency
    } else {
        Priority::Normal
    };

    let mut reason = format!("severity={severity}");
    if hysteria_active {
        reason.push_str(";hysteria");
    }
    let body = normalize_ascii(
        alert
            .description
            .as_deref()
            .or(alert.headline.as_deref())
            .unwrap_or_default(),
    );

    Some(AlertDecision {
        provider: OFFICIAL_PROVIDER.to_string(),
        location_id: location.id.clone(),
        title: location_title(&location.id, event),
        body: truncate_chars(&body, MAX_BODY_CHARS),
        priority,
        url: alert.uri.clone(),
        category: "nws".to_string(),
        reason,
    })
}

/// `4.5` → `"4.5"`, `5.0` → `"5.0"`.
fn format_mag(mag: f64) -> String {
    if mag.fract() == 0.0 {
        format!("{mag:.1}")
    } else {
        format!("{mag}")
    }
}

/// Quake → decision by magnitude band. Events without a magnitude are skipped.
pub fn decide_quake(
    location_id: &str,
    quake: &QuakeEvent,
    thresholds: QuakeThresholds,
) -> Option<AlertDecision> {
    let mag = quake.mag.filter(|m| m.is_finite())?;
    if mag < thresholds.normal {
        return None;
    }
    let priority = if mag >= thresholds.emergency {
        Priority::Emergency
    } else {
        Priority::Normal
    };
    let mag_s = format_mag(mag);
    let body = normalize_ascii(
        quake
            .place
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or("USGS event"),
    );
    Some(AlertDecision {
        provider: SEISMIC_PROVIDER.to_string(),
        location_id: location_id.to_string(),
        title: location_title(location_id, &format!("M{mag_s} earthquake")),
        body: truncate_chars(&body, MAX_BODY_CHARS),
        priority,
        url: quake.url.clone(),
        category: "earthquake".to_string(),
        reason: format!("mag={mag_s}"),
    })
}

/// Does the item's own text name the city, county or a road?
/// State-level mentions never count.
pub fn mentions_locality(item: &ClassifiedItem, keywords: &KeywordEntry) -> bool {
    let tokens = keywords.locality_tokens();
    if tokens.is_empty() {
        return false;
    }
    let n = &item.item;
    let text = fold(&format!(
        "{} {} {}",
        n.title,
        n.summary,
        n.content.as_deref().unwrap_or_default()
    ));
    tokens.iter().any(|t| text.contains(t.as_str()))
}

/// Keep classifier output that is relevant, severe enough and locally specific.
pub fn accept_classified(
    items: Vec<ClassifiedItem>,
    keywords: &KeywordEntry,
    min_severity: u8,
) -> Vec<ClassifiedItem> {
    items
        .into_iter()
        .filter(|i| i.relevant && i.severity >= min_severity && mentions_locality(i, keywords))
        .collect()
}

/// Accepted classifier item → decision, if it reaches the emission floor.
pub fn decide_classified(
    location_id: &str,
    item: &ClassifiedItem,
    emit_min_severity: u8,
) -> Option<AlertDecision> {
    if item.severity < emit_min_severity {
        return None;
    }
    let n = &item.item;
    let priority = if item.severity >= 3 {
        Priority::Emergency
    } else {
        Priority::Normal
    };
    let title = if n.title.trim().is_empty() {
        "News item"
    } else {
        n.title.as_str()
    };
    let body_src = n
        .content
        .as_deref()
        .filter(|c| !c.is_empty())
        .or(Some(n.summary.as_str()).filter(|s| !s.is_empty()))
        .unwrap_or(title);
    let category = if item.category.is_empty() {
        "news"
    } else {
        item.category.as_str()
    };
    Some(AlertDecision {
        provider: CLASSIFIED_PROVIDER.to_string(),
        location_id: location_id.to_string(),
        title: location_title(location_id, title),
        body: truncate_chars(&normalize_ascii(body_src), MAX_BODY_CHARS),
        priority,
        url: (!n.link.is_empty()).then(|| n.link.clone()),
        category: "news".to_string(),
        reason: format!("llm:{category} sev={}; {}", item.severity, item.reason),
    })
}
