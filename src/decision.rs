//! decision.rs: alert decisions produced by the engine and consumed by the
//! gating/dispatch step. Built once, never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::{cooldown_bucket, AlertKey};

/// Hard cap on alert bodies (characters).
pub const MAX_BODY_CHARS: usize = 5000;

/// Delivery priority. Serialized as the integer the push channel expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Normal,
    Emergency,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        match self {
            Priority::Normal => 1,
            Priority::Emergency => 2,
        }
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> u8 {
        p.as_u8()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Priority::Normal),
            2 => Ok(Priority::Emergency),
            other => Err(format!("priority must be 1 or 2, got {other}")),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    /// Source type that produced the decision (`nws`, `usgs`, `llm_news`).
    pub provider: String,
    pub location_id: String,
    pub title: String,
    pub body: String,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub category: String,
    pub reason: String,
}

impl AlertDecision {
    pub fn key(&self) -> AlertKey {
        AlertKey::new(
            &self.location_id,
            &self.provider,
            &self.title,
            &self.category,
        )
    }

    pub fn cooldown_bucket(&self) -> String {
        cooldown_bucket(&self.location_id, &self.category, self.priority.as_u8())
    }
}

/// `[HOME] suffix`, the title convention shared by every decision.
pub fn location_title(location_id: &str, suffix: &str) -> String {
    format!("[{}] {}", location_id.to_uppercase(), suffix)
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_serializes_as_integer() {
        assert_eq!(serde_json::to_value(Priority::Emergency).unwrap(), json!(2));
        let p: Priority = serde_json::from_value(json!(1)).unwrap();
        assert_eq!(p, Priority::Normal);
        assert!(serde_json::from_value::<Priority>(json!(3)).is_err());
    }

    #[test]
    fn key_and_bucket_follow_decision() {
        let d = AlertDecision {
            provider: "usgs".into(),
            location_id: "home".into(),
            title: location_title("home", "M5.1 earthquake"),
            body: String::new(),
            priority: Priority::Emergency,
            url: None,
            category: "earthquake".into(),
            reason: "mag=5.1".into(),
        };
        assert_eq!(d.title, "[HOME] M5.1 earthquake");
        assert_eq!(
            d.key().composite(),
            "home/usgs/[HOME] M5.1 earthquake/earthquake"
        );
        assert_eq!(d.cooldown_bucket(), "home:earthquake:2");
    }
}
