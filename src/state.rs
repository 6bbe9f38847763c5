//! # State Store
//! Durable dedupe and cooldown bookkeeping shared across runs.
//!
//! On disk this is one JSON document with three maps:
//!   - `seen`: alert key → first delivery timestamp (at-most-once per identity)
//!   - `cooldowns`: bucket (`location:category:priority`) → expiry timestamp
//!   - `metadata`: free-form string side-channel
//!
//! Timestamps are UTC strings in `STATE_TS_FORMAT`. Values are stored as the
//! strings read from disk so a load/save round-trip is lossless.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const STATE_TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const STATE_TS_PARSE: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// Identity of one alert event. Same key ⇒ same alert, across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertKey {
    pub location_id: String,
    pub provider: String,
    /// Upstream identifier; in practice the alert title.
    pub external_id: String,
    pub category: String,
}

impl AlertKey {
    pub fn new(
        location_id: impl Into<String>,
        provider: impl Into<String>,
        external_id: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            location_id: location_id.into(),
            provider: provider.into(),
            external_id: external_id.into(),
            category: category.into(),
        }
    }

    pub fn composite(&self) -> String {
        [
            self.location_id.as_str(),
            self.provider.as_str(),
            self.external_id.as_str(),
            self.category.as_str(),
        ]
        .join("/")
    }

    /// Short stable id (first 12 hex chars of SHA-256 over the composite).
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.composite().as_bytes());
        digest.iter().take(6).map(|b| format!("{b:02x}")).collect()
    }
}

/// Rate-limit bucket: independent of alert identity.
pub fn cooldown_bucket(location_id: &str, category: &str, priority: u8) -> String {
    format!("{location_id}:{category}:{priority}")
}

pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format(STATE_TS_FORMAT).to_string()
}

pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(s, STATE_TS_PARSE)
        .map(|n| n.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|d| d.with_timezone(&Utc))
        })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateStore {
    #[serde(default)]
    seen: BTreeMap<String, String>,
    #[serde(default)]
    cooldowns: BTreeMap<String, String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl StateStore {
    /// Load from `path`; a missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(s) if s.trim().is_empty() => Ok(Self::default()),
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing state file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("reading state file {}", path.display())),
        }
    }

    /// Write the whole store to `path` via a temp file + rename, so a crash
    /// mid-write leaves the previous file intact.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("serializing state")?;
        write_atomic(path, json.as_bytes())
            .with_context(|| format!("writing state file {}", path.display()))
    }

    pub fn is_seen(&self, key: &AlertKey) -> bool {
        self.seen.contains_key(&key.composite())
    }

    pub fn mark_seen(&mut self, key: &AlertKey) {
        self.mark_seen_at(key, Utc::now());
    }

    pub fn mark_seen_at(&mut self, key: &AlertKey, now: DateTime<Utc>) {
        self.seen.insert(key.composite(), format_ts(now));
    }

    /// Undo `mark_seen`, e.g. for an alert no channel accepted.
    pub fn forget_seen(&mut self, key: &AlertKey) -> bool {
        self.seen.remove(&key.composite()).is_some()
    }

    pub fn start_cooldown(&mut self, bucket: &str, minutes: i64) {
        self.start_cooldown_at(bucket, minutes, Utc::now());
    }

    pub fn start_cooldown_at(&mut self, bucket: &str, minutes: i64, now: DateTime<Utc>) {
        let expiry = now + Duration::minutes(minutes.max(0));
        self.cooldowns.insert(bucket.to_string(), format_ts(expiry));
    }

    pub fn in_cooldown(&mut self, bucket: &str) -> bool {
        self.in_cooldown_at(bucket, Utc::now())
    }

    /// True while `now < expiry`. An expired (or unreadable) bucket is removed
    /// on the spot so it does not reach the next saved file.
    pub fn in_cooldown_at(&mut self, bucket: &str, now: DateTime<Utc>) -> bool {
        let Some(raw) = self.cooldowns.get(bucket) else {
            return false;
        };
        match parse_ts(raw) {
            Some(expiry) if now < expiry => true,
            _ => {
                self.cooldowns.remove(bucket);
                false
            }
        }
    }

    pub fn clear_cooldown(&mut self, bucket: &str) -> bool {
        self.cooldowns.remove(bucket).is_some()
    }

    pub fn get_metadata(&self, key: &str, default: Option<&str>) -> Option<String> {
        self.metadata
            .get(key)
            .cloned()
            .or_else(|| default.map(str::to_string))
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    /// Drop `seen` entries first recorded more than `max_age` before `now`.
    /// Entries with unreadable timestamps are kept. Returns how many were removed.
    pub fn prune_seen(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - max_age;
        let before = self.seen.len();
        self.seen
            .retain(|_, ts| parse_ts(ts).map_or(true, |t| t >= cutoff));
        before - self.seen.len()
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn cooldowns_len(&self) -> usize {
        self.cooldowns.len()
    }
}

/// Write bytes to `path` through a sibling `.tmp` file and an atomic rename.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp_name);
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn composite_and_bucket_shapes() {
        let k = AlertKey::new("home", "nws", "[HOME] Tornado Warning", "nws");
        assert_eq!(k.composite(), "home/nws/[HOME] Tornado Warning/nws");
        assert_eq!(k.fingerprint().len(), 12);
        assert_eq!(cooldown_bucket("home", "nws", 2), "home:nws:2");
    }

    #[test]
    fn timestamp_format_roundtrips() {
        let s = format_ts(t0());
        assert_eq!(s, "2025-03-01T12:00:00.000000Z");
        assert_eq!(parse_ts(&s), Some(t0()));
        assert_eq!(
            parse_ts("2025-03-01T12:00:00+00:00"),
            Some(t0()),
            "rfc3339 accepted as fallback"
        );
    }

    #[test]
    fn cooldown_boundary_is_exclusive() {
        let mut s = StateStore::default();
        s.start_cooldown_at("home:nws:1", 10, t0());
        assert!(s.in_cooldown_at("home:nws:1", t0() + Duration::minutes(9)));
        assert!(!s.in_cooldown_at("home:nws:1", t0() + Duration::minutes(10)));
        assert_eq!(s.cooldowns_len(), 0);
    }

    #[test]
    fn forget_and_clear_release_the_gates() {
        let mut s = StateStore::default();
        let k = AlertKey::new("home", "nws", "[HOME] Tornado Warning", "nws");
        s.mark_seen_at(&k, t0());
        s.start_cooldown_at("home:nws:2", 60, t0());
        assert!(s.forget_seen(&k));
        assert!(s.clear_cooldown("home:nws:2"));
        assert!(!s.is_seen(&k));
        assert!(!s.in_cooldown_at("home:nws:2", t0()));
        assert!(!s.forget_seen(&k));
    }

    #[test]
    fn unreadable_expiry_is_dropped() {
        let mut s = StateStore::default();
        s.cooldowns.insert("b".into(), "garbage".into());
        assert!(!s.in_cooldown_at("b", t0()));
        assert_eq!(s.cooldowns_len(), 0);
    }

    #[test]
    fn prune_removes_only_old_entries() {
        let mut s = StateStore::default();
        s.mark_seen_at(&AlertKey::new("a", "nws", "old", "nws"), t0());
        s.mark_seen_at(
            &AlertKey::new("a", "nws", "new", "nws"),
            t0() + Duration::days(20),
        );
        s.seen.insert("legacy".into(), "??".into());
        let removed = s.prune_seen(Duration::days(7), t0() + Duration::days(21));
        assert_eq!(removed, 1);
        assert_eq!(s.seen_len(), 2);
    }

    #[test]
    fn metadata_default() {
        let mut s = StateStore::default();
        assert_eq!(s.get_metadata("x", Some("d")).as_deref(), Some("d"));
        assert_eq!(s.get_metadata("x", None), None);
        s.set_metadata("x", "1");
        assert_eq!(s.get_metadata("x", Some("d")).as_deref(), Some("1"));
    }
}
