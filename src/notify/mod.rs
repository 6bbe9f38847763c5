pub mod email;
pub mod pushover;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::settings::OutputsConfig;
use crate::decision::{AlertDecision, Priority};

pub use email::EmailNotifier;
pub use pushover::PushoverNotifier;

/// What a channel actually delivers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub title: String,
    pub body: String,
    pub priority: Priority,
    pub url: Option<String>,
    pub location_id: String,
}

impl From<&AlertDecision> for AlertPayload {
    fn from(d: &AlertDecision) -> Self {
        Self {
            title: d.title.clone(),
            body: format!("{}\nReason: {}", d.body, d.reason),
            priority: d.priority,
            url: d.url.clone(),
            location_id: d.location_id.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name used as the key in delivery reports.
    fn name(&self) -> &str;
    /// False when credentials are missing; such channels report undelivered.
    fn is_configured(&self) -> bool;
    async fn send(&self, payload: &AlertPayload) -> Result<()>;
}

/// Fans a payload out to every enabled channel. Channels fail independently.
pub struct Dispatcher {
    channels: Vec<Arc<dyn Notifier>>,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Notifier>>, dry_run: bool) -> Self {
        Self { channels, dry_run }
    }

    /// Enabled channels from `[global.outputs]`, credentials from the environment.
    pub fn from_config(outputs: &OutputsConfig, dry_run: bool) -> Result<Self> {
        let mut channels: Vec<Arc<dyn Notifier>> = Vec::new();
        if outputs.use_pushover {
            channels.push(Arc::new(PushoverNotifier::from_env(outputs)?));
        }
        if outputs.use_email {
            channels.push(Arc::new(EmailNotifier::from_env(outputs)));
        }
        Ok(Self::new(channels, dry_run))
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Channel name → delivered. Never fails; errors are logged per channel.
    pub async fn dispatch(&self, payload: &AlertPayload) -> BTreeMap<String, bool> {
        let mut out = BTreeMap::new();
        for ch in &self.channels {
            let delivered = if !ch.is_configured() {
                tracing::info!(target: "notify", channel = ch.name(), "skipping send, missing credentials");
                false
            } else if self.dry_run {
                tracing::info!(
                    target: "notify",
                    channel = ch.name(),
                    title = %payload.title,
                    priority = payload.priority.as_u8(),
                    "[DRY] would send"
                );
                true
            } else {
                match ch.send(payload).await {
                    Ok(()) => {
                        tracing::info!(target: "notify", channel = ch.name(), title = %payload.title, "alert sent");
                        true
                    }
                    Err(e) => {
                        tracing::error!(
                            target: "notify",
                            channel = ch.name(),
                            error = %format!("{e:#}"),
                            "send failed"
                        );
                        false
                    }
                }
            };
            out.insert(ch.name().to_string(), delivered);
        }
        out
    }
}
