use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

use super::{AlertPayload, Notifier};
use crate::config::settings::OutputsConfig;
use crate::decision::Priority;

const API_URL: &str = "https://api.pushover.net/1/messages.json";

pub struct PushoverNotifier {
    user_key: Option<String>,
    app_token: Option<String>,
    retry_sec: u32,
    expire_sec: u32,
    sound: Option<String>,
    device: Option<String>,
    api_url: String,
    client: Client,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl PushoverNotifier {
    /// Credentials from `PUSHOVER_USER_KEY` / `PUSHOVER_APP_TOKEN`.
    pub fn from_env(outputs: &OutputsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("building pushover http client")?;
        Ok(Self {
            user_key: env_opt("PUSHOVER_USER_KEY"),
            app_token: env_opt("PUSHOVER_APP_TOKEN"),
            retry_sec: outputs.emergency_retry_sec,
            expire_sec: outputs.emergency_expire_sec,
            sound: outputs.pushover_sound.clone(),
            device: outputs.pushover_device.clone(),
            api_url: API_URL.to_string(),
            client,
        })
    }

    /// Optional builder for tests/tools
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Form fields for one message. Emergency priority adds retry/expire,
    /// which the API requires for priority 2.
    pub fn form(&self, payload: &AlertPayload) -> Vec<(&'static str, String)> {
        let mut form = vec![
            ("token", self.app_token.clone().unwrap_or_default()),
            ("user", self.user_key.clone().unwrap_or_default()),
            ("title", payload.title.clone()),
            ("message", payload.body.clone()),
            ("priority", payload.priority.as_u8().to_string()),
        ];
        if let Some(url) = &payload.url {
            form.push(("url", url.clone()));
        }
        if payload.priority == Priority::Emergency {
            form.push(("retry", self.retry_sec.to_string()));
            form.push(("expire", self.expire_sec.to_string()));
        }
        if let Some(sound) = &self.sound {
            form.push(("sound", sound.clone()));
        }
        if let Some(device) = &self.device {
            form.push(("device", device.clone()));
        }
        form
    }
}

#[async_trait::async_trait]
impl Notifier for PushoverNotifier {
    fn name(&self) -> &str {
        "pushover"
    }

    fn is_configured(&self) -> bool {
        self.user_key.is_some() && self.app_token.is_some()
    }

    async fn send(&self, payload: &AlertPayload) -> Result<()> {
        self.client
            .post(&self.api_url)
            .form(&self.form(payload))
            .send()
            .await
            .context("pushover post")?
            .error_for_status()
            .context("pushover non-2xx")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notifier() -> PushoverNotifier {
        PushoverNotifier {
            user_key: Some("u".into()),
            app_token: Some("t".into()),
            retry_sec: 60,
            expire_sec: 3600,
            sound: None,
            device: Some("phone".into()),
            api_url: API_URL.into(),
            client: Client::new(),
        }
    }

    fn payload(priority: Priority) -> AlertPayload {
        AlertPayload {
            title: "[HOME] Tornado Warning".into(),
            body: "Take cover".into(),
            priority,
            url: Some("https://api.weather.gov/alerts/a1".into()),
            location_id: "home".into(),
        }
    }

    #[test]
    fn emergency_adds_retry_and_expire() {
        let n = notifier();
        let form = n.form(&payload(Priority::Emergency));
        assert!(form.contains(&("priority", "2".to_string())));
        assert!(form.contains(&("retry", "60".to_string())));
        assert!(form.contains(&("expire", "3600".to_string())));
        assert!(form.contains(&("device", "phone".to_string())));

        let form = n.form(&payload(Priority::Normal));
        assert!(form.contains(&("priority", "1".to_string())));
        assert!(!form.iter().any(|(k, _)| *k == "retry"));
    }
}
