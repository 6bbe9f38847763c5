use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{AlertPayload, Notifier};
use crate::config::settings::OutputsConfig;

/// SMTP over implicit TLS (port 465) with an app password.
pub struct EmailNotifier {
    smtp_host: String,
    username: Option<String>,
    password: Option<String>,
    to: Option<String>,
}

fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl EmailNotifier {
    /// Credentials from `GMAIL_USER` / `GMAIL_APP_PASSWORD` / `ALERT_EMAIL_TO`.
    pub fn from_env(outputs: &OutputsConfig) -> Self {
        Self {
            smtp_host: outputs.smtp_host.clone(),
            username: env_opt("GMAIL_USER"),
            password: env_opt("GMAIL_APP_PASSWORD"),
            to: env_opt("ALERT_EMAIL_TO"),
        }
    }

    /// Plain text always; an HTML alternative with a details link when the
    /// payload has a URL.
    pub fn build_message(&self, payload: &AlertPayload) -> Result<Message> {
        let from: Mailbox = self
            .username
            .as_deref()
            .unwrap_or_default()
            .parse()
            .context("invalid GMAIL_USER address")?;
        let to: Mailbox = self
            .to
            .as_deref()
            .unwrap_or_default()
            .parse()
            .context("invalid ALERT_EMAIL_TO address")?;
        let builder = Message::builder().from(from).to(to).subject(&payload.title);

        let msg = match &payload.url {
            Some(url) => {
                let html = format!(
                    "<p>{}</p><p><a href=\"{}\">Details</a></p>",
                    html_escape::encode_text(&payload.body).replace('\n', "<br>"),
                    html_escape::encode_double_quoted_attribute(url)
                );
                builder.multipart(MultiPart::alternative_plain_html(payload.body.clone(), html))
            }
            None => builder
                .header(header::ContentType::TEXT_PLAIN)
                .body(payload.body.clone()),
        };
        msg.context("build email")
    }
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    fn is_configured(&self) -> bool {
        self.username.is_some() && self.password.is_some() && self.to.is_some()
    }

    async fn send(&self, payload: &AlertPayload) -> Result<()> {
        let msg = self.build_message(payload)?;
        let creds = Credentials::new(
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        );
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.smtp_host)
            .with_context(|| format!("invalid smtp host {}", self.smtp_host))?
            .credentials(creds)
            .build();
        mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
