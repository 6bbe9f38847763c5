// src/classify/openai.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::classify::{ClassifiedItem, ClassifyMeta, ClassifyOutcome, ClassifyRequest, Classifier};
use crate::decision::truncate_chars;
use crate::sources::NewsItem;

const CHAT_COMPLETIONS: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a risk triage analyst for emergency preparedness. \
Only mark items relevant when BOTH conditions are met: \
(1) Hazard: clear near-term threat or impact (disaster, severe weather, civil unrest or violence, \
infrastructure outage, hazmat or chemical spill, evacuation or shelter-in-place, lockdown, major road closure, \
public health emergency). \
(2) Locality: specifically pertains to the provided city or county; state-wide or state-only mentions are insufficient. \
Always exclude sports, entertainment, routine politics, finance, human interest and general features unless they contain a concrete hazard and locality. \
Output strict JSON: {\"results\":[{title, link, domain, relevant:bool, category, reason, severity:int}]} \
with one result per input item, in input order, where severity is 1 (info), 2 (watch), 3 (warning).";

#[derive(Debug, Serialize)]
struct PromptItem<'a> {
    title: String,
    summary: String,
    content: String,
    domain: &'a str,
    link: &'a str,
}

#[derive(Debug, Deserialize)]
struct Verdicts {
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

/// Chat-completions classifier in JSON mode.
pub struct OpenAiClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenAiClassifier {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("prepper-alerts/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(4).min(timeout))
            .timeout(timeout)
            .build()
            .context("building classifier http client")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            endpoint: CHAT_COMPLETIONS.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// User message: location, geo hints, locality and the bounded item batch.
pub fn build_user_prompt(req: &ClassifyRequest<'_>) -> Result<String> {
    let items: Vec<PromptItem<'_>> = req
        .batch()
        .iter()
        .map(|i| PromptItem {
            title: truncate_chars(&i.title, 200),
            summary: truncate_chars(&i.summary, 400),
            content: truncate_chars(i.content.as_deref().unwrap_or_default(), req.max_chars),
            domain: &i.domain,
            link: &i.link,
        })
        .collect();
    let items_json = serde_json::to_string(&items).context("serializing classifier items")?;
    Ok(format!(
        "Location: {}\n\nGeo terms (hints): {}\n\nLocality: city={}, county={}, state_code={}\n\nItems:\n{}",
        req.location_id,
        req.geo_terms.join(", "),
        req.locality.city,
        req.locality.county,
        req.locality.state_code,
        items_json
    ))
}

fn severity_of(v: &serde_json::Value) -> u8 {
    let n = v
        .as_u64()
        .or_else(|| v.as_f64().map(|f| f as u64))
        .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        .unwrap_or(1);
    n.clamp(1, 3) as u8
}

/// Pair verdicts with the batch positionally and keep the relevant ones.
/// Malformed JSON yields no items and an `invalid_json` error in the meta.
pub fn parse_verdicts(batch: &[NewsItem], content: &str) -> (Vec<ClassifiedItem>, Option<String>) {
    let content = if content.trim().is_empty() { "{}" } else { content };
    let parsed: Verdicts = match serde_json::from_str(content) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(target: "classify", error = %e, "classifier returned invalid json");
            return (Vec::new(), Some("invalid_json".to_string()));
        }
    };
    let kept = batch
        .iter()
        .zip(parsed.results.iter())
        .filter(|(_, res)| res.get("relevant").and_then(|r| r.as_bool()) == Some(true))
        .map(|(src, res)| {
            let text = |k: &str| {
                res.get(k)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            };
            let category = text("category");
            ClassifiedItem {
                item: src.clone(),
                relevant: true,
                category: if category.is_empty() {
                    "general".to_string()
                } else {
                    category
                },
                reason: text("reason"),
                severity: res.get("severity").map(severity_of).unwrap_or(1),
            }
        })
        .collect();
    (kept, None)
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &str {
        "openai"
    }

    async fn classify(&self, req: &ClassifyRequest<'_>) -> Result<ClassifyOutcome> {
        let batch = req.batch();
        if batch.is_empty() {
            return Ok(ClassifyOutcome::default());
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let user = build_user_prompt(req)?;
        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("classifier http post()")?;
        let status = resp.status();
        if !status.is_success() {
            bail!("classifier http status {status}");
        }
        let resp: Resp = resp.json().await.context("decoding classifier response")?;
        let content = resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let (items, error) = parse_verdicts(batch, &content);
        tracing::info!(
            target: "classify",
            location = req.location_id,
            model = %self.model,
            input = batch.len(),
            kept = items.len(),
            "classified news batch"
        );
        Ok(ClassifyOutcome {
            meta: ClassifyMeta {
                used: true,
                model: Some(self.model.clone()),
                input: batch.len(),
                kept: items.len(),
                error,
            },
            items,
        })
    }
}
