//! Language-model client and JSON generation discipline.
//!
//! [`LlmClient`] abstracts the provider; [`GeminiLlm`] talks to the
//! Gemini REST API in JSON response mode. [`generate_json`] wraps any
//! client with the retry-and-sanitize loop every generation call site
//! uses: model output is stripped of markdown fences and repaired for
//! unescaped backslashes before parsing, and a failed attempt backs off
//! exponentially before trying again.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A text-generation backend that returns raw model output for a prompt.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// One generation attempt. Callers needing parsed output go through
    /// [`generate_json`] instead of calling this directly.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Gemini `generateContent` client, JSON response mode.
pub struct GeminiLlm {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiLlm {
    /// Requires `GEMINI_API_KEY` in the environment.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::Provider("GEMINI_API_KEY not set".into()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Provider(format!("failed to build http client: {e}")))?;
        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{GEMINI_API_BASE}/models/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseMimeType": "application/json" }
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("llm request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "llm request returned {status}: {text}"
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("llm response was not json: {e}")))?;

        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Provider("llm response had no candidate text".into()))
    }
}

/// Generate and parse a JSON value, retrying on transport and parse
/// failures with exponential backoff. Exhausting the attempts yields
/// [`Error::Generation`] carrying the last failure reason.
pub async fn generate_json(
    llm: &dyn LlmClient,
    prompt: &str,
    config: &LlmConfig,
) -> Result<Value> {
    let mut last_reason = String::new();
    for attempt in 0..config.max_retries {
        if attempt > 0 {
            let delay = config.base_delay_ms * (1u64 << (attempt - 1).min(16));
            warn!(attempt, delay_ms = delay, "retrying generation");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        match llm.generate(prompt).await {
            Ok(raw) => {
                let cleaned = sanitize_model_output(&raw);
                match serde_json::from_str::<Value>(&cleaned) {
                    Ok(value) => {
                        debug!(attempt, model = llm.model_name(), "generation succeeded");
                        return Ok(value);
                    }
                    Err(e) => {
                        last_reason = format!("output was not valid json: {e}");
                    }
                }
            }
            Err(e) => {
                last_reason = e.to_string();
            }
        }
    }
    Err(Error::Generation {
        attempts: config.max_retries,
        reason: last_reason,
    })
}

/// Strip markdown code fences and repair unescaped backslashes so the
/// output parses as JSON. Models in JSON mode still occasionally wrap the
/// payload in ```json fences or emit raw `\` inside string values.
pub fn sanitize_model_output(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    repair_backslashes(text.trim())
}

/// Double every backslash that is not part of an already-escaped pair
/// and does not begin a `\"` escape. Decided per position in the input,
/// like a single regex pass would be.
fn repair_backslashes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            let next = chars.get(i + 1).copied();
            if matches!(next, Some('\\') | Some('"')) {
                // Valid pair, emit both and skip past them.
                out.push(c);
                if let Some(n) = next {
                    out.push(n);
                }
                i += 2;
                continue;
            }
            out.push_str("\\\\");
            i += 1;
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}
