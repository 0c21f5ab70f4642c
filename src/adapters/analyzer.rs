//! Transcript analyzers.
//!
//! `HttpTranscriptAnalyzer` calls an OpenAI-compatible chat completion
//! endpoint and asks for a JSON object. `StubAnalyzer` runs without any
//! credentials and builds a reduced-fidelity analysis from the recording's
//! own fields.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{AnalysisContext, TranscriptAnalyzer};
use crate::domain::Analysis;

const SYSTEM_PROMPT: &str = "You summarize insurance agency phone calls. \
Reply with a JSON object with keys: summary (one or two sentences), \
sentiment (positive|neutral|negative), action_items (array of strings), \
entities (object with customer_name, customer_phone, customer_email, policy_number), \
is_hangup (true if the caller hung up before a real conversation), \
request_type (short label such as billing, claim, quote, policy change).";

/// Analyzer backed by a chat completion API
pub struct HttpTranscriptAnalyzer {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpTranscriptAnalyzer {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build analyzer HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    fn user_prompt(transcript: &str, context: &AnalysisContext) -> String {
        let mut prompt = format!("Direction: {}\n", context.direction);
        if let Some(secs) = context.duration_secs {
            prompt.push_str(&format!("Duration: {}s\n", secs));
        }
        if let Some(agent) = &context.agent_name {
            prompt.push_str(&format!("Agent: {}\n", agent));
        }
        prompt.push_str("\nTranscript:\n");
        prompt.push_str(transcript);
        prompt
    }
}

/// Parse the model's reply, tolerating a fenced code block around the JSON
fn parse_analysis(content: &str) -> Result<Analysis> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).context("Analyzer reply is not a valid analysis object")
}

#[async_trait]
impl TranscriptAnalyzer for HttpTranscriptAnalyzer {
    fn name(&self) -> &str {
        "http"
    }

    async fn analyze(&self, transcript: &str, context: &AnalysisContext) -> Result<Analysis> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({
                "model": self.model,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": Self::user_prompt(transcript, context) },
                ],
            }))
            .send()
            .await
            .context("Failed to reach analyzer")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Analyzer error ({}): {}", status, text);
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse analyzer response")?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("Analyzer returned no content")?;

        parse_analysis(&content)
    }
}

/// Analyzer used when no API key is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct StubAnalyzer;

#[async_trait]
impl TranscriptAnalyzer for StubAnalyzer {
    fn name(&self) -> &str {
        "stub"
    }

    async fn analyze(&self, transcript: &str, context: &AnalysisContext) -> Result<Analysis> {
        Ok(Analysis::fallback(
            transcript,
            context.platform_summary.as_deref(),
        ))
    }
}

/// Pick the HTTP analyzer when a key is available, else the stub
pub fn from_settings(
    base_url: &str,
    model: &str,
    api_key: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn TranscriptAnalyzer>> {
    match api_key.filter(|k| !k.is_empty()) {
        Some(key) => Ok(Arc::new(HttpTranscriptAnalyzer::new(
            base_url, key, model, timeout,
        )?)),
        None => {
            info!("No analyzer API key configured, using stub analyzer");
            Ok(Arc::new(StubAnalyzer))
        }
    }
}
