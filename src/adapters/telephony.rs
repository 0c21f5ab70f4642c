//! Telephony platform recording feed.
//!
//! Endpoint: GET {base}/recordings?since_id=N
//! Auth: Bearer token

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::RecordingSource;
use crate::domain::Recording;

/// HTTP recording source
pub struct HttpRecordingSource {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

/// Envelope returned by the recordings endpoint
#[derive(Debug, Deserialize)]
struct RecordingsResponse {
    #[serde(default)]
    recordings: Vec<Recording>,
}

impl HttpRecordingSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build telephony HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        })
    }
}

#[async_trait]
impl RecordingSource for HttpRecordingSource {
    fn name(&self) -> &str {
        "telephony"
    }

    async fn fetch_new_recordings(&self, since_id: i64) -> Result<Vec<Recording>> {
        let url = format!("{}/recordings", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("since_id", since_id)])
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .context("Failed to reach telephony platform")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Telephony error ({}): {}", status, text);
        }

        let body: RecordingsResponse = response
            .json()
            .await
            .context("Failed to parse recordings response")?;

        let mut recordings: Vec<Recording> = body
            .recordings
            .into_iter()
            .filter(|r| r.id > since_id)
            .collect();
        recordings.sort_by_key(|r| r.id);
        Ok(recordings)
    }
}
