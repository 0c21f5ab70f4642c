//! Operator alerts.
//!
//! Alerts always go to the log at `error`. When a sink is configured they
//! are also delivered there, bounded by a timeout so a slow receiver cannot
//! stall the batch that raised them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, warn};

/// Delivery budget when none is configured
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One alert as delivered to a sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub tenant: String,
    pub title: String,
    pub details: Vec<String>,
}

/// Where alerts are delivered besides the log
#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

pub struct Alerter {
    sink: Option<Arc<dyn AlertSink>>,
    timeout: Duration,
}

impl Default for Alerter {
    fn default() -> Self {
        Self {
            sink: None,
            timeout: DEFAULT_DELIVERY_TIMEOUT,
        }
    }
}

impl Alerter {
    /// Log-only alerter
    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn with_sink(sink: Arc<dyn AlertSink>, timeout: Duration) -> Self {
        Self {
            sink: Some(sink),
            timeout,
        }
    }

    pub fn with_webhook(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let sink = WebhookSink::new(endpoint, token, timeout)?;
        Ok(Self::with_sink(Arc::new(sink), timeout))
    }

    /// Raise an alert. Delivery failures and timeouts are logged and swallowed.
    pub async fn send(&self, tenant: &str, title: &str, details: &[String]) {
        error!(tenant, alert = title, details = ?details, "ALERT");

        let Some(sink) = &self.sink else {
            return;
        };
        let alert = Alert {
            tenant: tenant.to_string(),
            title: title.to_string(),
            details: details.to_vec(),
        };
        match tokio::time::timeout(self.timeout, sink.deliver(&alert)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(tenant, sink = sink.name(), error = %e, "Failed to deliver alert"),
            Err(_) => warn!(
                tenant,
                sink = sink.name(),
                timeout_secs = self.timeout.as_secs_f64(),
                "Alert delivery timed out"
            ),
        }
    }
}

/// POSTs alerts as JSON with an optional bearer token
pub struct WebhookSink {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build alert HTTP client")?;
        Ok(Self {
            endpoint: endpoint.into(),
            token,
            client,
        })
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(alert);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.context("Failed to send alert")?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Alert webhook error ({}): {}", status, text)
        }
    }
}
