//! CRM REST client.
//!
//! Auth: username/password login for a short-lived bearer token, cached in a
//! [`TokenCache`]. Every response carries an explicit `success` flag; a
//! `success: false` body is an error even on HTTP 200.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::token::{CachedToken, TokenCache};
use super::{CrmClient, CrmReceipt, NoteRequest, TicketRequest};
use crate::domain::CrmCandidate;

/// Errors surfaced by the CRM
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("CRM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("CRM rejected request: {0}")]
    Rejected(String),

    #[error("CRM authentication failed: {0}")]
    Auth(String),
}

/// Common response envelope
#[derive(Debug, Deserialize)]
struct CrmResponse {
    success: bool,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    customers: Vec<CrmCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    success: bool,
    #[serde(default)]
    token: Option<String>,
    /// Epoch milliseconds
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

impl CrmResponse {
    fn into_checked(self) -> Result<Self, CrmError> {
        if self.success {
            Ok(self)
        } else {
            Err(CrmError::Rejected(
                self.message.clone().unwrap_or_else(|| "no message".to_string()),
            ))
        }
    }

    fn receipt(&self) -> Result<CrmReceipt, CrmError> {
        let id = match &self.id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => return Err(CrmError::Rejected("response carried no id".to_string())),
        };
        Ok(CrmReceipt { id })
    }
}

/// CRM client over HTTP
pub struct HttpCrmClient {
    base_url: String,
    username: String,
    password: String,
    tokens: TokenCache,
    client: reqwest::Client,
}

impl HttpCrmClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build CRM HTTP client")?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            tokens: TokenCache::default(),
            client,
        })
    }

    async fn login(&self) -> Result<CachedToken> {
        debug!("Logging in to CRM");
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&serde_json::json!({
                "username": self.username,
                "password": self.password,
            }))
            .send()
            .await
            .context("Failed to reach CRM login")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(CrmError::Auth(format!("{}: {}", status, text)).into());
        }

        let body: LoginResponse = response.json().await.context("Failed to parse CRM login")?;
        match (body.success, body.token) {
            (true, Some(token)) => {
                let expires_at = body
                    .expires_at
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                    .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));
                Ok(CachedToken {
                    value: token,
                    expires_at,
                })
            }
            _ => Err(CrmError::Auth(body.message.unwrap_or_else(|| "login refused".to_string())).into()),
        }
    }

    /// Send an authenticated request; on 401 drop the token and retry once
    async fn send<F>(&self, build: F) -> Result<CrmResponse>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let mut retried = false;
        loop {
            let token = self.tokens.get_or_refresh(|| self.login()).await?;
            let response = build(&token)
                .send()
                .await
                .context("Failed to reach CRM")?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED && !retried {
                warn!("CRM token rejected, re-authenticating");
                self.tokens.invalidate().await;
                retried = true;
                continue;
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(CrmError::Api {
                    status: status.as_u16(),
                    message,
                }
                .into());
            }

            let body: CrmResponse = response.json().await.context("Failed to parse CRM response")?;
            return Ok(body.into_checked()?);
        }
    }
}

#[async_trait]
impl CrmClient for HttpCrmClient {
    async fn create_ticket(&self, request: &TicketRequest) -> Result<CrmReceipt> {
        let url = format!("{}/service-tickets", self.base_url);
        let body = self
            .send(|token| self.client.post(&url).bearer_auth(token).json(request))
            .await?;
        Ok(body.receipt()?)
    }

    async fn add_note(&self, request: &NoteRequest) -> Result<CrmReceipt> {
        let url = format!("{}/customers/{}/notes", self.base_url, request.customer_id);
        let body = self
            .send(|token| {
                self.client
                    .post(&url)
                    .bearer_auth(token)
                    .json(&serde_json::json!({ "text": request.text }))
            })
            .await?;
        Ok(body.receipt()?)
    }

    async fn find_customers_by_phone(&self, phone: &str) -> Result<Vec<CrmCandidate>> {
        let url = format!("{}/customers/search", self.base_url);
        let body = self
            .send(|token| self.client.get(&url).bearer_auth(token).query(&[("phone", phone)]))
            .await?;
        Ok(body.customers)
    }
}
