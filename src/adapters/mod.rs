//! Adapter interfaces for external systems.
//!
//! The pipeline talks to three collaborators it does not own: the telephony
//! platform (recordings), a transcript analyzer, and the CRM. Each sits
//! behind an async trait so tests can swap in in-process fakes.

pub mod alert;
pub mod analyzer;
pub mod crm;
pub mod telephony;
pub mod token;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Analysis, CallDirection, CrmCandidate, Recording};

pub use alert::{Alert, AlertSink, Alerter, WebhookSink};
pub use analyzer::{HttpTranscriptAnalyzer, StubAnalyzer};
pub use crm::{CrmError, HttpCrmClient};
pub use telephony::HttpRecordingSource;
pub use token::{CachedToken, TokenCache};

/// Pull interface to the telephony platform
#[async_trait]
pub trait RecordingSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// All recordings with id greater than `since_id`, ascending by id
    async fn fetch_new_recordings(&self, since_id: i64) -> Result<Vec<Recording>>;
}

/// Call details handed to the analyzer alongside the transcript
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisContext {
    pub direction: CallDirection,
    pub duration_secs: Option<i64>,
    pub agent_name: Option<String>,

    /// Platform summary, used by the stub analyzer
    pub platform_summary: Option<String>,
}

impl AnalysisContext {
    pub fn for_recording(recording: &Recording) -> Self {
        Self {
            direction: recording.direction,
            duration_secs: recording.duration_secs,
            agent_name: recording.agent_name.clone(),
            platform_summary: recording.summary.clone(),
        }
    }
}

/// Black-box transcript analysis (best-effort)
#[async_trait]
pub trait TranscriptAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, transcript: &str, context: &AnalysisContext) -> Result<Analysis>;
}

/// Service ticket request; also the replayable retry payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRequest {
    pub customer_id: String,
    pub subject: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
}

/// Note request; also the replayable retry payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRequest {
    pub customer_id: String,
    pub text: String,
}

/// Identifier of a record the CRM created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrmReceipt {
    pub id: String,
}

/// The CRM boundary
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn create_ticket(&self, request: &TicketRequest) -> Result<CrmReceipt>;

    async fn add_note(&self, request: &NoteRequest) -> Result<CrmReceipt>;

    async fn find_customers_by_phone(&self, phone: &str) -> Result<Vec<CrmCandidate>>;
}
