//! Per-recording processing.
//!
//! internal filter → match → analyze → identity → classify → draft → dispatch

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::classifier::{VoidInput, VoidRules};
use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::identity::{Identity, IdentityResolver};
use super::matcher::{CallMatcher, MatchOutcome};
use super::wrapup::WrapupManager;
use crate::adapters::{AnalysisContext, TranscriptAnalyzer};
use crate::domain::{Analysis, CallSession, Recording, VoidReason};
use crate::store::{DraftSeed, Store};

/// What happened to one recording
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Both legs internal; no session, no draft
    Internal,

    AlreadyProcessed { call_id: String },

    Voided {
        call_id: String,
        draft_id: String,
        reason: VoidReason,
    },

    Dispatched {
        call_id: String,
        draft_id: String,
        dispatch: DispatchOutcome,
    },
}

impl ProcessOutcome {
    /// Counts toward the batch error total
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Dispatched { dispatch, .. } if dispatch.is_failure())
    }
}

pub struct RecordingProcessor {
    store: Arc<Store>,
    analyzer: Arc<dyn TranscriptAnalyzer>,
    analyzer_timeout: Duration,
    matcher: CallMatcher,
    identity: IdentityResolver,
    rules: VoidRules,
    wrapups: WrapupManager,
    dispatcher: Dispatcher,
}

impl RecordingProcessor {
    pub fn new(
        store: Arc<Store>,
        analyzer: Arc<dyn TranscriptAnalyzer>,
        analyzer_timeout: Duration,
        matcher: CallMatcher,
        identity: IdentityResolver,
        rules: VoidRules,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            wrapups: WrapupManager::new(store.clone()),
            store,
            analyzer,
            analyzer_timeout,
            matcher,
            identity,
            rules,
            dispatcher,
        }
    }

    #[instrument(skip(self, recording), fields(recording_id = recording.id))]
    pub async fn process(&self, tenant_id: &str, recording: &Recording) -> Result<ProcessOutcome> {
        if recording.is_internal() {
            debug!("Internal call, ignoring");
            return Ok(ProcessOutcome::Internal);
        }

        let session = match self.matcher.resolve(tenant_id, recording)? {
            MatchOutcome::AlreadyProcessed(session) => {
                return Ok(ProcessOutcome::AlreadyProcessed {
                    call_id: session.id,
                })
            }
            MatchOutcome::Linked { session, strategy } => {
                debug!(call_id = %session.id, strategy = strategy.as_str(), "Matched existing session");
                session
            }
            MatchOutcome::Created(session) => session,
        };

        let analysis = self.analyze(recording).await;
        self.store.attach_analysis(&session.id, &analysis)?;

        let identity = self
            .identity
            .resolve(tenant_id, &session, &analysis.entities)
            .await?;
        if let (Some(customer), None) = (identity.customer(), &session.customer_id) {
            self.store
                .link_call_customer(&session.id, &customer.crm_id, None)?;
        }

        let void_reason = self.rules.classify(&VoidInput {
            duration_secs: recording.duration_secs,
            transcript: recording.transcript_text(),
            summary: &analysis.summary,
            is_hangup: analysis.is_hangup,
            from_number: &recording.from_number,
            to_number: &recording.to_number,
            has_crm_match: identity.has_candidates(),
        });

        let seed = draft_seed(tenant_id, &session, recording, &analysis, &identity, void_reason);
        let draft = self.wrapups.open(&seed, &identity.suggestions())?;

        if let Some(reason) = void_reason {
            return Ok(ProcessOutcome::Voided {
                call_id: session.id,
                draft_id: draft.id,
                reason,
            });
        }

        let agent_name = self.agent_name(recording, &session)?;
        let dispatch = self
            .dispatcher
            .dispatch(&draft, &session, &analysis, agent_name.as_deref())
            .await?;

        info!(call_id = %session.id, draft_id = %draft.id, ?dispatch, "Recording processed");
        Ok(ProcessOutcome::Dispatched {
            call_id: session.id,
            draft_id: draft.id,
            dispatch,
        })
    }

    /// Analyzer output, or the fallback when it is missing, slow or failing
    async fn analyze(&self, recording: &Recording) -> Analysis {
        let transcript = recording.transcript_text();
        let fallback = || Analysis::fallback(transcript, recording.summary.as_deref());
        if transcript.trim().is_empty() {
            return fallback();
        }

        let context = AnalysisContext::for_recording(recording);
        match tokio::time::timeout(
            self.analyzer_timeout,
            self.analyzer.analyze(transcript, &context),
        )
        .await
        {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                warn!(analyzer = self.analyzer.name(), error = %e, "Analyzer failed, using fallback");
                fallback()
            }
            Err(_) => {
                warn!(analyzer = self.analyzer.name(), "Analyzer timed out, using fallback");
                fallback()
            }
        }
    }

    fn agent_name(&self, recording: &Recording, session: &CallSession) -> Result<Option<String>> {
        if let Some(name) = &recording.agent_name {
            return Ok(Some(name.clone()));
        }
        match &session.agent_id {
            Some(id) => Ok(self.store.get_agent(id)?.map(|a| a.name)),
            None => Ok(None),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn draft_seed(
    tenant_id: &str,
    session: &CallSession,
    recording: &Recording,
    analysis: &Analysis,
    identity: &Identity,
    void_reason: Option<VoidReason>,
) -> DraftSeed {
    let customer = identity.customer();
    let entities = &analysis.entities;
    DraftSeed {
        tenant_id: tenant_id.to_string(),
        call_id: session.id.clone(),
        direction: session.direction,
        match_status: identity.match_status(),
        crm_customer_id: customer.map(|c| c.crm_id.clone()),
        customer_name: entities
            .customer_name
            .clone()
            .or_else(|| customer.and_then(|c| c.name.clone())),
        customer_phone: entities
            .customer_phone
            .clone()
            .or_else(|| non_empty(recording.customer_number())),
        customer_email: entities
            .customer_email
            .clone()
            .or_else(|| customer.and_then(|c| c.email.clone())),
        summary: non_empty(&analysis.summary),
        request_type: analysis.request_type.clone(),
        void_reason,
    }
}
