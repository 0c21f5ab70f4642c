//! Downstream dispatch: one CRM side effect per draft.
//!
//! Inbound calls get a service ticket, outbound calls a note on the
//! customer. A CRM failure or timeout queues a retry entry and leaves the
//! draft pending, so a later replay can still complete it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::subject::{compose_note, ticket_subject};
use super::wrapup::{WrapupError, WrapupManager};
use crate::adapters::{CrmClient, CrmReceipt, NoteRequest, TicketRequest};
use crate::domain::{
    Analysis, CallDirection, CallSession, Completion, MatchStatus, NewRetryEntry, RetryOperation,
    WrapupDraft,
};
use crate::store::{NewTicket, Store};

/// Target service name recorded on retry entries
pub const CRM_SERVICE: &str = "crm";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    TicketCreated { crm_ticket_id: String },
    NoteAdded { crm_note_id: String },

    /// Completed without a new side effect (existing ticket, recent ticket)
    Deduplicated { reason: String },

    /// Completed as `skipped`
    Skipped { reason: String },

    /// Left pending for a human (identity not resolved)
    AwaitingReview { match_status: MatchStatus },

    /// CRM call failed; a retry entry holds the request
    RetryQueued { retry_id: i64, error: String },

    /// Draft was already terminal
    AlreadyComplete,
}

impl DispatchOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::RetryQueued { .. })
    }
}

/// Windows the dispatcher works with
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub ticket_dedup: chrono::Duration,
    pub crm_timeout: Duration,
}

pub struct Dispatcher {
    store: Arc<Store>,
    crm: Arc<dyn CrmClient>,
    wrapups: WrapupManager,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, crm: Arc<dyn CrmClient>, settings: DispatchSettings) -> Self {
        Self {
            wrapups: WrapupManager::new(store.clone()),
            store,
            crm,
            settings,
        }
    }

    pub async fn dispatch(
        &self,
        draft: &WrapupDraft,
        session: &CallSession,
        analysis: &Analysis,
        agent_name: Option<&str>,
    ) -> Result<DispatchOutcome> {
        if draft.is_completed() {
            return Ok(DispatchOutcome::AlreadyComplete);
        }

        match draft.direction {
            CallDirection::Inbound => self.dispatch_ticket(draft, session, analysis).await,
            CallDirection::Outbound => self.dispatch_note(draft, session, analysis, agent_name).await,
        }
    }

    async fn dispatch_ticket(
        &self,
        draft: &WrapupDraft,
        session: &CallSession,
        analysis: &Analysis,
    ) -> Result<DispatchOutcome> {
        let customer_id = match (&draft.match_status, &draft.crm_customer_id) {
            (MatchStatus::Matched, Some(id)) => id.clone(),
            (status, _) => {
                return Ok(DispatchOutcome::AwaitingReview {
                    match_status: *status,
                })
            }
        };

        // (a) draft already carries a ticket id, (b) a ticket row points at the draft
        let existing = match &draft.crm_ticket_id {
            Some(id) => Some(id.clone()),
            None => self
                .store
                .ticket_for_draft(&draft.id)?
                .map(|t| t.crm_ticket_id),
        };
        if let Some(crm_ticket_id) = existing {
            self.wrapups.complete(&draft.id, &Completion::ticket(&crm_ticket_id))?;
            return Ok(DispatchOutcome::Deduplicated {
                reason: "draft_has_ticket".to_string(),
            });
        }

        // (c) same customer ticketed inside the dedup window
        let since = Utc::now() - self.settings.ticket_dedup;
        if let Some(recent) =
            self.store
                .recent_ticket_for_customer(&draft.tenant_id, &customer_id, since)?
        {
            info!(draft_id = %draft.id, customer_id = %customer_id, ticket = %recent.crm_ticket_id, "Customer ticketed recently, skipping");
            self.wrapups.complete(&draft.id, &Completion::skipped("deduped"))?;
            return Ok(DispatchOutcome::Deduplicated {
                reason: "customer_recent_ticket".to_string(),
            });
        }

        let request = TicketRequest {
            customer_id: customer_id.clone(),
            subject: ticket_subject(&analysis.summary, analysis.request_type.as_deref()),
            description: ticket_description(analysis),
            request_type: analysis.request_type.clone(),
            customer_name: draft.customer_name.clone(),
        };

        let result = self
            .with_timeout("create_ticket", self.crm.create_ticket(&request))
            .await;
        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                return self
                    .queue_retry(
                        draft,
                        RetryOperation::CreateTicket,
                        serde_json::to_value(&request)?,
                        e,
                    )
                    .map(|(retry_id, error)| DispatchOutcome::RetryQueued { retry_id, error });
            }
        };

        let inserted = self.store.insert_ticket(&NewTicket {
            tenant_id: draft.tenant_id.clone(),
            draft_id: draft.id.clone(),
            call_id: session.id.clone(),
            crm_customer_id: customer_id.clone(),
            crm_ticket_id: receipt.id.clone(),
            subject: request.subject.clone(),
        })?;
        if !inserted {
            // A concurrent dispatch recorded its ticket first; that one wins
            let existing = self
                .store
                .ticket_for_draft(&draft.id)?
                .map(|t| t.crm_ticket_id)
                .unwrap_or_else(|| receipt.id.clone());
            warn!(
                draft_id = %draft.id,
                crm_ticket_id = %receipt.id,
                existing = %existing,
                "Draft already has a ticket record; new CRM ticket is a duplicate"
            );
            match self.wrapups.complete(&draft.id, &Completion::ticket(&existing)) {
                Ok(_) | Err(WrapupError::InvalidTransition { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(DispatchOutcome::Deduplicated {
                reason: "draft_has_ticket".to_string(),
            });
        }
        self.wrapups.complete(&draft.id, &Completion::ticket(&receipt.id))?;
        if session.customer_id.is_none() {
            self.store.link_call_customer(&session.id, &customer_id, None)?;
        }

        info!(draft_id = %draft.id, crm_ticket_id = %receipt.id, subject = %request.subject, "Ticket created");
        Ok(DispatchOutcome::TicketCreated {
            crm_ticket_id: receipt.id,
        })
    }

    async fn dispatch_note(
        &self,
        draft: &WrapupDraft,
        session: &CallSession,
        analysis: &Analysis,
        agent_name: Option<&str>,
    ) -> Result<DispatchOutcome> {
        let customer_id = match (&draft.match_status, &draft.crm_customer_id) {
            (MatchStatus::Matched, Some(id)) => id.clone(),
            _ => {
                self.wrapups
                    .complete(&draft.id, &Completion::skipped("outbound_unmatched"))?;
                return Ok(DispatchOutcome::Skipped {
                    reason: "outbound_unmatched".to_string(),
                });
            }
        };

        let request = NoteRequest {
            customer_id: customer_id.clone(),
            text: compose_note(
                session.started_at,
                &analysis.summary,
                analysis.sentiment,
                agent_name,
            ),
        };

        let receipt = match self.with_timeout("add_note", self.crm.add_note(&request)).await {
            Ok(receipt) => receipt,
            Err(e) => {
                return self
                    .queue_retry(
                        draft,
                        RetryOperation::AddNote,
                        serde_json::to_value(&request)?,
                        e,
                    )
                    .map(|(retry_id, error)| DispatchOutcome::RetryQueued { retry_id, error });
            }
        };

        self.wrapups.complete(&draft.id, &Completion::note(&receipt.id))?;
        self.store
            .link_call_customer(&session.id, &customer_id, Some(&receipt.id))?;

        info!(draft_id = %draft.id, crm_note_id = %receipt.id, "Note posted");
        Ok(DispatchOutcome::NoteAdded {
            crm_note_id: receipt.id,
        })
    }

    async fn with_timeout<F>(&self, operation: &str, call: F) -> Result<CrmReceipt>
    where
        F: std::future::Future<Output = Result<CrmReceipt>>,
    {
        match tokio::time::timeout(self.settings.crm_timeout, call).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!(
                "CRM {} timed out after {}s",
                operation,
                self.settings.crm_timeout.as_secs()
            ),
        }
    }

    fn queue_retry(
        &self,
        draft: &WrapupDraft,
        operation: RetryOperation,
        payload: serde_json::Value,
        error: anyhow::Error,
    ) -> Result<(i64, String)> {
        let message = format!("{:#}", error);
        let entry = self.store.enqueue_retry(&NewRetryEntry {
            tenant_id: draft.tenant_id.clone(),
            operation,
            target_service: CRM_SERVICE.to_string(),
            payload,
            draft_id: Some(draft.id.clone()),
            call_id: Some(draft.call_id.clone()),
            last_error: message.clone(),
        })?;
        warn!(
            draft_id = %draft.id,
            operation = operation.as_str(),
            retry_id = entry.id,
            attempts = entry.attempts,
            error = %message,
            "CRM dispatch failed, queued for retry"
        );
        Ok((entry.id, message))
    }
}

/// Ticket body: summary followed by action items
fn ticket_description(analysis: &Analysis) -> String {
    let mut text = analysis.summary.trim().to_string();
    if !analysis.action_items.is_empty() {
        text.push_str("\n\nAction items:");
        for item in &analysis.action_items {
            text.push_str(&format!("\n- {}", item));
        }
    }
    text
}
