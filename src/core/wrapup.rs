//! Wrapup draft lifecycle.
//!
//! ```text
//! (create) ──> pending_review ──> completed
//!    └───────── voided ─────────────^
//! ```
//!
//! `completed` is terminal. Creation is an upsert on the call, so a retried
//! invocation refreshes the draft instead of opening a second one.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::domain::{Completion, DraftStatus, MatchSuggestion, WrapupDraft};
use crate::store::{DraftSeed, Store};

#[derive(Debug, Error)]
pub enum WrapupError {
    #[error("Draft not found: {0}")]
    NotFound(String),

    #[error("Invalid state transition: {from:?} → {to:?}")]
    InvalidTransition { from: DraftStatus, to: DraftStatus },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub struct WrapupManager {
    store: Arc<Store>,
}

impl WrapupManager {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Create or refresh the draft for a call
    pub fn open(&self, seed: &DraftSeed, suggestions: &[MatchSuggestion]) -> Result<WrapupDraft, WrapupError> {
        let draft = self.store.upsert_draft(seed)?;

        if draft.status == DraftStatus::PendingReview {
            self.store.replace_suggestions(&draft.id, suggestions)?;
        }

        match draft.void_reason {
            Some(reason) if draft.auto_voided => {
                info!(call_id = %seed.call_id, draft_id = %draft.id, %reason, "Call auto-voided");
            }
            _ => {
                debug!(call_id = %seed.call_id, draft_id = %draft.id, status = draft.status.as_str(), "Draft opened");
            }
        }
        Ok(draft)
    }

    /// Move a pending draft to `completed`
    pub fn complete(&self, draft_id: &str, completion: &Completion) -> Result<WrapupDraft, WrapupError> {
        let current = self
            .store
            .get_draft(draft_id)?
            .ok_or_else(|| WrapupError::NotFound(draft_id.to_string()))?;

        if current.status == DraftStatus::Completed
            || !self.store.complete_draft(draft_id, completion)?
        {
            return Err(WrapupError::InvalidTransition {
                from: DraftStatus::Completed,
                to: DraftStatus::Completed,
            });
        }

        debug!(draft_id, action = completion.action.as_str(), "Draft completed");
        self.store
            .get_draft(draft_id)?
            .ok_or_else(|| WrapupError::NotFound(draft_id.to_string()))
    }

    /// The human review queue
    pub fn pending(&self, tenant_id: &str, limit: usize) -> Result<Vec<WrapupDraft>, WrapupError> {
        Ok(self.store.list_pending_drafts(tenant_id, limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CallDirection, CompletionAction, MatchStatus, NewCallSession, VoidReason};
    use chrono::Utc;

    fn setup() -> (WrapupManager, DraftSeed) {
        let store = Arc::new(Store::in_memory().unwrap());
        let call = store
            .insert_call(&NewCallSession::ringing(
                "t1",
                CallDirection::Inbound,
                "5551234567",
                "101",
                Utc::now(),
            ))
            .unwrap()
            .unwrap();
        let seed = DraftSeed {
            tenant_id: "t1".to_string(),
            call_id: call.id,
            direction: CallDirection::Inbound,
            match_status: MatchStatus::MultipleMatches,
            crm_customer_id: None,
            customer_name: None,
            customer_phone: None,
            customer_email: None,
            summary: Some("Quote request".to_string()),
            request_type: Some("quote".to_string()),
            void_reason: None,
        };
        (WrapupManager::new(store), seed)
    }

    #[test]
    fn test_open_twice_is_one_draft() {
        let (manager, seed) = setup();
        let a = manager.open(&seed, &[]).unwrap();
        let b = manager.open(&seed, &[]).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(manager.pending("t1", 10).unwrap().len(), 1);
    }

    #[test]
    fn test_complete_is_terminal() {
        let (manager, seed) = setup();
        let draft = manager.open(&seed, &[]).unwrap();

        let done = manager.complete(&draft.id, &Completion::skipped("deduped")).unwrap();
        assert_eq!(done.completion_action, Some(CompletionAction::Skipped));
        assert_eq!(done.completion_reason.as_deref(), Some("deduped"));

        let err = manager.complete(&draft.id, &Completion::ticket("T-1")).unwrap_err();
        assert!(matches!(err, WrapupError::InvalidTransition { .. }));
        assert!(manager.pending("t1", 10).unwrap().is_empty());
    }

    #[test]
    fn test_voided_draft_skips_review() {
        let (manager, mut seed) = setup();
        seed.void_reason = Some(VoidReason::Hangup);
        let draft = manager.open(&seed, &[]).unwrap();
        assert!(draft.is_completed());
        assert!(manager.pending("t1", 10).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_draft() {
        let (manager, _) = setup();
        let err = manager.complete("nope", &Completion::note("N-1")).unwrap_err();
        assert!(matches!(err, WrapupError::NotFound(ref id) if id == "nope"));
    }
}
