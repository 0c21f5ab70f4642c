//! Call session matcher.
//!
//! Resolves a recording to a call session with an ordered cascade, stopping
//! at the first hit:
//! 1. Recording id already linked: already processed
//! 2. Customer phone (last 10 digits) inside the time window, agent-assigned first
//! 3. Extension inside the time window
//! 4. Nothing: create a session from the recording itself
//!
//! Steps 2 and 3 only consider sessions with no recording linked yet, and
//! the link itself is a conditional update, so a session is never claimed
//! twice.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, info};

use crate::domain::{phone, CallSession, CallStatus, NewCallSession, Recording};
use crate::store::{RecordingLink, Store};

/// Which cascade step produced the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Phone,
    Extension,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Extension => "extension",
        }
    }
}

#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// The recording is already linked; nothing to do
    AlreadyProcessed(CallSession),

    /// An existing session now carries the recording
    Linked {
        session: CallSession,
        strategy: MatchStrategy,
    },

    /// No session existed; one was created from the recording
    Created(CallSession),
}

impl MatchOutcome {
    pub fn session(&self) -> &CallSession {
        match self {
            Self::AlreadyProcessed(s) | Self::Created(s) => s,
            Self::Linked { session, .. } => session,
        }
    }
}

pub struct CallMatcher {
    store: Arc<Store>,
    window: Duration,
}

impl CallMatcher {
    pub fn new(store: Arc<Store>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn resolve(&self, tenant_id: &str, recording: &Recording) -> Result<MatchOutcome> {
        if let Some(existing) = self.store.find_call_by_recording(tenant_id, recording.id)? {
            debug!(recording_id = recording.id, call_id = %existing.id, "Recording already linked");
            return Ok(MatchOutcome::AlreadyProcessed(existing));
        }

        let agent_id = match &recording.extension {
            Some(ext) => self
                .store
                .find_agent_by_extension(tenant_id, ext)?
                .map(|a| a.id),
            None => None,
        };
        let link = RecordingLink {
            recording_id: recording.id,
            ended_at: recording.ended_at(),
            duration_secs: recording.duration_secs,
            transcript: recording.transcript.clone(),
            extension: recording.extension.clone(),
            agent_id: agent_id.clone(),
        };

        let digits = phone::normalize(recording.customer_number());
        if !digits.is_empty() {
            let candidates =
                self.store
                    .find_calls_by_phone(tenant_id, &digits, recording.started_at, self.window)?;
            if let Some(session) = self.claim(candidates, &link)? {
                return Ok(MatchOutcome::Linked {
                    session,
                    strategy: MatchStrategy::Phone,
                });
            }
        }

        if let Some(ext) = &recording.extension {
            let candidates =
                self.store
                    .find_calls_by_extension(tenant_id, ext, recording.started_at, self.window)?;
            if let Some(session) = self.claim(candidates, &link)? {
                return Ok(MatchOutcome::Linked {
                    session,
                    strategy: MatchStrategy::Extension,
                });
            }
        }

        self.create(tenant_id, recording, agent_id)
    }

    /// Link the first candidate that is still unclaimed
    fn claim(&self, candidates: Vec<CallSession>, link: &RecordingLink) -> Result<Option<CallSession>> {
        for candidate in candidates {
            if self.store.link_recording(&candidate.id, link)? {
                let session = self
                    .store
                    .get_call(&candidate.id)?
                    .with_context(|| format!("Call {} vanished after linking", candidate.id))?;
                return Ok(Some(session));
            }
        }
        Ok(None)
    }

    fn create(
        &self,
        tenant_id: &str,
        recording: &Recording,
        agent_id: Option<String>,
    ) -> Result<MatchOutcome> {
        // Best effort: only an unambiguous local customer is attached here
        let customers = self
            .store
            .find_customers_by_phone(tenant_id, recording.customer_number())?;
        let customer_id = match customers.as_slice() {
            [only] => Some(only.crm_id.clone()),
            _ => None,
        };

        let new = NewCallSession {
            tenant_id: tenant_id.to_string(),
            direction: recording.direction,
            from_number: recording.from_number.clone(),
            to_number: recording.to_number.clone(),
            extension: recording.extension.clone(),
            agent_id,
            customer_id,
            recording_id: Some(recording.id),
            status: CallStatus::Completed,
            started_at: recording.started_at,
            ended_at: recording.ended_at(),
            duration_secs: recording.duration_secs,
            transcript: recording.transcript.clone(),
        };

        match self.store.insert_call(&new)? {
            Some(session) => {
                info!(recording_id = recording.id, call_id = %session.id, "Created call session from recording");
                Ok(MatchOutcome::Created(session))
            }
            None => {
                // Lost a race with another invocation inserting the same recording
                let existing = self
                    .store
                    .find_call_by_recording(tenant_id, recording.id)?
                    .with_context(|| format!("Recording {} conflict without a session", recording.id))?;
                Ok(MatchOutcome::AlreadyProcessed(existing))
            }
        }
    }
}
