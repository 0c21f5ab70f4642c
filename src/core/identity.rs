//! CRM identity resolution for a call.
//!
//! Sources, in order: the customer already linked to the session, the local
//! directory, then a live CRM phone lookup. Candidates are ranked by
//! confidence: a phone match is the base, agreement with the analyzer's
//! extracted name and email raises it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::adapters::CrmClient;
use crate::domain::{phone, CallSession, CrmCandidate, ExtractedEntities, MatchStatus, MatchSuggestion};
use crate::store::Store;

const PHONE_CONFIDENCE: f64 = 0.6;
const NAME_BONUS: f64 = 0.3;
const EMAIL_BONUS: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    Matched(CrmCandidate),

    /// Several candidates, highest confidence first
    Ambiguous(Vec<CrmCandidate>),

    Unmatched,
}

impl Identity {
    pub fn match_status(&self) -> MatchStatus {
        match self {
            Self::Matched(_) => MatchStatus::Matched,
            Self::Ambiguous(_) => MatchStatus::MultipleMatches,
            Self::Unmatched => MatchStatus::Unmatched,
        }
    }

    pub fn customer(&self) -> Option<&CrmCandidate> {
        match self {
            Self::Matched(c) => Some(c),
            _ => None,
        }
    }

    /// Any CRM record at all was found for the caller
    pub fn has_candidates(&self) -> bool {
        !matches!(self, Self::Unmatched)
    }

    pub fn suggestions(&self) -> Vec<MatchSuggestion> {
        match self {
            Self::Ambiguous(candidates) => candidates
                .iter()
                .map(|c| MatchSuggestion {
                    crm_customer_id: c.crm_id.clone(),
                    name: c.name.clone(),
                    phone: c.phone.clone(),
                    confidence: c.confidence,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub struct IdentityResolver {
    store: Arc<Store>,
    crm: Option<Arc<dyn CrmClient>>,
    crm_timeout: Duration,
}

impl IdentityResolver {
    pub fn new(store: Arc<Store>, crm: Option<Arc<dyn CrmClient>>, crm_timeout: Duration) -> Self {
        Self {
            store,
            crm,
            crm_timeout,
        }
    }

    pub async fn resolve(
        &self,
        tenant_id: &str,
        session: &CallSession,
        entities: &ExtractedEntities,
    ) -> Result<Identity> {
        if let Some(crm_id) = &session.customer_id {
            let candidate = match self.store.get_customer_by_crm_id(tenant_id, crm_id)? {
                Some(customer) => CrmCandidate::from(&customer),
                None => CrmCandidate {
                    crm_id: crm_id.clone(),
                    name: None,
                    phone: None,
                    email: None,
                    confidence: 1.0,
                },
            };
            return Ok(Identity::Matched(candidate));
        }

        let phone_number = session.customer_number();
        let mut candidates: Vec<CrmCandidate> = self
            .store
            .find_customers_by_phone(tenant_id, phone_number)?
            .iter()
            .map(CrmCandidate::from)
            .collect();

        if candidates.is_empty() {
            candidates = self.lookup_crm(tenant_id, phone_number).await;
        }

        Ok(rank(candidates, entities))
    }

    /// Live CRM lookup; failures degrade to no candidates
    async fn lookup_crm(&self, tenant_id: &str, phone_number: &str) -> Vec<CrmCandidate> {
        let Some(crm) = &self.crm else {
            return Vec::new();
        };
        let Some(key) = phone::match_key(phone_number) else {
            debug!(tenant = tenant_id, "Caller number too short for CRM lookup");
            return Vec::new();
        };

        match tokio::time::timeout(self.crm_timeout, crm.find_customers_by_phone(&key)).await {
            Ok(Ok(found)) => {
                debug!(tenant = tenant_id, count = found.len(), "CRM phone lookup");
                for c in &found {
                    if let Err(e) = self.store.upsert_customer(
                        tenant_id,
                        &c.crm_id,
                        c.name.as_deref(),
                        c.phone.as_deref(),
                        c.email.as_deref(),
                    ) {
                        warn!(tenant = tenant_id, crm_id = %c.crm_id, error = %e, "Failed to cache CRM customer");
                    }
                }
                found
            }
            Ok(Err(e)) => {
                warn!(tenant = tenant_id, error = %e, "CRM phone lookup failed");
                Vec::new()
            }
            Err(_) => {
                warn!(tenant = tenant_id, "CRM phone lookup timed out");
                Vec::new()
            }
        }
    }
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn names_agree(candidate: &str, extracted: &str) -> bool {
    let (a, b) = (normalize_text(candidate), normalize_text(extracted));
    !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a))
}

/// Score, dedupe and order candidates
fn rank(candidates: Vec<CrmCandidate>, entities: &ExtractedEntities) -> Identity {
    let mut scored: Vec<CrmCandidate> = Vec::with_capacity(candidates.len());
    for mut c in candidates {
        if scored.iter().any(|s| s.crm_id == c.crm_id) {
            continue;
        }
        let mut confidence = PHONE_CONFIDENCE;
        if let (Some(name), Some(extracted)) = (&c.name, &entities.customer_name) {
            if names_agree(name, extracted) {
                confidence += NAME_BONUS;
            }
        }
        if let (Some(email), Some(extracted)) = (&c.email, &entities.customer_email) {
            if email.eq_ignore_ascii_case(extracted.trim()) {
                confidence += EMAIL_BONUS;
            }
        }
        c.confidence = confidence.min(1.0);
        scored.push(c);
    }

    scored.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.crm_id.cmp(&b.crm_id))
    });

    match scored.len() {
        0 => Identity::Unmatched,
        1 => Identity::Matched(scored.remove(0)),
        _ => Identity::Ambiguous(scored),
    }
}
