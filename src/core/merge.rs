//! After-hours email + voicemail pairing.
//!
//! Each half is persisted when it arrives. The second half for the same
//! phone inside the window claims the first; anything left unclaimed is
//! expired by the sweep that runs after every batch.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::domain::{phone, MergeRecord, MergeSource};
use crate::store::Store;

#[derive(Debug, Clone)]
pub enum MergeOutcome {
    /// Stored; waiting for the counterpart
    Waiting(MergeRecord),

    /// Both halves present
    Paired {
        first: MergeRecord,
        second: MergeRecord,
    },
}

pub struct MergeCoordinator {
    store: Arc<Store>,
    window: Duration,
}

impl MergeCoordinator {
    pub fn new(store: Arc<Store>, window: Duration) -> Self {
        Self { store, window }
    }

    pub fn offer(
        &self,
        tenant_id: &str,
        phone_number: &str,
        source: MergeSource,
        payload: &serde_json::Value,
    ) -> Result<MergeOutcome> {
        self.offer_at(tenant_id, phone_number, source, payload, Utc::now())
    }

    pub fn offer_at(
        &self,
        tenant_id: &str,
        phone_number: &str,
        source: MergeSource,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let digits = phone::normalize(phone_number);
        if digits.is_empty() {
            anyhow::bail!("Cannot merge on an empty phone number");
        }

        let (record, counterpart) =
            self.store
                .offer_merge(tenant_id, &digits, source, payload, now, now + self.window)?;

        match counterpart {
            Some(first) => {
                info!(tenant = tenant_id, phone = %digits, "Paired email and voicemail");
                Ok(MergeOutcome::Paired {
                    first,
                    second: record,
                })
            }
            None => {
                debug!(tenant = tenant_id, phone = %digits, source = source.as_str(), "Waiting for counterpart");
                Ok(MergeOutcome::Waiting(record))
            }
        }
    }

    /// Expire halves whose window has closed
    pub fn expire_overdue(&self, tenant_id: &str, now: DateTime<Utc>) -> Result<Vec<MergeRecord>> {
        let expired = self.store.expire_merges(tenant_id, now)?;
        if !expired.is_empty() {
            info!(tenant = tenant_id, count = expired.len(), "Expired unpaired merge records");
        }
        Ok(expired)
    }
}
