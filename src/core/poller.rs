//! Batch poller for one tenant.
//!
//! Coordinates the processing lock, recording fetch, per-recording timeouts,
//! incremental watermark advancement, post-batch sweeps and alerting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use super::cleanup::sweep_stale_calls;
use super::health::HealthReport;
use super::limits::{LimitViolation, PollerLimits};
use super::merge::MergeCoordinator;
use super::processor::{ProcessOutcome, RecordingProcessor};
use crate::adapters::{Alerter, RecordingSource};
use crate::domain::Recording;
use crate::ingest::Readiness;
use crate::store::Store;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Recording fetch failed: {0}")]
    Fetch(String),

    #[error("Recording {recording_id} timed out after {seconds}s")]
    ItemTimeout { recording_id: i64, seconds: u64 },

    #[error("Processing task failed: {0}")]
    Task(String),

    #[error("Invalid limits: {0}")]
    Limits(#[from] LimitViolation),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Why a batch did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another invocation holds a fresh lock
    LockHeld,

    /// Lost the conditional update to a concurrent invocation
    LockRace,
}

/// Summary of one batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub tenant: String,
    pub skipped: bool,
    pub skip_reason: Option<SkipReason>,
    pub took_over_stale_lock: bool,

    pub fetched: usize,
    pub processed: usize,
    pub already_processed: usize,
    pub voided: usize,
    pub internal: usize,

    /// Waiting for transcription; watermark held
    pub deferred: usize,

    /// Never transcribable or waited too long
    pub ignored: usize,

    pub errors: usize,
    pub error_samples: Vec<String>,

    pub watermark_before: i64,
    pub watermark_after: i64,

    pub stale_calls_closed: usize,
    pub merges_expired: usize,
}

impl BatchReport {
    fn skipped(tenant: &str, reason: SkipReason, watermark: i64) -> Self {
        Self {
            tenant: tenant.to_string(),
            skipped: true,
            skip_reason: Some(reason),
            watermark_before: watermark,
            watermark_after: watermark,
            ..Default::default()
        }
    }

    fn record_error(&mut self, message: String, sample_size: usize) {
        self.errors += 1;
        if self.error_samples.len() < sample_size {
            self.error_samples.push(message);
        }
    }
}

/// Clears the lock this batch took, on every exit path
struct LockGuard<'a> {
    store: &'a Store,
    tenant: &'a str,
    acquired_at: DateTime<Utc>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self.store.release_lock(self.tenant, self.acquired_at) {
            Ok(true) => debug!(tenant = self.tenant, "Processing lock released"),
            Ok(false) => warn!(tenant = self.tenant, "Processing lock was taken over before release"),
            Err(e) => error!(tenant = self.tenant, error = %e, "Failed to release processing lock"),
        }
    }
}

pub struct Poller {
    tenant: String,
    store: Arc<Store>,
    source: Arc<dyn RecordingSource>,
    processor: Arc<RecordingProcessor>,
    merges: MergeCoordinator,
    alerter: Arc<Alerter>,
    limits: PollerLimits,
}

impl Poller {
    pub fn new(
        tenant: impl Into<String>,
        store: Arc<Store>,
        source: Arc<dyn RecordingSource>,
        processor: Arc<RecordingProcessor>,
        alerter: Arc<Alerter>,
        limits: PollerLimits,
    ) -> Result<Self, PollError> {
        limits.validate()?;
        Ok(Self {
            tenant: tenant.into(),
            merges: MergeCoordinator::new(store.clone(), limits.merge_window()),
            store,
            source,
            processor,
            alerter,
            limits,
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Run one batch
    #[instrument(skip(self), fields(tenant = %self.tenant))]
    pub async fn run_batch(&self) -> Result<BatchReport, PollError> {
        let now = Utc::now();
        let cursor = self.store.ensure_cursor(&self.tenant)?;

        if cursor.is_locked_within(now, self.limits.lock_active()) {
            info!(lock_age_secs = ?cursor.lock_age(now).map(|a| a.num_seconds()), "Previous batch still running, skipping");
            return Ok(BatchReport::skipped(&self.tenant, SkipReason::LockHeld, cursor.last_recording_id));
        }

        let took_over = cursor
            .lock_age(now)
            .map(|age| age > self.limits.lock_stale())
            .unwrap_or(false);

        if !self
            .store
            .try_acquire_lock(&self.tenant, now, now - self.limits.lock_active())?
        {
            info!("Lock taken by a concurrent batch, skipping");
            return Ok(BatchReport::skipped(&self.tenant, SkipReason::LockRace, cursor.last_recording_id));
        }
        if took_over {
            warn!(
                lock_age_secs = ?cursor.lock_age(now).map(|a| a.num_seconds()),
                "Took over stale processing lock from an abandoned batch"
            );
        }
        let _guard = LockGuard {
            store: &self.store,
            tenant: &self.tenant,
            acquired_at: now,
        };

        let mut report = BatchReport {
            tenant: self.tenant.clone(),
            took_over_stale_lock: took_over,
            watermark_before: cursor.last_recording_id,
            watermark_after: cursor.last_recording_id,
            ..Default::default()
        };

        let recordings = match self.fetch(cursor.last_recording_id).await {
            Ok(recordings) => recordings,
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Recording fetch failed");
                let streak = self.store.record_poll_failure(&self.tenant, &message)?;
                self.alert_if_unhealthy(streak).await?;
                return Err(e);
            }
        };
        report.fetched = recordings.len();

        // Once a recording is waiting on transcription the watermark stays put
        let mut hold_watermark = false;

        for recording in recordings {
            let readiness =
                Readiness::classify(&recording, Utc::now(), self.limits.transcription_wait());
            hold_watermark |= !readiness.advances_watermark();
            match readiness {
                Readiness::Waiting => {
                    debug!(recording_id = recording.id, "Transcript pending, will retry");
                    report.deferred += 1;
                }
                Readiness::NeverTranscribable | Readiness::Abandoned => {
                    debug!(recording_id = recording.id, readiness = readiness.as_str(), "Skipping recording");
                    report.ignored += 1;
                }
                Readiness::Ready => match self.process_with_timeout(&recording).await {
                    Ok(outcome) => self.tally(&mut report, &recording, outcome),
                    Err(e) => {
                        warn!(recording_id = recording.id, error = %e, "Recording failed");
                        report.record_error(
                            format!("recording {}: {}", recording.id, e),
                            self.limits.error_sample_size,
                        );
                    }
                },
            }

            if !hold_watermark {
                report.watermark_after = self.store.advance_watermark(&self.tenant, recording.id)?;
            }
        }

        self.after_batch(&mut report);
        self.store.record_poll_success(&self.tenant, Utc::now())?;

        if report.errors >= self.limits.alert_error_threshold as usize {
            self.alerter
                .send(
                    &self.tenant,
                    &format!("{} errors in poll batch", report.errors),
                    &report.error_samples,
                )
                .await;
        }

        info!(
            fetched = report.fetched,
            processed = report.processed,
            voided = report.voided,
            deferred = report.deferred,
            errors = report.errors,
            watermark = report.watermark_after,
            "Batch complete"
        );
        Ok(report)
    }

    async fn fetch(&self, since_id: i64) -> Result<Vec<Recording>, PollError> {
        match tokio::time::timeout(
            self.limits.fetch_timeout(),
            self.source.fetch_new_recordings(since_id),
        )
        .await
        {
            Ok(Ok(mut recordings)) => {
                recordings.sort_by_key(|r| r.id);
                Ok(recordings)
            }
            Ok(Err(e)) => Err(PollError::Fetch(format!("{}: {:#}", self.source.name(), e))),
            Err(_) => Err(PollError::Fetch(format!(
                "{}: timed out after {}s",
                self.source.name(),
                self.limits.fetch_timeout_seconds
            ))),
        }
    }

    /// Run one recording on its own task under the item timeout.
    ///
    /// A timeout stops waiting but does not cancel the task; the uniqueness
    /// constraints make a late finish harmless.
    async fn process_with_timeout(&self, recording: &Recording) -> Result<ProcessOutcome, PollError> {
        let processor = self.processor.clone();
        let tenant = self.tenant.clone();
        let owned = recording.clone();
        let handle = tokio::spawn(async move { processor.process(&tenant, &owned).await });

        match tokio::time::timeout(self.limits.item_timeout(), handle).await {
            Ok(Ok(result)) => result.map_err(PollError::Store),
            Ok(Err(join_error)) => Err(PollError::Task(join_error.to_string())),
            Err(_) => Err(PollError::ItemTimeout {
                recording_id: recording.id,
                seconds: self.limits.item_timeout_seconds,
            }),
        }
    }

    fn tally(&self, report: &mut BatchReport, recording: &Recording, outcome: ProcessOutcome) {
        if outcome.is_failure() {
            report.record_error(
                format!("recording {}: downstream dispatch queued for retry", recording.id),
                self.limits.error_sample_size,
            );
        }
        match outcome {
            ProcessOutcome::Internal => report.internal += 1,
            ProcessOutcome::AlreadyProcessed { .. } => report.already_processed += 1,
            ProcessOutcome::Voided { .. } => report.voided += 1,
            ProcessOutcome::Dispatched { .. } => report.processed += 1,
        }
    }

    /// Sweeps that run once per batch; failures are logged, not fatal
    fn after_batch(&self, report: &mut BatchReport) {
        let now = Utc::now();
        match sweep_stale_calls(
            &self.store,
            &self.tenant,
            self.limits.stale_call(),
            self.limits.stale_call_batch,
            now,
        ) {
            Ok(closed) => report.stale_calls_closed = closed,
            Err(e) => warn!(error = %e, "Stale-call sweep failed"),
        }
        match self.merges.expire_overdue(&self.tenant, now) {
            Ok(expired) => report.merges_expired = expired.len(),
            Err(e) => warn!(error = %e, "Merge expiry sweep failed"),
        }
    }

    async fn alert_if_unhealthy(&self, streak: u32) -> Result<(), PollError> {
        let health = HealthReport::collect(&self.store, &self.tenant, &self.limits, Utc::now())?;
        if health.alert {
            let details = vec![
                format!("consecutive errors: {}", streak),
                format!(
                    "last successful poll: {}",
                    health
                        .last_poll_at
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".to_string())
                ),
                format!("last error: {}", health.last_error.unwrap_or_default()),
            ];
            self.alerter
                .send(&self.tenant, "Recording poller is stale", &details)
                .await;
        }
        Ok(())
    }
}
