//! Overlap Guard Integration Tests
//!
//! Tests for the per-tenant processing lock: fresh locks skip the batch,
//! abandoned locks are taken over, and every exit path releases the lock.

mod common;

use chrono::{Duration, Utc};

use common::*;
use wrapup::core::{PollError, SkipReason};

#[tokio::test]
async fn test_fresh_lock_skips_batch() {
    let h = Harness::new();
    h.source.push(inbound(1, "5551234567", BUSINESS_TRANSCRIPT));
    let held_since = Utc::now() - Duration::minutes(1);
    h.store.set_lock(TENANT, Some(held_since)).unwrap();

    let report = h.poller.run_batch().await.unwrap();

    assert!(report.skipped);
    assert_eq!(report.skip_reason, Some(SkipReason::LockHeld));
    assert_eq!(h.source.fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(h.watermark(), 0);

    // Someone else's lock is left alone
    let cursor = h.store.ensure_cursor(TENANT).unwrap();
    assert!(cursor.processing_started_at.is_some());
}

#[tokio::test]
async fn test_lock_past_active_window_is_acquired_quietly() {
    let h = Harness::new();
    h.source.push(inbound(1, "5551234567", BUSINESS_TRANSCRIPT));
    h.store
        .set_lock(TENANT, Some(Utc::now() - Duration::seconds(270)))
        .unwrap();

    let report = h.poller.run_batch().await.unwrap();

    assert!(!report.skipped);
    assert!(!report.took_over_stale_lock);
    assert_eq!(report.processed, 1);
}

#[tokio::test]
async fn test_abandoned_lock_is_taken_over() {
    let h = Harness::new();
    h.source.push(inbound(1, "5551234567", BUSINESS_TRANSCRIPT));
    h.store
        .set_lock(TENANT, Some(Utc::now() - Duration::minutes(10)))
        .unwrap();

    let report = h.poller.run_batch().await.unwrap();

    assert!(!report.skipped);
    assert!(report.took_over_stale_lock);
    assert_eq!(report.processed, 1);
    assert!(h
        .store
        .ensure_cursor(TENANT)
        .unwrap()
        .processing_started_at
        .is_none());
}

#[tokio::test]
async fn test_lock_released_after_successful_batch() {
    let h = Harness::new();
    h.source.push(inbound(1, "5551234567", BUSINESS_TRANSCRIPT));

    h.poller.run_batch().await.unwrap();

    let cursor = h.store.ensure_cursor(TENANT).unwrap();
    assert!(cursor.processing_started_at.is_none());
    assert!(cursor.last_poll_at.is_some());
}

#[tokio::test]
async fn test_fetch_failure_releases_lock_and_keeps_watermark() {
    let h = Harness::new();
    h.store.ensure_cursor(TENANT).unwrap();
    h.store.advance_watermark(TENANT, 41).unwrap();
    h.source.set_failing(true);

    let err = h.poller.run_batch().await.unwrap_err();
    assert!(matches!(err, PollError::Fetch(_)));
    assert!(err.to_string().contains("connection refused"));

    let cursor = h.store.ensure_cursor(TENANT).unwrap();
    assert!(cursor.processing_started_at.is_none());
    assert_eq!(cursor.last_recording_id, 41);
    assert_eq!(cursor.consecutive_errors, 1);
    assert!(cursor.last_error.unwrap().contains("connection refused"));

    // Recovery resets the streak
    h.source.set_failing(false);
    h.poller.run_batch().await.unwrap();
    let cursor = h.store.ensure_cursor(TENANT).unwrap();
    assert_eq!(cursor.consecutive_errors, 0);
    assert!(cursor.last_error.is_none());
}

#[tokio::test]
async fn test_concurrent_batches_only_one_runs() {
    let h = Harness::new();
    h.crm.add_customer(candidate("C-1", "Dana Smith", "5551234567"));
    h.source.push(inbound(1, "5551234567", BUSINESS_TRANSCRIPT));
    h.source.push(inbound(2, "5559870000", BUSINESS_TRANSCRIPT));
    let other = h.another_poller();

    let (a, b) = tokio::join!(h.poller.run_batch(), other.run_batch());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(
        [a.skipped, b.skipped].iter().filter(|s| **s).count(),
        1,
        "exactly one invocation must skip"
    );
    let ran = if a.skipped { &b } else { &a };
    assert_eq!(ran.processed, 2);
    assert_eq!(h.crm.ticket_count(), 1);
    assert_eq!(h.store.count_drafts(TENANT).unwrap(), 2);
    assert_eq!(h.watermark(), 2);
}
