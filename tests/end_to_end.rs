//! End-to-End Integration Test
//!
//! One tenant, one mixed batch covering every recording path, then a
//! follow-up batch after the late transcript arrives.

mod common;

use chrono::{Duration, Utc};

use common::*;
use wrapup::core::HealthReport;
use wrapup::domain::{CallDirection, CallStatus, NewCallSession, Recording};

#[tokio::test]
async fn test_mixed_batch_then_late_transcript() {
    let h = Harness::new();
    h.crm.add_customer(candidate("C-1", "Dana Smith", "5551234567"));
    h.crm.add_customer(candidate("C-2", "Robin Lee", "5552223333"));
    h.store.upsert_agent(TENANT, "agent-sam", "Sam", Some("101")).unwrap();

    // Call-start webhook fired for the first call
    let matched = inbound(1, "5551234567", BUSINESS_TRANSCRIPT);
    let webhook_call = h
        .store
        .insert_call(
            &NewCallSession::ringing(
                TENANT,
                CallDirection::Inbound,
                "+1 (555) 123-4567",
                "8005550100",
                matched.started_at - Duration::seconds(5),
            )
            .with_extension("101"),
        )
        .unwrap()
        .unwrap();

    // A session whose call-end event never arrived
    let orphan = h
        .store
        .insert_call(&NewCallSession::ringing(
            TENANT,
            CallDirection::Inbound,
            "5556660000",
            "8005550100",
            Utc::now() - Duration::hours(2),
        ))
        .unwrap()
        .unwrap();

    h.source.push(matched);
    h.source.push(outbound(2, "5552223333", BUSINESS_TRANSCRIPT));
    h.source.push(Recording {
        duration_secs: Some(12),
        ..inbound(3, "5557770003", "")
    });
    h.source.push(Recording {
        from_number: "101".to_string(),
        to_number: "102".to_string(),
        ..inbound(4, "101", BUSINESS_TRANSCRIPT)
    });
    h.source.push(Recording {
        can_transcribe: false,
        ..pending_transcript(5, "5557770005")
    });
    h.source.push(pending_transcript(6, "5557770006"));
    h.source.push(inbound(7, "5557770007", BUSINESS_TRANSCRIPT));

    let report = h.poller.run_batch().await.unwrap();

    assert!(!report.skipped);
    assert_eq!(report.fetched, 7);
    assert_eq!(report.processed, 3);
    assert_eq!(report.voided, 1);
    assert_eq!(report.internal, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.deferred, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(report.watermark_after, 5);
    assert_eq!(report.stale_calls_closed, 1);

    assert_eq!(h.crm.ticket_count(), 1);
    assert_eq!(h.crm.note_count(), 1);
    assert_eq!(h.crm.tickets.lock().unwrap()[0].customer_id, "C-1");

    // Webhook session picked up the recording and the agent
    let linked = h.store.get_call(&webhook_call.id).unwrap().unwrap();
    assert_eq!(linked.recording_id, Some(1));
    assert_eq!(linked.customer_id.as_deref(), Some("C-1"));
    assert_eq!(linked.agent_id.as_deref(), Some("agent-sam"));

    let orphan = h.store.get_call(&orphan.id).unwrap().unwrap();
    assert_eq!(orphan.status, CallStatus::Completed);
    assert!(orphan.ended_at.is_some());

    // Only the unmatched inbound call waits for a human
    let pending = h.store.list_pending_drafts(TENANT, 10).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].customer_phone.as_deref(), Some("5557770007"));

    let health = HealthReport::collect(&h.store, TENANT, &h.limits, Utc::now()).unwrap();
    assert!(!health.stale);
    assert!(!health.lock_held);
    assert_eq!(health.watermark, 5);
    assert_eq!(health.pending_review, 1);

    // Late transcript for 6; 7 is already done
    h.source.replace(inbound(6, "5557770006", BUSINESS_TRANSCRIPT));
    let second = h.poller.run_batch().await.unwrap();

    assert_eq!(second.fetched, 2);
    assert_eq!(second.processed, 1);
    assert_eq!(second.already_processed, 1);
    assert_eq!(second.watermark_after, 7);
    assert_eq!(h.store.list_pending_drafts(TENANT, 10).unwrap().len(), 2);
    assert_eq!(h.crm.ticket_count(), 1);
}
