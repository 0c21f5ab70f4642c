//! Auto-Void Integration Tests
//!
//! No-content calls are completed as skipped without a CRM side effect;
//! the conservative policy keeps anything with a known caller.

mod common;

use common::*;
use wrapup::core::{PollerLimits, ProcessOutcome, VoidPolicy, VoidRules};
use wrapup::domain::{CompletionAction, DraftStatus, Recording, VoidReason};

fn short_empty_call(id: i64, from: &str) -> Recording {
    Recording {
        duration_secs: Some(12),
        transcript: Some(String::new()),
        ..inbound(id, from, "")
    }
}

fn heuristic() -> VoidRules {
    VoidRules {
        policy: VoidPolicy::Heuristic,
        sentinel_numbers: vec!["8005550199".to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn test_short_empty_call_is_voided() {
    let h = Harness::new();
    h.source.push(short_empty_call(1, "5557770001"));

    let report = h.poller.run_batch().await.unwrap();
    assert_eq!(report.voided, 1);
    assert_eq!(report.watermark_after, 1);

    let drafts = h.store.list_pending_drafts(TENANT, 10).unwrap();
    assert!(drafts.is_empty());
    assert_eq!(h.store.count_drafts(TENANT).unwrap(), 1);
    assert_eq!(h.crm.ticket_count(), 0);
}

#[tokio::test]
async fn test_voided_draft_records_reason() {
    let h = Harness::new();
    let outcome = h
        .processor()
        .process(TENANT, &short_empty_call(2, "5557770002"))
        .await
        .unwrap();

    let draft_id = match outcome {
        ProcessOutcome::Voided { draft_id, reason, .. } => {
            assert_eq!(reason, VoidReason::ShortCall);
            draft_id
        }
        other => panic!("expected void, got {:?}", other),
    };
    let draft = h.store.get_draft(&draft_id).unwrap().unwrap();
    assert_eq!(draft.status, DraftStatus::Completed);
    assert!(draft.auto_voided);
    assert_eq!(draft.void_reason, Some(VoidReason::ShortCall));
    assert_eq!(draft.completion_action, Some(CompletionAction::Skipped));
    assert_eq!(draft.completion_reason.as_deref(), Some("short_call"));
}

#[tokio::test]
async fn test_known_caller_is_kept_under_conservative_policy() {
    let h = Harness::new();
    h.crm.add_customer(candidate("C-1", "Dana Smith", "5551234567"));
    let recording = Recording {
        duration_secs: Some(20),
        ..inbound(3, "5551234567", "Hello?")
    };

    let outcome = h.processor().process(TENANT, &recording).await.unwrap();

    assert!(matches!(outcome, ProcessOutcome::Dispatched { .. }));
    assert_eq!(h.crm.ticket_count(), 1);
}

#[tokio::test]
async fn test_heuristic_policy_voids_short_call_with_known_caller() {
    let h = Harness::with(PollerLimits::default(), heuristic());
    h.crm.add_customer(candidate("C-1", "Dana Smith", "5551234567"));
    let recording = Recording {
        duration_secs: Some(20),
        ..inbound(4, "5551234567", "Hello?")
    };

    let outcome = h.processor().process(TENANT, &recording).await.unwrap();

    match outcome {
        ProcessOutcome::Voided { reason, .. } => assert_eq!(reason, VoidReason::ShortCall),
        other => panic!("expected void, got {:?}", other),
    }
    assert_eq!(h.crm.ticket_count(), 0);
}

#[tokio::test]
async fn test_long_business_call_is_never_voided() {
    for rules in [VoidRules::default(), heuristic()] {
        let h = Harness::with(PollerLimits::default(), rules);
        let outcome = h
            .processor()
            .process(TENANT, &inbound(5, "5557770005", BUSINESS_TRANSCRIPT))
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Dispatched { .. }));
    }
}

#[tokio::test]
async fn test_heuristic_hangup_and_playfile() {
    let h = Harness::with(PollerLimits::default(), heuristic());
    h.analyzer.set_hangup(true);
    let outcome = h
        .processor()
        .process(TENANT, &inbound(6, "5557770006", BUSINESS_TRANSCRIPT))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ProcessOutcome::Voided {
            reason: VoidReason::Hangup,
            ..
        }
    ));

    h.analyzer.set_hangup(false);
    let playfile = Recording {
        to_number: "1-800-555-0199".to_string(),
        ..inbound(7, "5557770007", BUSINESS_TRANSCRIPT)
    };
    let outcome = h.processor().process(TENANT, &playfile).await.unwrap();
    assert!(matches!(
        outcome,
        ProcessOutcome::Voided {
            reason: VoidReason::Playfile,
            ..
        }
    ));
}

#[tokio::test]
async fn test_conservative_reason_falls_back_to_no_content() {
    let h = Harness::new();
    let recording = Recording {
        duration_secs: Some(240),
        ..inbound(8, "5557770008", "uh")
    };
    let outcome = h.processor().process(TENANT, &recording).await.unwrap();
    assert!(matches!(
        outcome,
        ProcessOutcome::Voided {
            reason: VoidReason::NoContent,
            ..
        }
    ));
}
