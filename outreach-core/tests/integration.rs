//! Integration tests for the outreach pipeline
//!
//! These drive the full pipeline surface (submit, claim, events, wins,
//! suppression, stats) against a real SQLite database.

use std::sync::{Arc, Barrier};

use chrono::{Duration, Utc};
use outreach_core::config::PipelineConfig;
use outreach_core::{
    ClaimStatus, Database, Error, EventType, NormalizedTarget, Pipeline, Stage, SuppressionKind,
};
use tempfile::TempDir;

fn pipeline() -> Pipeline {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    Pipeline::new(db, PipelineConfig::default())
}

fn target(source_id: &str) -> NormalizedTarget {
    NormalizedTarget {
        source: "places".to_string(),
        source_id: source_id.to_string(),
        name: Some("Acme Plumbing".to_string()),
        country: Some("US".to_string()),
        city: Some("Springfield".to_string()),
        ..Default::default()
    }
}

// ============================================
// Target submission
// ============================================

#[test]
fn test_submit_target_requires_identity() {
    let pipeline = pipeline();

    let err = pipeline
        .submit_target(&NormalizedTarget {
            source: String::new(),
            source_id: "X1".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = pipeline
        .submit_target(&NormalizedTarget {
            source: "places".to_string(),
            source_id: "  ".to_string(),
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_submit_target_idempotent() {
    let pipeline = pipeline();

    let first = pipeline.submit_target(&target("X1")).unwrap();
    let second = pipeline.submit_target(&target("X1")).unwrap();

    assert_eq!(first.id, second.id);
}

// ============================================
// Claim exclusivity
// ============================================

#[test]
fn test_second_claim_loses() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();

    let claim = pipeline.claim("alice", &t.id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Claimed);

    let err = pipeline.claim("bob", &t.id).unwrap_err();
    assert!(matches!(err, Error::AlreadyClaimed(_)));
}

#[test]
fn test_concurrent_claims_one_winner() {
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();
    let pipeline = Arc::new(Pipeline::new(db, PipelineConfig::default()));
    let t = pipeline.submit_target(&target("X1")).unwrap();

    const CALLERS: usize = 8;
    let barrier = Arc::new(Barrier::new(CALLERS));

    let handles: Vec<_> = (0..CALLERS)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            let barrier = Arc::clone(&barrier);
            let target_id = t.id.clone();
            std::thread::spawn(move || {
                barrier.wait();
                pipeline.claim(&format!("user{}", i), &target_id)
            })
        })
        .collect();

    let mut wins = 0;
    let mut losses = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(_) => wins += 1,
            Err(Error::AlreadyClaimed(_)) => losses += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(losses, CALLERS - 1);
}

#[test]
fn test_claim_requires_identity() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();

    let err = pipeline.claim("", &t.id).unwrap_err();
    assert!(matches!(err, Error::Unauthorized));
}

#[test]
fn test_claim_unknown_target_not_found() {
    let pipeline = pipeline();
    let err = pipeline.claim("alice", "nope").unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

// ============================================
// Release ownership
// ============================================

#[test]
fn test_release_checks_ownership() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    let err = pipeline.release("bob", &t.id).unwrap_err();
    assert!(matches!(err, Error::NotOwner { .. }));

    pipeline.release("alice", &t.id).unwrap();

    // No active claim anymore
    let err = pipeline.release("alice", &t.id).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    // Target is claimable again
    pipeline.claim("bob", &t.id).unwrap();
}

// ============================================
// Suppression
// ============================================

#[test]
fn test_hard_suppression_blocks_claims() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();

    pipeline
        .suppress(&t.id, SuppressionKind::Hard, Some("opt-out"), None)
        .unwrap();

    let err = pipeline.claim("alice", &t.id).unwrap_err();
    assert!(matches!(
        err,
        Error::Suppressed {
            kind: SuppressionKind::Hard,
            ..
        }
    ));

    let status = pipeline.is_suppressed(&t.id).unwrap();
    assert!(status.suppressed);
    assert_eq!(status.kind, Some(SuppressionKind::Hard));
}

#[test]
fn test_hard_suppression_releases_active_claim() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    pipeline
        .suppress(&t.id, SuppressionKind::Hard, Some("abuse report"), None)
        .unwrap();

    // Alice's claim is gone; release finds nothing
    let err = pipeline.release("alice", &t.id).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[test]
fn test_cooldown_requires_future_until() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();

    let err = pipeline
        .suppress(&t.id, SuppressionKind::Cooldown, None, None)
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = pipeline
        .suppress(
            &t.id,
            SuppressionKind::Cooldown,
            None,
            Some(Utc::now() - Duration::hours(1)),
        )
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    pipeline
        .suppress(
            &t.id,
            SuppressionKind::Cooldown,
            Some("manual pause"),
            Some(Utc::now() + Duration::days(7)),
        )
        .unwrap();

    let err = pipeline.claim("alice", &t.id).unwrap_err();
    assert!(matches!(
        err,
        Error::Suppressed {
            kind: SuppressionKind::Cooldown,
            ..
        }
    ));
}

// ============================================
// Event recording and side effects
// ============================================

#[test]
fn test_event_requires_claim_ownership() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    let err = pipeline
        .record_event("bob", &t.id, EventType::Sent, Some("email"), serde_json::json!({}))
        .unwrap_err();
    assert!(matches!(err, Error::NotOwner { .. }));
}

#[test]
fn test_stop_event_hard_suppresses_and_releases() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    let outcome = pipeline
        .record_event("alice", &t.id, EventType::Stop, Some("email"), serde_json::json!({}))
        .unwrap();

    assert!(outcome.claim_released);
    assert!(outcome.partial_failure.is_none());
    let suppression = outcome.suppression.unwrap();
    assert_eq!(suppression.kind, SuppressionKind::Hard);
    assert_eq!(suppression.reason.as_deref(), Some("stop"));
    assert_eq!(outcome.stage, Stage::Suppressed);

    // Observable via a later claim attempt
    let err = pipeline.claim("bob", &t.id).unwrap_err();
    assert!(matches!(err, Error::Suppressed { .. }));
}

#[test]
fn test_no_threshold_auto_suppresses() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    for _ in 0..2 {
        let outcome = pipeline
            .record_event("alice", &t.id, EventType::No, None, serde_json::json!({}))
            .unwrap();
        assert!(outcome.suppression.is_none());
    }

    // Third no crosses the threshold
    let outcome = pipeline
        .record_event("alice", &t.id, EventType::No, None, serde_json::json!({}))
        .unwrap();
    let suppression = outcome.suppression.unwrap();
    assert_eq!(suppression.kind, SuppressionKind::Hard);
    assert_eq!(suppression.reason.as_deref(), Some("no-threshold"));

    // Nobody can work the target afterwards, not even the former owner
    let err = pipeline.claim("carol", &t.id).unwrap_err();
    assert!(matches!(err, Error::Suppressed { .. }));
    let err = pipeline
        .record_event("carol", &t.id, EventType::Sent, None, serde_json::json!({}))
        .unwrap_err();
    assert!(matches!(err, Error::Suppressed { .. }));
    let err = pipeline
        .record_event("alice", &t.id, EventType::Sent, None, serde_json::json!({}))
        .unwrap_err();
    assert!(matches!(err, Error::Suppressed { .. }));
}

#[test]
fn test_bounce_applies_cooldown() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    let outcome = pipeline
        .record_event("alice", &t.id, EventType::Bounce, Some("email"), serde_json::json!({}))
        .unwrap();

    let suppression = outcome.suppression.unwrap();
    assert_eq!(suppression.kind, SuppressionKind::Cooldown);
    let until = suppression.suppressed_until.unwrap();
    assert!(until > Utc::now() + Duration::days(13));
    assert!(until < Utc::now() + Duration::days(15));
    assert!(outcome.claim_released);

    let err = pipeline.claim("bob", &t.id).unwrap_err();
    assert!(matches!(
        err,
        Error::Suppressed {
            kind: SuppressionKind::Cooldown,
            until: Some(_),
            ..
        }
    ));
}

#[test]
fn test_first_event_promotes_claim_to_working() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    pipeline
        .record_event("alice", &t.id, EventType::Sent, Some("email"), serde_json::json!({}))
        .unwrap();

    let rows = pipeline.list_pipeline("alice", None).unwrap();
    assert_eq!(rows[0].claim.status, ClaimStatus::Working);
}

// ============================================
// Wins
// ============================================

#[test]
fn test_mark_win_write_once() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    pipeline.mark_win("alice", &t.id, Some("spring-promo")).unwrap();

    // Claim was released by the win; a second win is rejected
    let err = pipeline.mark_win("alice", &t.id, None).unwrap_err();
    assert!(matches!(err, Error::DuplicateWin(_)));

    assert_eq!(pipeline.stage_of(&t.id).unwrap(), Stage::Won);
}

#[test]
fn test_mark_win_rejects_non_owner() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    let err = pipeline.mark_win("bob", &t.id, None).unwrap_err();
    assert!(matches!(err, Error::NotOwner { .. }));
}

// ============================================
// Full scenarios
// ============================================

#[test]
fn test_claim_work_win_reclaim_scenario() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();

    // User A claims target T
    let claim = pipeline.claim("user-a", &t.id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Claimed);

    // User B loses the race
    let err = pipeline.claim("user-b", &t.id).unwrap_err();
    assert!(matches!(err, Error::AlreadyClaimed(_)));

    // A works the target: sent then reply -> hot
    pipeline
        .record_event("user-a", &t.id, EventType::Sent, Some("email"), serde_json::json!({}))
        .unwrap();
    let outcome = pipeline
        .record_event("user-a", &t.id, EventType::Reply, Some("email"), serde_json::json!({}))
        .unwrap();
    assert_eq!(outcome.stage, Stage::Hot);

    // A wins; the claim is released and the stage is terminal
    pipeline.mark_win("user-a", &t.id, None).unwrap();
    assert_eq!(pipeline.stage_of(&t.id).unwrap(), Stage::Won);

    // B can now claim the target since it is not suppressed
    pipeline.claim("user-b", &t.id).unwrap();
}

#[test]
fn test_three_nos_then_foreign_sent_scenario() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();
    pipeline.claim("user-a", &t.id).unwrap();

    for _ in 0..3 {
        pipeline
            .record_event("user-a", &t.id, EventType::No, None, serde_json::json!({}))
            .unwrap();
    }

    // Auto hard-suppressed; a different user can neither claim nor record
    // events against the target
    let err = pipeline.claim("user-b", &t.id).unwrap_err();
    assert!(matches!(err, Error::Suppressed { .. }));
    let err = pipeline
        .record_event("user-b", &t.id, EventType::Sent, None, serde_json::json!({}))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Suppressed {
            kind: SuppressionKind::Hard,
            ..
        }
    ));
}

// ============================================
// Pipeline list and stats
// ============================================

#[test]
fn test_list_pipeline_orders_and_joins() {
    let pipeline = pipeline();
    let t1 = pipeline.submit_target(&target("X1")).unwrap();
    let t2 = pipeline.submit_target(&target("X2")).unwrap();

    pipeline.claim("alice", &t1.id).unwrap();
    pipeline.claim("alice", &t2.id).unwrap();

    // Touch t1 last so it sorts first
    pipeline
        .record_event("alice", &t1.id, EventType::Sent, Some("email"), serde_json::json!({}))
        .unwrap();

    let rows = pipeline.list_pipeline("alice", None).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].claim.target_id, t1.id);
    assert_eq!(rows[0].target_name.as_deref(), Some("Acme Plumbing"));
    assert_eq!(rows[0].stage, Stage::Contacted);
    assert_eq!(rows[1].stage, Stage::Claimed);
}

#[test]
fn test_stats_rollup() {
    let pipeline = pipeline();

    // Hot: claimed, sent, reply
    let hot = pipeline.submit_target(&target("H1")).unwrap();
    pipeline.claim("alice", &hot.id).unwrap();
    pipeline
        .record_event("alice", &hot.id, EventType::Sent, None, serde_json::json!({}))
        .unwrap();
    pipeline
        .record_event("alice", &hot.id, EventType::Reply, None, serde_json::json!({}))
        .unwrap();

    // Warm: one no
    let warm = pipeline.submit_target(&target("W1")).unwrap();
    pipeline.claim("alice", &warm.id).unwrap();
    pipeline
        .record_event("alice", &warm.id, EventType::No, None, serde_json::json!({}))
        .unwrap();

    // Won
    let won = pipeline.submit_target(&target("V1")).unwrap();
    pipeline.claim("alice", &won.id).unwrap();
    pipeline.mark_win("alice", &won.id, None).unwrap();

    // Hard-suppressed via stop
    let stopped = pipeline.submit_target(&target("S1")).unwrap();
    pipeline.claim("alice", &stopped.id).unwrap();
    pipeline
        .record_event("alice", &stopped.id, EventType::Stop, None, serde_json::json!({}))
        .unwrap();

    // Claimed today, no events: counts as a lead but no bucket
    let fresh = pipeline.submit_target(&target("F1")).unwrap();
    pipeline.claim("alice", &fresh.id).unwrap();

    // Another user's activity does not leak into alice's stats
    let other = pipeline.submit_target(&target("O1")).unwrap();
    pipeline.claim("bob", &other.id).unwrap();

    let stats = pipeline.stats("alice").unwrap();
    assert_eq!(stats.new_leads_today, 5);
    assert_eq!(stats.hot, 1);
    assert_eq!(stats.warm, 1);
    assert_eq!(stats.cold, 0);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.suppressed_hard, 1);
    assert_eq!(stats.suppressed_cooldown, 0);
}

#[test]
fn test_stats_ignore_other_claimants_events() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();

    // Alice claims and walks away without any outreach
    pipeline.claim("alice", &t.id).unwrap();
    pipeline.release("alice", &t.id).unwrap();

    // Bob works the target to hot
    pipeline.claim("bob", &t.id).unwrap();
    pipeline
        .record_event("bob", &t.id, EventType::Sent, None, serde_json::json!({}))
        .unwrap();
    pipeline
        .record_event("bob", &t.id, EventType::Reply, None, serde_json::json!({}))
        .unwrap();

    // Bob's reply classifies his claim, not alice's
    let stats = pipeline.stats("alice").unwrap();
    assert_eq!(stats.hot, 0);
    let stats = pipeline.stats("bob").unwrap();
    assert_eq!(stats.hot, 1);
}

#[test]
fn test_stats_count_a_reclaimed_target_once() {
    let pipeline = pipeline();
    let t = pipeline.submit_target(&target("X1")).unwrap();

    pipeline.claim("alice", &t.id).unwrap();
    pipeline
        .record_event("alice", &t.id, EventType::No, None, serde_json::json!({}))
        .unwrap();
    pipeline.release("alice", &t.id).unwrap();
    pipeline.claim("alice", &t.id).unwrap();

    // Two claims on the same target bucket it once
    let stats = pipeline.stats("alice").unwrap();
    assert_eq!(stats.warm, 1);
    assert_eq!(stats.hot, 0);
}

// ============================================
// Durability
// ============================================

#[test]
fn test_pipeline_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("pipeline.db");

    let target_id = {
        let db = Database::open(&db_path).unwrap();
        db.migrate().unwrap();
        let pipeline = Pipeline::new(db, PipelineConfig::default());
        let t = pipeline.submit_target(&target("X1")).unwrap();
        pipeline.claim("alice", &t.id).unwrap();
        t.id
    };

    let db = Database::open(&db_path).unwrap();
    db.migrate().unwrap();
    let pipeline = Pipeline::new(db, PipelineConfig::default());

    // The claim persisted: a second claim still loses
    let err = pipeline.claim("bob", &target_id).unwrap_err();
    assert!(matches!(err, Error::AlreadyClaimed(_)));
}
