//! Pipeline stage derivation
//!
//! Stage is recomputed from claim + event history on every read. Nothing in
//! the database stores a stage, so the stored status and the derived stage
//! cannot drift apart under partial failures.

use crate::types::{Claim, EventType, OutreachEvent, Stage, SuppressionEntry};

/// Derive a target's pipeline stage from its full history.
///
/// Terminal states win: a recorded win is `Won`, an active suppression is
/// `Suppressed`. Otherwise the stage follows the event history under the
/// current claim: no claim is `New`, a claim without outreach is `Claimed`,
/// a reply is `Hot`, `cold_threshold` or more `no`/`bounce` events without a
/// reply is `Cold`, fewer negative signals is `Warm`, and a plain `sent`
/// history is `Contacted`.
pub fn derive_stage(
    claim: Option<&Claim>,
    events: &[OutreachEvent],
    has_win: bool,
    active_suppression: Option<&SuppressionEntry>,
    cold_threshold: u32,
) -> Stage {
    if has_win {
        return Stage::Won;
    }
    if active_suppression.is_some() {
        return Stage::Suppressed;
    }
    if claim.is_none() {
        return Stage::New;
    }

    let has_reply = events.iter().any(|e| e.event_type == EventType::Reply);
    if has_reply {
        return Stage::Hot;
    }

    let negatives = events
        .iter()
        .filter(|e| matches!(e.event_type, EventType::No | EventType::Bounce))
        .count() as u32;
    if negatives >= cold_threshold {
        return Stage::Cold;
    }
    if negatives > 0 {
        return Stage::Warm;
    }

    let has_sent = events.iter().any(|e| e.event_type == EventType::Sent);
    if has_sent {
        return Stage::Contacted;
    }

    Stage::Claimed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClaimStatus, SuppressionKind};
    use chrono::Utc;

    fn claim() -> Claim {
        let now = Utc::now();
        Claim {
            id: "c1".to_string(),
            target_id: "t1".to_string(),
            user_id: "alice".to_string(),
            status: ClaimStatus::Claimed,
            score: 0,
            why: None,
            contact_strategy: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn event(event_type: EventType) -> OutreachEvent {
        OutreachEvent {
            id: 0,
            target_id: "t1".to_string(),
            user_id: "alice".to_string(),
            event_type,
            channel: None,
            meta: serde_json::json!({}),
            occurred_at: Utc::now(),
        }
    }

    fn suppression(kind: SuppressionKind) -> SuppressionEntry {
        SuppressionEntry {
            id: 0,
            target_id: "t1".to_string(),
            kind,
            reason: None,
            suppressed_until: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_no_claim_is_new() {
        assert_eq!(derive_stage(None, &[], false, None, 3), Stage::New);
    }

    #[test]
    fn test_claim_without_events_is_claimed() {
        assert_eq!(derive_stage(Some(&claim()), &[], false, None, 3), Stage::Claimed);
    }

    #[test]
    fn test_sent_is_contacted() {
        let events = vec![event(EventType::Sent)];
        assert_eq!(
            derive_stage(Some(&claim()), &events, false, None, 3),
            Stage::Contacted
        );
    }

    #[test]
    fn test_reply_is_hot() {
        let events = vec![event(EventType::Sent), event(EventType::Reply)];
        assert_eq!(derive_stage(Some(&claim()), &events, false, None, 3), Stage::Hot);
    }

    #[test]
    fn test_reply_trumps_negatives() {
        let events = vec![
            event(EventType::No),
            event(EventType::No),
            event(EventType::No),
            event(EventType::Reply),
        ];
        assert_eq!(derive_stage(Some(&claim()), &events, false, None, 3), Stage::Hot);
    }

    #[test]
    fn test_negatives_below_threshold_are_warm() {
        let events = vec![event(EventType::Sent), event(EventType::No)];
        assert_eq!(derive_stage(Some(&claim()), &events, false, None, 3), Stage::Warm);
    }

    #[test]
    fn test_negatives_at_threshold_are_cold() {
        let events = vec![
            event(EventType::No),
            event(EventType::Bounce),
            event(EventType::No),
        ];
        assert_eq!(derive_stage(Some(&claim()), &events, false, None, 3), Stage::Cold);
    }

    #[test]
    fn test_win_is_terminal() {
        let events = vec![event(EventType::Sent), event(EventType::Reply)];
        assert_eq!(derive_stage(Some(&claim()), &events, true, None, 3), Stage::Won);
    }

    #[test]
    fn test_suppression_is_terminal() {
        let sup = suppression(SuppressionKind::Hard);
        let events = vec![event(EventType::Sent)];
        assert_eq!(
            derive_stage(Some(&claim()), &events, false, Some(&sup), 3),
            Stage::Suppressed
        );
    }

    #[test]
    fn test_win_trumps_suppression() {
        let sup = suppression(SuppressionKind::Cooldown);
        assert_eq!(derive_stage(None, &[], true, Some(&sup), 3), Stage::Won);
    }
}
