//! Event side-effect policy
//!
//! Maps each event type to the list of actions applied after the event
//! insert. Keeping this as an explicit dispatch table separates the policy
//! (thresholds, cooldown windows) from the write path, so it can be tuned
//! through configuration and tested on its own.

use chrono::{DateTime, Duration, Utc};

use crate::config::PipelineConfig;
use crate::types::EventType;

/// Suppression policy constants, lifted from [`PipelineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct SuppressionPolicy {
    /// Total `no` events on a target before it is hard-suppressed
    pub no_threshold: u32,
    /// Cooldown window applied on a bounce
    pub bounce_cooldown: Duration,
}

impl From<&PipelineConfig> for SuppressionPolicy {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            no_threshold: config.no_threshold,
            bounce_cooldown: Duration::days(config.bounce_cooldown_days),
        }
    }
}

/// An action triggered by recording an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// Permanently suppress the target
    SuppressHard { reason: &'static str },
    /// Suppress the target until the given instant
    SuppressCooldown {
        reason: &'static str,
        until: DateTime<Utc>,
    },
    /// Release the active claim on the target
    ReleaseClaim,
}

/// Compute the side effects of an event.
///
/// `no_count` is the total number of `no` events on the target including the
/// one just recorded; suppression is a property of the target, so the count
/// spans all claims it has ever had.
pub fn side_effects(
    event_type: EventType,
    no_count: i64,
    policy: &SuppressionPolicy,
    now: DateTime<Utc>,
) -> Vec<SideEffect> {
    match event_type {
        EventType::Stop => vec![
            SideEffect::SuppressHard { reason: "stop" },
            SideEffect::ReleaseClaim,
        ],
        EventType::No if no_count >= policy.no_threshold as i64 => vec![
            SideEffect::SuppressHard {
                reason: "no-threshold",
            },
            SideEffect::ReleaseClaim,
        ],
        EventType::Bounce => vec![
            SideEffect::SuppressCooldown {
                reason: "bounce",
                until: now + policy.bounce_cooldown,
            },
            SideEffect::ReleaseClaim,
        ],
        EventType::Sent | EventType::Reply | EventType::No => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SuppressionPolicy {
        SuppressionPolicy {
            no_threshold: 3,
            bounce_cooldown: Duration::days(14),
        }
    }

    #[test]
    fn test_sent_and_reply_have_no_effects() {
        let now = Utc::now();
        assert!(side_effects(EventType::Sent, 0, &policy(), now).is_empty());
        assert!(side_effects(EventType::Reply, 0, &policy(), now).is_empty());
    }

    #[test]
    fn test_stop_hard_suppresses_and_releases() {
        let effects = side_effects(EventType::Stop, 0, &policy(), Utc::now());
        assert_eq!(
            effects,
            vec![
                SideEffect::SuppressHard { reason: "stop" },
                SideEffect::ReleaseClaim,
            ]
        );
    }

    #[test]
    fn test_no_below_threshold_is_inert() {
        assert!(side_effects(EventType::No, 2, &policy(), Utc::now()).is_empty());
    }

    #[test]
    fn test_no_at_threshold_hard_suppresses() {
        let effects = side_effects(EventType::No, 3, &policy(), Utc::now());
        assert!(effects.contains(&SideEffect::SuppressHard {
            reason: "no-threshold"
        }));
        assert!(effects.contains(&SideEffect::ReleaseClaim));
    }

    #[test]
    fn test_bounce_cooldown_window() {
        let now = Utc::now();
        let effects = side_effects(EventType::Bounce, 0, &policy(), now);
        assert_eq!(
            effects,
            vec![
                SideEffect::SuppressCooldown {
                    reason: "bounce",
                    until: now + Duration::days(14),
                },
                SideEffect::ReleaseClaim,
            ]
        );
    }

    #[test]
    fn test_policy_from_config() {
        let config = PipelineConfig::default();
        let policy = SuppressionPolicy::from(&config);
        assert_eq!(policy.no_threshold, 3);
        assert_eq!(policy.bounce_cooldown, Duration::days(14));
    }
}
