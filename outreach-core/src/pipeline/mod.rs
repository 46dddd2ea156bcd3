//! Pipeline operations
//!
//! The [`Pipeline`] struct is the write/read surface over the target store,
//! claim ledger, event log, and suppression registry. Each operation is a
//! short-lived unit of work; the only cross-caller contention point is
//! `claim`, which resolves atomically inside the storage layer.

pub mod effects;
pub mod stage;

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::*;

use effects::{side_effects, SideEffect, SuppressionPolicy};
use stage::derive_stage;

/// Outcome of recording an outreach event.
///
/// The event insert is durable even when a side effect fails afterwards;
/// `partial_failure` carries the detail in that case instead of rolling the
/// event back.
#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
    pub event: OutreachEvent,
    /// Stage derived after the event and its side effects were applied
    pub stage: Stage,
    /// Suppression written as a side effect, if any
    pub suppression: Option<SuppressionEntry>,
    /// Whether the claim was released as a side effect
    pub claim_released: bool,
    /// Set when a side-effect write failed after the event was persisted
    pub partial_failure: Option<String>,
}

/// The business outreach pipeline.
pub struct Pipeline {
    db: Database,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(db: Database, config: PipelineConfig) -> Self {
        Self { db, config }
    }

    /// Access the underlying database handle
    pub fn database(&self) -> &Database {
        &self.db
    }

    fn require_user(user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    // ============================================
    // Target store
    // ============================================

    /// Ingest a discovered target. Idempotent on `(source, source_id)`.
    pub fn submit_target(&self, input: &NormalizedTarget) -> Result<Target> {
        if input.source.trim().is_empty() {
            return Err(Error::Validation("target source is required".to_string()));
        }
        if input.source_id.trim().is_empty() {
            return Err(Error::Validation("target source_id is required".to_string()));
        }

        let target = self.db.upsert_target(input, Utc::now())?;
        tracing::debug!(
            target_id = %target.id,
            source = %target.source,
            "Target submitted"
        );
        Ok(target)
    }

    /// Get a target by id
    pub fn get_target(&self, target_id: &str) -> Result<Target> {
        self.db
            .get_target(target_id)?
            .ok_or_else(|| Error::NotFound(format!("target {}", target_id)))
    }

    // ============================================
    // Claim ledger
    // ============================================

    /// Claim a target for exclusive pipeline work.
    ///
    /// Suppression is checked against live data first, then the claim insert
    /// races through the storage constraint: first writer wins, the loser
    /// gets [`Error::AlreadyClaimed`] immediately with no queueing.
    pub fn claim(&self, user_id: &str, target_id: &str) -> Result<Claim> {
        Self::require_user(user_id)?;
        let target = self.get_target(target_id)?;
        let now = Utc::now();

        if let Some(entry) = self.db.active_suppression(&target.id, now)? {
            return Err(Error::Suppressed {
                target_id: target.id,
                kind: entry.kind,
                until: entry.suppressed_until,
            });
        }

        let claim = Claim {
            id: uuid::Uuid::new_v4().to_string(),
            target_id: target.id.clone(),
            user_id: user_id.to_string(),
            status: ClaimStatus::Claimed,
            score: 0,
            why: None,
            contact_strategy: None,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_claim(&claim)?;

        tracing::info!(target_id = %target.id, user_id, "Target claimed");
        Ok(claim)
    }

    /// Release the caller's active claim on a target.
    pub fn release(&self, user_id: &str, target_id: &str) -> Result<()> {
        Self::require_user(user_id)?;

        let claim = self
            .db
            .get_active_claim(target_id)?
            .ok_or_else(|| Error::NotFound(format!("no active claim on target {}", target_id)))?;

        if claim.user_id != user_id {
            return Err(Error::NotOwner {
                target_id: target_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        self.db
            .set_claim_status(&claim.id, ClaimStatus::Released, Utc::now())?;
        tracing::info!(target_id, user_id, "Claim released");
        Ok(())
    }

    /// Record a win for a target and release its claim.
    ///
    /// Write-once: a second win on the same target fails with
    /// [`Error::DuplicateWin`] and leaves the first attribution intact.
    pub fn mark_win(
        &self,
        user_id: &str,
        target_id: &str,
        campaign_id: Option<&str>,
    ) -> Result<Win> {
        Self::require_user(user_id)?;
        let now = Utc::now();

        let active = self.db.get_active_claim(target_id)?;
        if let Some(claim) = &active {
            if claim.user_id != user_id {
                return Err(Error::NotOwner {
                    target_id: target_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }
        }

        let win = Win {
            target_id: target_id.to_string(),
            user_id: user_id.to_string(),
            campaign_id: campaign_id.map(String::from),
            won_at: now,
        };
        self.db.insert_win(&win)?;

        if let Some(claim) = active {
            self.db
                .set_claim_status(&claim.id, ClaimStatus::Released, now)?;
        }

        tracing::info!(target_id, user_id, "Win recorded");
        Ok(win)
    }

    // ============================================
    // Suppression registry
    // ============================================

    /// Check whether a target is currently suppressed.
    pub fn is_suppressed(&self, target_id: &str) -> Result<SuppressionStatus> {
        let entry = self.db.active_suppression(target_id, Utc::now())?;
        Ok(match entry {
            Some(e) => SuppressionStatus::active(e.kind, e.suppressed_until),
            None => SuppressionStatus::default(),
        })
    }

    /// Suppress a target, excluding it from future claiming.
    ///
    /// A cooldown entry requires a future `suppressed_until`. Writing a hard
    /// entry releases any active claim on the target.
    pub fn suppress(
        &self,
        target_id: &str,
        kind: SuppressionKind,
        reason: Option<&str>,
        suppressed_until: Option<DateTime<Utc>>,
    ) -> Result<SuppressionEntry> {
        let target = self.get_target(target_id)?;
        let now = Utc::now();

        let until = match kind {
            SuppressionKind::Hard => None,
            SuppressionKind::Cooldown => match suppressed_until {
                Some(until) if until > now => Some(until),
                Some(_) => {
                    return Err(Error::Validation(
                        "cooldown suppressed_until must be in the future".to_string(),
                    ))
                }
                None => {
                    return Err(Error::Validation(
                        "cooldown suppression requires suppressed_until".to_string(),
                    ))
                }
            },
        };

        let entry = self
            .db
            .insert_suppression(&target.id, kind, reason, until, now)?;

        if kind == SuppressionKind::Hard {
            if let Some(claim) = self.db.get_active_claim(&target.id)? {
                self.db
                    .set_claim_status(&claim.id, ClaimStatus::Released, now)?;
                tracing::info!(target_id = %target.id, "Active claim released by hard suppression");
            }
        }

        tracing::info!(target_id = %target.id, kind = %kind, "Target suppressed");
        Ok(entry)
    }

    // ============================================
    // Event log
    // ============================================

    /// Record an outreach event against the caller's claim.
    ///
    /// A suppressed target rejects events outright; otherwise only the
    /// current claim owner may record them. The event insert is committed
    /// first; side effects (suppressions, claim release) follow, and a
    /// failure there is reported in the outcome rather than undoing the
    /// event.
    pub fn record_event(
        &self,
        user_id: &str,
        target_id: &str,
        event_type: EventType,
        channel: Option<&str>,
        meta: serde_json::Value,
    ) -> Result<EventOutcome> {
        Self::require_user(user_id)?;
        let now = Utc::now();

        if let Some(entry) = self.db.active_suppression(target_id, now)? {
            return Err(Error::Suppressed {
                target_id: target_id.to_string(),
                kind: entry.kind,
                until: entry.suppressed_until,
            });
        }

        let claim = self
            .db
            .get_active_claim(target_id)?
            .filter(|c| c.user_id == user_id)
            .ok_or_else(|| Error::NotOwner {
                target_id: target_id.to_string(),
                user_id: user_id.to_string(),
            })?;

        let event_id = self
            .db
            .insert_event(target_id, user_id, event_type, channel, &meta, now)?;
        let event = OutreachEvent {
            id: event_id,
            target_id: target_id.to_string(),
            user_id: user_id.to_string(),
            event_type,
            channel: channel.map(String::from),
            meta,
            occurred_at: now,
        };

        // The event is durable from here; side-effect failures are reported,
        // not rolled back.
        let mut suppression = None;
        let mut claim_released = false;
        let mut partial_failure = None;

        if let Err(e) = self.promote_claim(&claim, now) {
            partial_failure = Some(e.to_string());
        }

        match self.apply_side_effects(&claim, event_type, now) {
            Ok((applied, released)) => {
                suppression = applied;
                claim_released = released;
            }
            Err(e) => {
                tracing::error!(target_id, error = %e, "Event side effect failed");
                partial_failure = Some(e.to_string());
            }
        }

        let stage = self.stage_of(target_id)?;
        tracing::info!(
            target_id,
            user_id,
            event_type = %event_type,
            stage = %stage,
            "Event recorded"
        );

        Ok(EventOutcome {
            event,
            stage,
            suppression,
            claim_released,
            partial_failure,
        })
    }

    /// First recorded event moves a claim from `claimed` to `working`.
    fn promote_claim(&self, claim: &Claim, now: DateTime<Utc>) -> Result<()> {
        match claim.status {
            ClaimStatus::Claimed => self.db.set_claim_status(&claim.id, ClaimStatus::Working, now),
            _ => self.db.touch_claim(&claim.id, now),
        }
    }

    fn apply_side_effects(
        &self,
        claim: &Claim,
        event_type: EventType,
        now: DateTime<Utc>,
    ) -> Result<(Option<SuppressionEntry>, bool)> {
        let policy = SuppressionPolicy::from(&self.config);
        let no_count = self.db.count_target_events(&claim.target_id, EventType::No)?;

        let mut suppression = None;
        let mut released = false;
        for effect in side_effects(event_type, no_count, &policy, now) {
            match effect {
                SideEffect::SuppressHard { reason } => {
                    suppression = Some(self.db.insert_suppression(
                        &claim.target_id,
                        SuppressionKind::Hard,
                        Some(reason),
                        None,
                        now,
                    )?);
                }
                SideEffect::SuppressCooldown { reason, until } => {
                    suppression = Some(self.db.insert_suppression(
                        &claim.target_id,
                        SuppressionKind::Cooldown,
                        Some(reason),
                        Some(until),
                        now,
                    )?);
                }
                SideEffect::ReleaseClaim => {
                    self.db
                        .set_claim_status(&claim.id, ClaimStatus::Released, now)?;
                    released = true;
                }
            }
        }

        Ok((suppression, released))
    }

    // ============================================
    // Derived views
    // ============================================

    /// Derive the current stage of a target from its full history.
    pub fn stage_of(&self, target_id: &str) -> Result<Stage> {
        let now = Utc::now();
        let claim = self.db.get_active_claim(target_id)?;
        let events = self.db.get_target_events(target_id)?;
        let win = self.db.get_win(target_id)?;
        let suppression = self.db.active_suppression(target_id, now)?;

        Ok(derive_stage(
            claim.as_ref(),
            &events,
            win.is_some(),
            suppression.as_ref(),
            self.config.cold_threshold,
        ))
    }

    /// List the caller's pipeline: claims joined with target fields, most
    /// recently updated first. Limit is clamped into the configured bounds.
    pub fn list_pipeline(&self, user_id: &str, limit: Option<u32>) -> Result<Vec<PipelineRow>> {
        Self::require_user(user_id)?;
        let limit = self.config.clamp_list_limit(limit);
        let now = Utc::now();

        let mut rows = Vec::new();
        for (claim, fields) in self.db.list_user_pipeline(user_id, limit)? {
            let stage = self.derive_claim_stage(&claim, now)?;
            rows.push(PipelineRow {
                target_name: fields.name,
                target_country: fields.country,
                target_city: fields.city,
                target_category: fields.category,
                target_website: fields.website,
                stage,
                claim,
            });
        }
        Ok(rows)
    }

    /// Roll-up counts for the caller's dashboard.
    ///
    /// Each target is bucketed once, under the caller's most recent claim
    /// on it, and only the caller's own outreach classifies it. Claims with
    /// no events classify as `claimed` and do not contribute to the
    /// hot/warm/cold buckets.
    pub fn stats(&self, user_id: &str) -> Result<UserStats> {
        Self::require_user(user_id)?;
        let now = Utc::now();
        let midnight = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();

        let mut stats = UserStats {
            new_leads_today: self.db.count_user_claims_since(user_id, midnight)?,
            wins: self.db.count_user_wins(user_id)?,
            ..Default::default()
        };

        // list_user_claims is ordered newest first, so the first claim seen
        // per target is the one that buckets it
        let mut seen = HashSet::new();
        for claim in self.db.list_user_claims(user_id)? {
            if !seen.insert(claim.target_id.clone()) {
                continue;
            }
            match self.derive_claim_stage(&claim, now)? {
                Stage::Hot => stats.hot += 1,
                Stage::Warm => stats.warm += 1,
                Stage::Cold => stats.cold += 1,
                _ => {}
            }
        }

        let (hard, cooldown) = self.db.count_user_suppressed_targets(user_id, now)?;
        stats.suppressed_hard = hard;
        stats.suppressed_cooldown = cooldown;

        Ok(stats)
    }

    /// Stage for one claim row, derived from the claimant's own outreach on
    /// the target. Events and wins belonging to other users' claims on the
    /// same target do not bleed into this claim's stage.
    fn derive_claim_stage(&self, claim: &Claim, now: DateTime<Utc>) -> Result<Stage> {
        let events: Vec<OutreachEvent> = self
            .db
            .get_target_events(&claim.target_id)?
            .into_iter()
            .filter(|e| e.user_id == claim.user_id)
            .collect();
        let has_win = self
            .db
            .get_win(&claim.target_id)?
            .is_some_and(|w| w.user_id == claim.user_id);
        let suppression = self.db.active_suppression(&claim.target_id, now)?;

        Ok(derive_stage(
            Some(claim),
            &events,
            has_win,
            suppression.as_ref(),
            self.config.cold_threshold,
        ))
    }
}
