//! Core domain types for the outreach pipeline
//!
//! These types model the canonical pipeline data: targets discovered by an
//! external feed, exclusive claims over them, the append-only outreach event
//! history, suppression entries, and win attribution.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Target** | A discovered business entity eligible for outreach |
//! | **Claim** | Exclusive ownership of a Target by one user for pipeline work |
//! | **Event** | An immutable outreach fact (sent, reply, no, stop, bounce) |
//! | **Suppression** | Permanent (hard) or temporary (cooldown) exclusion from claiming |
//! | **Stage** | Derived classification of a Target's outreach progress |
//! | **Win** | Terminal successful-conversion attribution |
//!
//! Users are opaque to this subsystem: a caller identity is a stable string
//! supplied by an external authentication collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================
// Target
// ============================================

/// Normalized target payload as produced by the external discovery feed.
///
/// Only the `(source, source_id)` identity pair is mandatory; everything else
/// is best-effort data that may arrive incrementally across re-discoveries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedTarget {
    /// Discovery source, e.g. "places"
    pub source: String,
    /// Source-scoped identifier
    pub source_id: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub domain: Option<String>,
    pub size_hint: Option<String>,
}

/// A discovered business entity.
///
/// Identity is the `(source, source_id)` pair; `id` is derived from it and is
/// stable across re-discoveries. Targets are never deleted, only suppressed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Stable identifier derived from `(source, source_id)`
    pub id: String,
    pub source: String,
    pub source_id: String,
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub rating: Option<f64>,
    pub domain: Option<String>,
    pub size_hint: Option<String>,
    /// When this target was first discovered
    pub created_at: DateTime<Utc>,
    /// Last time a re-discovery contributed new fields
    pub updated_at: DateTime<Utc>,
}

impl Target {
    /// Derive the stable target id from its identity pair.
    pub fn derive_id(source: &str, source_id: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.update(b":");
        hasher.update(source_id.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

// ============================================
// Claim
// ============================================

/// Status of a claim over a target.
///
/// At most one claim per target may be in a non-released status at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Claimed but no outreach recorded yet
    Claimed,
    /// Outreach in progress (at least one event recorded)
    Working,
    /// Terminal: released explicitly, by win, or by suppression
    Released,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Claimed => "claimed",
            ClaimStatus::Working => "working",
            ClaimStatus::Released => "released",
        }
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claimed" => Ok(ClaimStatus::Claimed),
            "working" => Ok(ClaimStatus::Working),
            "released" => Ok(ClaimStatus::Released),
            _ => Err(format!("unknown claim status: {}", s)),
        }
    }
}

/// Exclusive ownership of a target by one user for pipeline work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Unique claim id (uuid v4)
    pub id: String,
    pub target_id: String,
    /// Owner identity (opaque, from the auth collaborator)
    pub user_id: String,
    pub status: ClaimStatus,
    /// Prioritization score
    pub score: i64,
    /// Rationale for working this target
    pub why: Option<String>,
    pub contact_strategy: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================
// Outreach events
// ============================================

/// Kind of outreach event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Outbound message sent
    Sent,
    /// Target replied
    Reply,
    /// Target declined
    No,
    /// Target asked to never be contacted again
    Stop,
    /// Delivery failure
    Bounce,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Sent => "sent",
            EventType::Reply => "reply",
            EventType::No => "no",
            EventType::Stop => "stop",
            EventType::Bounce => "bounce",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(EventType::Sent),
            "reply" => Ok(EventType::Reply),
            "no" => Ok(EventType::No),
            "stop" => Ok(EventType::Stop),
            "bounce" => Ok(EventType::Bounce),
            _ => Err(format!("unknown event type: {}", s)),
        }
    }
}

/// An immutable outreach fact recorded under a claim.
///
/// Ordering by `occurred_at` defines the interaction history that stage
/// derivation reads. Events are never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachEvent {
    pub id: i64,
    pub target_id: String,
    /// The claim owner who recorded the event
    pub user_id: String,
    pub event_type: EventType,
    /// Outreach channel, e.g. "email", "phone"
    pub channel: Option<String>,
    /// Opaque caller-supplied payload
    pub meta: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

// ============================================
// Suppression
// ============================================

/// Kind of suppression entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionKind {
    /// Permanent opt-out; never removed, shadows any cooldown
    Hard,
    /// Temporary; effective only while `now < suppressed_until`
    Cooldown,
}

impl SuppressionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionKind::Hard => "hard",
            SuppressionKind::Cooldown => "cooldown",
        }
    }
}

impl std::fmt::Display for SuppressionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SuppressionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hard" => Ok(SuppressionKind::Hard),
            "cooldown" => Ok(SuppressionKind::Cooldown),
            _ => Err(format!("unknown suppression kind: {}", s)),
        }
    }
}

/// A target excluded from future claiming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub id: i64,
    pub target_id: String,
    pub kind: SuppressionKind,
    pub reason: Option<String>,
    /// None for hard entries
    pub suppressed_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of a suppression check at a point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuppressionStatus {
    pub suppressed: bool,
    pub kind: Option<SuppressionKind>,
    pub until: Option<DateTime<Utc>>,
}

impl SuppressionStatus {
    pub fn active(kind: SuppressionKind, until: Option<DateTime<Utc>>) -> Self {
        Self {
            suppressed: true,
            kind: Some(kind),
            until,
        }
    }
}

// ============================================
// Win
// ============================================

/// Attribution of a successful conversion. At most one per target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Win {
    pub target_id: String,
    pub user_id: String,
    pub campaign_id: Option<String>,
    pub won_at: DateTime<Utc>,
}

// ============================================
// Derived stage
// ============================================

/// Derived classification of a target's outreach progress.
///
/// Recomputed from claim + event history on every read; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Claimed,
    Contacted,
    Warm,
    Hot,
    Cold,
    Won,
    Suppressed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::New => "new",
            Stage::Claimed => "claimed",
            Stage::Contacted => "contacted",
            Stage::Warm => "warm",
            Stage::Hot => "hot",
            Stage::Cold => "cold",
            Stage::Won => "won",
            Stage::Suppressed => "suppressed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================
// List and stats views
// ============================================

/// A claim joined with its target's display fields, for pipeline list views.
///
/// Pre-joined to avoid N+1 lookups when rendering the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRow {
    pub claim: Claim,
    pub target_name: Option<String>,
    pub target_country: Option<String>,
    pub target_city: Option<String>,
    pub target_category: Option<String>,
    pub target_website: Option<String>,
    /// Stage derived at read time
    pub stage: Stage,
}

/// Per-user roll-up counts for dashboard consumption.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStats {
    /// Claims created since midnight UTC
    pub new_leads_today: i64,
    pub hot: i64,
    pub warm: i64,
    pub cold: i64,
    pub wins: i64,
    /// Hard suppressions touching the user's ever-claimed targets
    pub suppressed_hard: i64,
    /// Active cooldown suppressions touching the user's ever-claimed targets
    pub suppressed_cooldown: i64,
}
