//! Database repository layer
//!
//! Provides query and insert operations for all entity types. The claim
//! insert is the one concurrency-sensitive write: it relies on the partial
//! unique index over active claims so that two racing claims resolve to
//! exactly one success inside SQLite, never in application code.

use crate::error::{Error, Result};
use crate::types::*;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::Mutex;

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
}

/// Parse a stored RFC 3339 timestamp, falling back to now on corruption.
fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable foreign keys and WAL mode for better concurrency
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        super::schema::run_migrations(&conn)
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    // ============================================
    // Target operations
    // ============================================

    /// Insert a target or merge newly-supplied fields into the existing one.
    ///
    /// Idempotent on `(source, source_id)`. Field merging is first-write-wins:
    /// a re-discovery fills previously unknown fields but never overwrites a
    /// known value, so degraded re-scrapes cannot erase data. `updated_at` is
    /// only bumped when a previously NULL field gains a value.
    pub fn upsert_target(&self, input: &NormalizedTarget, now: DateTime<Utc>) -> Result<Target> {
        let conn = self.conn.lock().unwrap();
        let id = Target::derive_id(&input.source, &input.source_id);

        conn.execute(
            r#"
            INSERT INTO targets (id, source, source_id, name, country, city, category,
                                 website, phone, rating, domain, size_hint, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            ON CONFLICT(source, source_id) DO NOTHING
            "#,
            params![
                id,
                input.source,
                input.source_id,
                input.name,
                input.country,
                input.city,
                input.category,
                input.website,
                input.phone,
                input.rating,
                input.domain,
                input.size_hint,
                now.to_rfc3339(),
            ],
        )?;

        // Merge pass: no-op for a fresh insert, first-write-wins otherwise.
        conn.execute(
            r#"
            UPDATE targets SET
                name = COALESCE(name, ?2),
                country = COALESCE(country, ?3),
                city = COALESCE(city, ?4),
                category = COALESCE(category, ?5),
                website = COALESCE(website, ?6),
                phone = COALESCE(phone, ?7),
                rating = COALESCE(rating, ?8),
                domain = COALESCE(domain, ?9),
                size_hint = COALESCE(size_hint, ?10),
                updated_at = CASE WHEN
                    (name IS NULL AND ?2 IS NOT NULL) OR
                    (country IS NULL AND ?3 IS NOT NULL) OR
                    (city IS NULL AND ?4 IS NOT NULL) OR
                    (category IS NULL AND ?5 IS NOT NULL) OR
                    (website IS NULL AND ?6 IS NOT NULL) OR
                    (phone IS NULL AND ?7 IS NOT NULL) OR
                    (rating IS NULL AND ?8 IS NOT NULL) OR
                    (domain IS NULL AND ?9 IS NOT NULL) OR
                    (size_hint IS NULL AND ?10 IS NOT NULL)
                THEN ?11 ELSE updated_at END
            WHERE source = ?1 AND source_id = ?12
            "#,
            params![
                input.source,
                input.name,
                input.country,
                input.city,
                input.category,
                input.website,
                input.phone,
                input.rating,
                input.domain,
                input.size_hint,
                now.to_rfc3339(),
                input.source_id,
            ],
        )?;

        conn.query_row(
            "SELECT * FROM targets WHERE source = ?1 AND source_id = ?2",
            params![input.source, input.source_id],
            Self::row_to_target,
        )
        .map_err(Error::from)
    }

    /// Get a target by its derived id
    pub fn get_target(&self, id: &str) -> Result<Option<Target>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM targets WHERE id = ?", [id], |row| {
            Self::row_to_target(row)
        })
        .optional()
        .map_err(Error::from)
    }

    fn row_to_target(row: &Row) -> rusqlite::Result<Target> {
        let created_at_str: String = row.get("created_at")?;
        let updated_at_str: String = row.get("updated_at")?;

        Ok(Target {
            id: row.get("id")?,
            source: row.get("source")?,
            source_id: row.get("source_id")?,
            name: row.get("name")?,
            country: row.get("country")?,
            city: row.get("city")?,
            category: row.get("category")?,
            website: row.get("website")?,
            phone: row.get("phone")?,
            rating: row.get("rating")?,
            domain: row.get("domain")?,
            size_hint: row.get("size_hint")?,
            created_at: parse_ts(&created_at_str),
            updated_at: parse_ts(&updated_at_str),
        })
    }

    // ============================================
    // Claim operations
    // ============================================

    /// Insert a claim, enforcing exclusivity through the active-claim index.
    ///
    /// The insert itself is the test-and-set: if another non-released claim
    /// exists for the target, SQLite rejects the row and the caller gets
    /// [`Error::AlreadyClaimed`]. There is no read-then-write window.
    pub fn insert_claim(&self, claim: &Claim) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO claims (id, target_id, user_id, status, score, why,
                                contact_strategy, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                claim.id,
                claim.target_id,
                claim.user_id,
                claim.status.as_str(),
                claim.score,
                claim.why,
                claim.contact_strategy,
                claim.created_at.to_rfc3339(),
                claim.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::AlreadyClaimed(claim.target_id.clone())
            } else {
                Error::Database(e)
            }
        })?;
        Ok(())
    }

    /// Get the active (non-released) claim for a target, if any
    pub fn get_active_claim(&self, target_id: &str) -> Result<Option<Claim>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM claims WHERE target_id = ? AND status != 'released'",
            [target_id],
            Self::row_to_claim,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Set a claim's status and bump its updated_at
    pub fn set_claim_status(
        &self,
        claim_id: &str,
        status: ClaimStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE claims SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now.to_rfc3339(), claim_id],
        )?;
        Ok(())
    }

    /// Bump a claim's updated_at without changing status
    pub fn touch_claim(&self, claim_id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE claims SET updated_at = ?1 WHERE id = ?2",
            params![now.to_rfc3339(), claim_id],
        )?;
        Ok(())
    }

    /// List all claims ever made by a user, most recently updated first
    pub fn list_user_claims(&self, user_id: &str) -> Result<Vec<Claim>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM claims WHERE user_id = ? ORDER BY updated_at DESC")?;

        let claims = stmt
            .query_map([user_id], Self::row_to_claim)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(claims)
    }

    /// Count claims a user created at or after the given instant
    pub fn count_user_claims_since(&self, user_id: &str, since: DateTime<Utc>) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM claims WHERE user_id = ?1 AND created_at >= ?2",
            params![user_id, since.to_rfc3339()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn row_to_claim(row: &Row) -> rusqlite::Result<Claim> {
        let status_str: String = row.get("status")?;
        let created_at_str: String = row.get("created_at")?;
        let updated_at_str: String = row.get("updated_at")?;

        Ok(Claim {
            id: row.get("id")?,
            target_id: row.get("target_id")?,
            user_id: row.get("user_id")?,
            status: status_str.parse().unwrap_or(ClaimStatus::Released),
            score: row.get("score")?,
            why: row.get("why")?,
            contact_strategy: row.get("contact_strategy")?,
            created_at: parse_ts(&created_at_str),
            updated_at: parse_ts(&updated_at_str),
        })
    }

    // ============================================
    // Event operations
    // ============================================

    /// Append an outreach event, returning its row id
    pub fn insert_event(
        &self,
        target_id: &str,
        user_id: &str,
        event_type: EventType,
        channel: Option<&str>,
        meta: &serde_json::Value,
        occurred_at: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO events (target_id, user_id, event_type, channel, meta, occurred_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                target_id,
                user_id,
                event_type.as_str(),
                channel,
                meta.to_string(),
                occurred_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Get the full event history for a target, oldest first
    pub fn get_target_events(&self, target_id: &str) -> Result<Vec<OutreachEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT * FROM events WHERE target_id = ? ORDER BY occurred_at ASC, id ASC")?;

        let events = stmt
            .query_map([target_id], Self::row_to_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Count events of one type ever recorded against a target
    pub fn count_target_events(&self, target_id: &str, event_type: EventType) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE target_id = ?1 AND event_type = ?2",
            params![target_id, event_type.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    fn row_to_event(row: &Row) -> rusqlite::Result<OutreachEvent> {
        let event_type_str: String = row.get("event_type")?;
        let occurred_at_str: String = row.get("occurred_at")?;
        let meta_str: String = row.get("meta")?;

        Ok(OutreachEvent {
            id: row.get("id")?,
            target_id: row.get("target_id")?,
            user_id: row.get("user_id")?,
            event_type: event_type_str.parse().unwrap_or(EventType::Sent),
            channel: row.get("channel")?,
            meta: serde_json::from_str(&meta_str).unwrap_or(serde_json::json!({})),
            occurred_at: parse_ts(&occurred_at_str),
        })
    }

    // ============================================
    // Suppression operations
    // ============================================

    /// Insert a suppression entry
    pub fn insert_suppression(
        &self,
        target_id: &str,
        kind: SuppressionKind,
        reason: Option<&str>,
        suppressed_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<SuppressionEntry> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO suppressions (target_id, kind, reason, suppressed_until, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                target_id,
                kind.as_str(),
                reason,
                suppressed_until.map(|t| t.to_rfc3339()),
                now.to_rfc3339(),
            ],
        )?;

        Ok(SuppressionEntry {
            id: conn.last_insert_rowid(),
            target_id: target_id.to_string(),
            kind,
            reason: reason.map(String::from),
            suppressed_until,
            created_at: now,
        })
    }

    /// Get the suppression entry effective for a target at `now`, if any.
    ///
    /// A hard entry always wins; otherwise the latest-expiring cooldown still
    /// in the future applies. Expired cooldowns are left in place and ignored.
    pub fn active_suppression(
        &self,
        target_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SuppressionEntry>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"
            SELECT * FROM suppressions
            WHERE target_id = ?1
              AND (kind = 'hard' OR suppressed_until > ?2)
            ORDER BY (kind = 'hard') DESC, suppressed_until DESC
            LIMIT 1
            "#,
            params![target_id, now.to_rfc3339()],
            Self::row_to_suppression,
        )
        .optional()
        .map_err(Error::from)
    }

    /// Count a user's ever-claimed targets currently under suppression.
    ///
    /// Returns `(hard, active_cooldown)` distinct-target counts; a target
    /// with a hard entry is not double-counted under cooldown.
    pub fn count_user_suppressed_targets(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(i64, i64)> {
        let conn = self.conn.lock().unwrap();

        let hard: i64 = conn.query_row(
            r#"
            SELECT COUNT(DISTINCT s.target_id)
            FROM suppressions s
            WHERE s.kind = 'hard'
              AND s.target_id IN (SELECT DISTINCT target_id FROM claims WHERE user_id = ?1)
            "#,
            params![user_id],
            |r| r.get(0),
        )?;

        let cooldown: i64 = conn.query_row(
            r#"
            SELECT COUNT(DISTINCT s.target_id)
            FROM suppressions s
            WHERE s.kind = 'cooldown'
              AND s.suppressed_until > ?2
              AND s.target_id IN (SELECT DISTINCT target_id FROM claims WHERE user_id = ?1)
              AND s.target_id NOT IN (SELECT target_id FROM suppressions WHERE kind = 'hard')
            "#,
            params![user_id, now.to_rfc3339()],
            |r| r.get(0),
        )?;

        Ok((hard, cooldown))
    }

    fn row_to_suppression(row: &Row) -> rusqlite::Result<SuppressionEntry> {
        let kind_str: String = row.get("kind")?;
        let created_at_str: String = row.get("created_at")?;
        let until_str: Option<String> = row.get("suppressed_until")?;

        Ok(SuppressionEntry {
            id: row.get("id")?,
            target_id: row.get("target_id")?,
            kind: kind_str.parse().unwrap_or(SuppressionKind::Hard),
            reason: row.get("reason")?,
            suppressed_until: parse_opt_ts(until_str),
            created_at: parse_ts(&created_at_str),
        })
    }

    // ============================================
    // Win operations
    // ============================================

    /// Insert a win record; the table's primary key makes this write-once
    pub fn insert_win(&self, win: &Win) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO wins (target_id, user_id, campaign_id, won_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                win.target_id,
                win.user_id,
                win.campaign_id,
                win.won_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_constraint_violation(&e) {
                Error::DuplicateWin(win.target_id.clone())
            } else {
                Error::Database(e)
            }
        })?;
        Ok(())
    }

    /// Get the win record for a target, if any
    pub fn get_win(&self, target_id: &str) -> Result<Option<Win>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM wins WHERE target_id = ?", [target_id], |row| {
            let won_at_str: String = row.get("won_at")?;
            Ok(Win {
                target_id: row.get("target_id")?,
                user_id: row.get("user_id")?,
                campaign_id: row.get("campaign_id")?,
                won_at: parse_ts(&won_at_str),
            })
        })
        .optional()
        .map_err(Error::from)
    }

    /// Count wins attributed to a user
    pub fn count_user_wins(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM wins WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    // ============================================
    // Pipeline list view
    // ============================================

    /// List a user's claims joined with target display fields, most recently
    /// updated first. Stage is derived by the caller, not stored here.
    pub fn list_user_pipeline(&self, user_id: &str, limit: u32) -> Result<Vec<(Claim, PipelineTargetFields)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"
            SELECT
                c.*,
                t.name as target_name,
                t.country as target_country,
                t.city as target_city,
                t.category as target_category,
                t.website as target_website
            FROM claims c
            JOIN targets t ON t.id = c.target_id
            WHERE c.user_id = ?1
            ORDER BY c.updated_at DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt
            .query_map(params![user_id, limit], |row| {
                let claim = Self::row_to_claim(row)?;
                let fields = PipelineTargetFields {
                    name: row.get("target_name")?,
                    country: row.get("target_country")?,
                    city: row.get("target_city")?,
                    category: row.get("target_category")?,
                    website: row.get("target_website")?,
                };
                Ok((claim, fields))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

/// Target display fields joined into pipeline list rows.
#[derive(Debug, Clone)]
pub struct PipelineTargetFields {
    pub name: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub category: Option<String>,
    pub website: Option<String>,
}
