//! Database schema and migrations
//!
//! Uses SQLite with embedded migrations managed via PRAGMA user_version.

use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL migrations, indexed by version number
const MIGRATIONS: &[&str] = &[
    // Version 1: Initial schema
    r#"
    -- ============================================
    -- Target store
    -- ============================================

    -- Identity is (source, source_id); id is derived from it and stable.
    -- Targets are never deleted, only suppressed.
    CREATE TABLE IF NOT EXISTS targets (
        id               TEXT PRIMARY KEY,
        source           TEXT NOT NULL,
        source_id        TEXT NOT NULL,
        name             TEXT,
        country          TEXT,
        city             TEXT,
        category         TEXT,
        website          TEXT,
        phone            TEXT,
        rating           REAL,
        domain           TEXT,
        size_hint        TEXT,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL,

        UNIQUE(source, source_id)
    );

    -- ============================================
    -- Claim ledger
    -- ============================================

    CREATE TABLE IF NOT EXISTS claims (
        id               TEXT PRIMARY KEY,
        target_id        TEXT NOT NULL REFERENCES targets(id),
        user_id          TEXT NOT NULL,
        status           TEXT NOT NULL,      -- 'claimed', 'working', 'released'
        score            INTEGER NOT NULL DEFAULT 0,
        why              TEXT,
        contact_strategy TEXT,
        created_at       DATETIME NOT NULL,
        updated_at       DATETIME NOT NULL
    );

    -- Exclusivity: at most one non-released claim per target. The claim
    -- insert races through this index, so two concurrent claims yield
    -- exactly one success and one constraint violation.
    CREATE UNIQUE INDEX IF NOT EXISTS idx_claims_active
        ON claims(target_id) WHERE status != 'released';

    CREATE INDEX IF NOT EXISTS idx_claims_user ON claims(user_id);
    CREATE INDEX IF NOT EXISTS idx_claims_updated ON claims(updated_at DESC);

    -- ============================================
    -- Event log (append-only)
    -- ============================================

    CREATE TABLE IF NOT EXISTS events (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id        TEXT NOT NULL REFERENCES targets(id),
        user_id          TEXT NOT NULL,
        event_type       TEXT NOT NULL,      -- 'sent', 'reply', 'no', 'stop', 'bounce'
        channel          TEXT,
        meta             JSON NOT NULL,
        occurred_at      DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_events_target ON events(target_id);
    CREATE INDEX IF NOT EXISTS idx_events_target_type ON events(target_id, event_type);

    -- ============================================
    -- Suppression registry
    -- ============================================

    -- Hard entries are permanent and shadow cooldowns; expired cooldowns
    -- become inert but are not deleted.
    CREATE TABLE IF NOT EXISTS suppressions (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        target_id        TEXT NOT NULL REFERENCES targets(id),
        kind             TEXT NOT NULL,      -- 'hard', 'cooldown'
        reason           TEXT,
        suppressed_until DATETIME,           -- NULL for hard entries
        created_at       DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_suppressions_target ON suppressions(target_id);

    -- ============================================
    -- Win attribution
    -- ============================================

    -- Primary key on target_id makes wins write-once: first win wins.
    CREATE TABLE IF NOT EXISTS wins (
        target_id        TEXT PRIMARY KEY REFERENCES targets(id),
        user_id          TEXT NOT NULL,
        campaign_id      TEXT,
        won_at           DATETIME NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_wins_user ON wins(user_id);
    "#,
];

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> crate::error::Result<()> {
    let current_version: i32 = conn
        .query_row("PRAGMA user_version", [], |r| r.get(0))
        .unwrap_or(0);

    tracing::info!(
        current_version,
        target_version = SCHEMA_VERSION,
        "Checking database migrations"
    );

    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let version = (i + 1) as i32;
        if version > current_version {
            tracing::info!(version, "Running migration");
            conn.execute_batch(migration)?;
            conn.execute(&format!("PRAGMA user_version = {}", version), [])?;
        }
    }

    if current_version < SCHEMA_VERSION {
        tracing::info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Migrations complete"
        );
    }

    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> crate::error::Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    Ok(version)
}
