//! # outreach-core
//!
//! Core library for the business outreach pipeline: tracking prospective
//! business targets from discovery through outreach to a won or suppressed
//! terminal state.
//!
//! This library provides:
//! - Domain types for targets, claims, events, suppressions, and wins
//! - A SQLite storage layer whose constraints enforce the pipeline
//!   invariants (one active claim per target, one win per target)
//! - Pipeline operations with derived stages and per-user stats
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Invariants
//!
//! - At most one non-released claim exists per target at any instant; two
//!   concurrent claims resolve to exactly one winner inside SQLite.
//! - Targets with an active suppression can never be claimed; suppression is
//!   read live at claim time, never cached.
//! - Events are append-only; a target's stage is derived from the event
//!   history on read and never stored.
//!
//! ## Example
//!
//! ```rust,no_run
//! use outreach_core::{Config, Database, NormalizedTarget, Pipeline};
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let pipeline = Pipeline::new(db, config.pipeline);
//! let target = pipeline
//!     .submit_target(&NormalizedTarget {
//!         source: "places".into(),
//!         source_id: "X1".into(),
//!         ..Default::default()
//!     })
//!     .expect("failed to submit target");
//! let claim = pipeline.claim("alice", &target.id).expect("claim failed");
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use pipeline::{EventOutcome, Pipeline};
pub use types::*;

// Public modules
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod types;
