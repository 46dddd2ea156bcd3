//! Database layer for the outreach pipeline
//!
//! This module provides the storage layer using SQLite with:
//! - Schema migrations
//! - Repository pattern for queries
//! - Constraint-backed exclusivity for claims and wins

pub mod repo;
pub mod schema;

pub use repo::{Database, PipelineTargetFields};
