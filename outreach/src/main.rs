//! outreach - business outreach pipeline CLI
//!
//! Exposes the pipeline operations (submit, claim, release, event, win,
//! suppress, pipeline, stats) as subcommands with JSON output. Caller
//! identity comes from `--user`, standing in for the authentication layer
//! that fronts this subsystem in production.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/outreach/pipeline.db
//! - Logs: $XDG_STATE_HOME/outreach/outreach.log
//! - Config: $XDG_CONFIG_HOME/outreach/config.toml
//!
//! Exit codes distinguish expected pipeline outcomes from true failures so
//! scripted callers can react differently to "target already taken" and
//! "try again later":
//! - 0 success
//! - 2 validation error
//! - 3 missing caller identity
//! - 4 not found
//! - 5 conflict (already claimed, duplicate win)
//! - 6 forbidden (not the owner, target suppressed)
//! - 1 anything else (storage and I/O failures)

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use outreach_core::{
    Config, Database, Error, EventType, NormalizedTarget, Pipeline, SuppressionKind,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "outreach")]
#[command(about = "Business outreach pipeline")]
#[command(version)]
struct Args {
    /// Caller identity (supplied by the authentication layer)
    #[arg(long, global = true, default_value = "")]
    user: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a discovered target (idempotent on source + source-id)
    Submit {
        /// Discovery source, e.g. "places"
        #[arg(long)]
        source: String,
        /// Source-scoped identifier
        #[arg(long)]
        source_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        website: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        rating: Option<f64>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        size_hint: Option<String>,
    },
    /// Claim a target for exclusive pipeline work
    Claim {
        target_id: String,
    },
    /// Release your active claim on a target
    Release {
        target_id: String,
    },
    /// Record an outreach event against your claim
    Event {
        target_id: String,
        /// Event type: sent, reply, no, stop, bounce
        #[arg(long = "type")]
        event_type: String,
        /// Outreach channel, e.g. "email"
        #[arg(long)]
        channel: Option<String>,
        /// Opaque JSON payload attached to the event
        #[arg(long, default_value = "{}")]
        meta: String,
    },
    /// Record a win for a target (releases the claim)
    Win {
        target_id: String,
        #[arg(long)]
        campaign: Option<String>,
    },
    /// Suppress a target from future claiming
    Suppress {
        target_id: String,
        /// Suppression kind: hard or cooldown
        #[arg(long)]
        kind: String,
        #[arg(long)]
        reason: Option<String>,
        /// RFC 3339 end of a cooldown window
        #[arg(long)]
        until: Option<String>,
    },
    /// List your pipeline, most recently updated first
    Pipeline {
        /// Page size (clamped to the configured bounds)
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Show your roll-up stats
    Stats,
}

fn main() {
    let args = Args::parse();

    match run(args) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(exit_code(&e));
        }
    }
}

fn exit_code(err: &Error) -> i32 {
    match err {
        Error::Validation(_) => 2,
        Error::Unauthorized => 3,
        Error::NotFound(_) => 4,
        Error::AlreadyClaimed(_) | Error::DuplicateWin(_) => 5,
        Error::NotOwner { .. } | Error::Suppressed { .. } => 6,
        _ => 1,
    }
}

fn run(args: Args) -> outreach_core::Result<serde_json::Value> {
    let config = Config::load()?;
    let _log_guard = outreach_core::logging::init(&config.logging)?;

    let db_path = Config::database_path();
    tracing::debug!(path = %db_path.display(), "Opening database");

    let db = Database::open(&db_path)?;
    db.migrate()?;
    let pipeline = Pipeline::new(db, config.pipeline);
    let user = args.user.as_str();

    match args.command {
        Command::Submit {
            source,
            source_id,
            name,
            country,
            city,
            category,
            website,
            phone,
            rating,
            domain,
            size_hint,
        } => {
            let target = pipeline.submit_target(&NormalizedTarget {
                source,
                source_id,
                name,
                country,
                city,
                category,
                website,
                phone,
                rating,
                domain,
                size_hint,
            })?;
            Ok(serde_json::to_value(target)?)
        }
        Command::Claim { target_id } => {
            let claim = pipeline.claim(user, &target_id)?;
            Ok(serde_json::to_value(claim)?)
        }
        Command::Release { target_id } => {
            pipeline.release(user, &target_id)?;
            Ok(json!({ "released": true, "target_id": target_id }))
        }
        Command::Event {
            target_id,
            event_type,
            channel,
            meta,
        } => {
            let event_type: EventType = event_type
                .parse()
                .map_err(Error::Validation)?;
            let meta: serde_json::Value = serde_json::from_str(&meta)
                .map_err(|e| Error::Validation(format!("meta is not valid JSON: {}", e)))?;
            let outcome =
                pipeline.record_event(user, &target_id, event_type, channel.as_deref(), meta)?;
            Ok(serde_json::to_value(outcome)?)
        }
        Command::Win { target_id, campaign } => {
            let win = pipeline.mark_win(user, &target_id, campaign.as_deref())?;
            Ok(serde_json::to_value(win)?)
        }
        Command::Suppress {
            target_id,
            kind,
            reason,
            until,
        } => {
            let kind: SuppressionKind = kind.parse().map_err(Error::Validation)?;
            let until = until
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| Error::Validation(format!("invalid until timestamp: {}", e)))
                })
                .transpose()?;
            let entry = pipeline.suppress(&target_id, kind, reason.as_deref(), until)?;
            Ok(serde_json::to_value(entry)?)
        }
        Command::Pipeline { limit } => {
            let rows = pipeline.list_pipeline(user, limit)?;
            Ok(serde_json::to_value(rows)?)
        }
        Command::Stats => {
            let stats = pipeline.stats(user)?;
            Ok(serde_json::to_value(stats)?)
        }
    }
}
