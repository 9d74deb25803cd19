use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use ulid::Ulid;

use otbook::config::Config;
use otbook::model::{parse_clock, Minutes};
use otbook::scheduler::{BookingRequest, ConflictQuery, RescheduleRequest, Scheduler};
use otbook::store::{BookingStore, DurableStore};

#[derive(Parser)]
#[command(name = "otbook")]
#[command(about = "Operating-theater bookings with conflict detection and emergency override")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the booking log (overrides OTBOOK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Start of the operating day, HH:MM
    #[arg(long, global = true)]
    day_start: Option<String>,

    /// End of the operating day, HH:MM
    #[arg(long, global = true)]
    day_end: Option<String>,

    /// Minutes between candidate slot starts
    #[arg(long, global = true)]
    granularity: Option<Minutes>,

    /// Width of each candidate slot in minutes
    #[arg(long, global = true)]
    slot_width: Option<Minutes>,

    /// Name recorded in the audit trail
    #[arg(long, global = true, default_value = "cli")]
    actor: String,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a proposed time overlaps an existing booking.
    Check {
        theater: String,
        /// YYYY-MM-DD
        date: String,
        /// HH:MM
        start: String,
        /// Duration in minutes
        duration: Minutes,
        /// Booking to ignore, e.g. the one being moved
        #[arg(long)]
        exclude: Option<Ulid>,
    },

    /// Book a theater.
    Book {
        theater: String,
        date: String,
        start: String,
        duration: Minutes,
        /// Accept even when the time is taken, flagged for manual resolution
        #[arg(long)]
        emergency: bool,
        /// Procedure or patient reference
        #[arg(long)]
        label: Option<String>,
    },

    /// Move or resize an existing booking.
    Reschedule {
        id: Ulid,
        #[arg(long)]
        theater: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        duration: Option<Minutes>,
    },

    /// Mark a booking as in progress.
    Start { id: Ulid },

    /// Mark a booking as completed.
    Complete { id: Ulid },

    /// Cancel a booking; its time becomes free again.
    Cancel { id: Ulid },

    /// Show free and occupied slots for a theater on a date.
    Slots { theater: String, date: String },

    /// List every booking for a theater on a date.
    List { theater: String, date: String },

    /// Show one booking.
    Show { id: Ulid },

    /// Show the most recent audit entries.
    Audit {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Rewrite the booking log down to current state.
    Compact,
}

impl Command {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Book { .. }
                | Command::Reschedule { .. }
                | Command::Start { .. }
                | Command::Complete { .. }
                | Command::Cancel { .. }
        )
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::from_env();
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(s) = &cli.day_start {
        config.window.day_start = parse_clock(s)?;
    }
    if let Some(s) = &cli.day_end {
        config.window.day_end = parse_clock(s)?;
    }
    if let Some(g) = cli.granularity {
        config.window.slot_granularity = g;
    }
    if let Some(w) = cli.slot_width {
        config.window.slot_width = w;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON result.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = resolve_config(&cli)?;
    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(DurableStore::open(config.wal_path())?);
    let scheduler = Scheduler::new(store.clone() as Arc<dyn BookingStore>, config.window);
    let actor = cli.actor.as_str();
    let mutates = cli.command.mutates();

    match cli.command {
        Command::Check {
            theater,
            date,
            start,
            duration,
            exclude,
        } => {
            let query = ConflictQuery {
                resource_id: theater,
                date,
                start_time: start,
                duration_minutes: duration,
                exclude,
            };
            let conflict = scheduler.check_conflict(&query).await?;
            print_json(&serde_json::json!({ "conflict": conflict }))?;
        }
        Command::Book {
            theater,
            date,
            start,
            duration,
            emergency,
            label,
        } => {
            let req = BookingRequest {
                resource_id: theater,
                date,
                start_time: start,
                duration_minutes: duration,
                is_emergency: emergency,
                label,
            };
            let admission = if emergency {
                scheduler.schedule_emergency(req, actor).await?
            } else {
                scheduler.schedule(req, actor).await?
            };
            print_json(&admission)?;
        }
        Command::Reschedule {
            id,
            theater,
            date,
            start,
            duration,
        } => {
            let req = RescheduleRequest {
                resource_id: theater,
                date,
                start_time: start,
                duration_minutes: duration,
            };
            print_json(&scheduler.reschedule(id, req, actor).await?)?;
        }
        Command::Start { id } => print_json(&scheduler.start(id, actor).await?)?,
        Command::Complete { id } => print_json(&scheduler.complete(id, actor).await?)?,
        Command::Cancel { id } => print_json(&scheduler.cancel(id, actor).await?)?,
        Command::Slots { theater, date } => {
            print_json(&scheduler.available_slots(&theater, &date).await?)?
        }
        Command::List { theater, date } => {
            print_json(&scheduler.list_bookings(&theater, &date).await?)?
        }
        Command::Show { id } => print_json(&scheduler.get_booking(id).await?)?,
        Command::Audit { limit } => print_json(&scheduler.audit_log(limit).await?)?,
        Command::Compact => {
            store.compact().await?;
            print_json(&serde_json::json!({ "bookings": store.booking_count() }))?;
        }
    }

    if mutates && store.compact_if_needed(config.compact_threshold).await? {
        info!("compacted {}", config.wal_path().display());
    }
    Ok(())
}
