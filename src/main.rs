use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use seatplan::config::EnvSettings;
use seatplan::engine::{Availability, EngineError, SlotCriteria};
use seatplan::store::InMemoryStore;

/// Answer availability questions against a JSON snapshot of the booking tables.
#[derive(Debug, Parser)]
#[command(name = "seatplan", version)]
struct Cli {
    /// Rooms, tables, reservations and closures as one JSON document.
    #[arg(long, env = "SEATPLAN_SNAPSHOT")]
    snapshot: PathBuf,

    /// Flat JSON object of settings. Takes precedence over `SEATPLAN_*` variables.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Print compact JSON.
    #[arg(long)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Slot statuses for one date.
    Slots {
        #[arg(long)]
        date: String,
        #[arg(long)]
        party: i64,
        #[arg(long)]
        meal: Option<String>,
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        table: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// Attach a table suggestion to bookable slots.
        #[arg(long)]
        assign_tables: bool,
    },
    /// Per-meal availability for a date range.
    Days {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long, default_value_t = 1)]
        party: i64,
    },
    /// Table proposal for one start time.
    Tables {
        #[arg(long)]
        date: String,
        #[arg(long)]
        time: String,
        #[arg(long)]
        party: i64,
        #[arg(long)]
        room: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
}

fn read_settings(path: &Path) -> Result<HashMap<String, String>, Box<dyn std::error::Error>> {
    let raw: HashMap<String, serde_json::Value> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

async fn run(cli: Cli) -> Result<String, Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::from_json(&std::fs::read_to_string(&cli.snapshot)?)?);
    info!("loaded {} reservations from {}", store.reservation_count(), cli.snapshot.display());

    let file = match &cli.settings {
        Some(path) => read_settings(path)?,
        None => HashMap::new(),
    };
    let engine = Availability::from_settings(store, &(file, EnvSettings::default()))?;

    let json = match cli.command {
        Command::Slots {
            date,
            party,
            meal,
            room,
            table,
            location,
            assign_tables,
        } => {
            let criteria = SlotCriteria {
                date: Some(date),
                party: Some(party),
                meal,
                room,
                table,
                location,
                assign_tables,
            };
            serde_json::to_value(engine.find_slots(&criteria).await?)?
        }
        Command::Days { from, to, party } => {
            serde_json::to_value(engine.find_available_days(&from, &to, party).await?)?
        }
        Command::Tables {
            date,
            time,
            party,
            room,
            location,
        } => {
            let criteria = SlotCriteria {
                room,
                location,
                ..SlotCriteria::new(date, party)
            };
            serde_json::to_value(engine.suggest_tables(&criteria, &time).await?)?
        }
    };

    let out = if cli.compact {
        serde_json::to_string(&json)?
    } else {
        serde_json::to_string_pretty(&json)?
    };
    Ok(out)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            // Bad input exits 2, anything else 1.
            let client = e.downcast_ref::<EngineError>().is_some_and(EngineError::is_client_error);
            std::process::exit(if client { 2 } else { 1 });
        }
    }
}
