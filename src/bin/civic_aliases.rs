//! civic-aliases
//!
//! Loads, dumps and queries locality aliases kept in a JSON snapshot store.

use std::fmt::Display;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use civic_dedupe::civic::{Benefactor, City, County, Locality, State, ZipCode};
use civic_dedupe::interchange::{dump_aliases, dump_aliases_to_path, load_aliases_from_path};
use civic_dedupe::{
    Dedupe, DedupeConfig, DedupeEngine, InMemoryRecordStore, Lookup, Model, RelationshipRegistry,
};

#[derive(Debug, Parser)]
#[command(name = "civic-aliases", version, about = "Locality alias maintenance")]
struct Cli {
    /// Snapshot file (overrides `snapshot_path` from configuration).
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Configuration file [default: civic-dedupe.toml].
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load city aliases from a CSV file, merging cities as needed.
    Load {
        /// CSV with columns name,short_name,state__short_name,aliases.
        file: PathBuf,
    },
    /// Write every aliased locality, city and county as CSV.
    Dump {
        /// Output file; stdout when omitted.
        file: Option<PathBuf>,
    },
    /// Look an entity up by identifying value or alias.
    Find {
        /// Entity kind.
        kind: Kind,
        /// Name (or short name for states and ZIP codes).
        value: String,
        /// Restrict cities and counties to this state.
        #[arg(long)]
        state: Option<String>,
    },
    /// Count live records per table.
    Stats,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Locality,
    City,
    County,
    State,
    ZipCode,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("civic-aliases error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DedupeConfig::load_from(path)?,
        None => DedupeConfig::load()?,
    };
    if let Some(snapshot) = cli.snapshot {
        config.snapshot_path = snapshot;
    }
    init_tracing(&config.log_filter)?;

    let snapshot = config.snapshot_path.clone();
    let store = if snapshot.exists() {
        InMemoryRecordStore::open_snapshot(&snapshot)
            .with_context(|| format!("failed to open snapshot {}", snapshot.display()))?
    } else {
        InMemoryRecordStore::new()
    };
    let engine = DedupeEngine::new(Arc::new(store), RelationshipRegistry::civic(), config);

    match cli.command {
        Command::Load { file } => {
            let report = load_aliases_from_path(&engine, &file)
                .with_context(|| format!("failed to load {}", file.display()))?;
            engine
                .store()
                .write_snapshot(&snapshot)
                .with_context(|| format!("failed to write snapshot {}", snapshot.display()))?;
            println!(
                "{} rows: {} created, {} set, {} extended, {} unchanged, {} skipped, {} merges",
                report.rows,
                report.created,
                report.set,
                report.extended,
                report.unchanged,
                report.skipped,
                report.merges
            );
        }
        Command::Dump { file } => {
            let rows = match &file {
                Some(path) => dump_aliases_to_path(&engine, path)
                    .with_context(|| format!("failed to write {}", path.display()))?,
                None => dump_aliases(&engine, io::stdout().lock())?,
            };
            if file.is_some() {
                println!("{rows} rows written");
            }
        }
        Command::Find { kind, value, state } => {
            let scope = match &state {
                Some(short_name) => {
                    let state = engine.find::<State>(short_name, &Lookup::new())?;
                    Lookup::new().eq("state", state.id)
                }
                None => Lookup::new(),
            };
            match kind {
                Kind::Locality => print_entity(&engine.find::<Locality>(&value, &Lookup::new())?),
                Kind::City => print_entity(&engine.find::<City>(&value, &scope)?),
                Kind::County => print_entity(&engine.find::<County>(&value, &scope)?),
                Kind::State => print_entity(&engine.find::<State>(&value, &Lookup::new())?),
                Kind::ZipCode => print_entity(&engine.find::<ZipCode>(&value, &scope)?),
            }
        }
        Command::Stats => {
            let store = engine.store();
            for table in [
                Locality::TABLE,
                City::TABLE,
                County::TABLE,
                State::TABLE,
                ZipCode::TABLE,
                Benefactor::TABLE,
            ] {
                println!("{table:<12} {}", store.table_len(table)?);
            }
        }
    }

    Ok(())
}

fn print_entity<T: Dedupe + Display>(entity: &T) {
    println!(
        "{}\t{}\t{}",
        entity.id(),
        entity,
        entity.aliases().unwrap_or("")
    );
}

fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
