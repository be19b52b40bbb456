//! Command-line inspector for the Docflow audit trail.

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use directories::BaseDirs;
use docflow_rs::config::DocflowConfig;
use docflow_rs::memory::{EntryId, ExtractedValues, SearchCriteria, SharedMemory};
use docflow_rs::open_shared_memory;
use log::{debug, info};
use std::path::PathBuf;

/// Database used by the CLI when no config names one.
const DEFAULT_DB_FILENAME: &str = "memory.db";

/// Command-line options for the audit trail inspector.
#[derive(Parser)]
#[command(name = "docflow", version)]
struct Cli {
    /// Optional path to a docflow.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend override (sqlite, redis, memory)
    #[arg(long, global = true)]
    backend: Option<String>,
    /// SQLite database file override
    #[arg(long, global = true)]
    sqlite_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one processing step and print its identifier
    Store(StoreArgs),
    /// Print one entry as JSON
    Get {
        /// Entry identifier
        id: String,
    },
    /// Print matching entries as a JSON array
    Search(SearchArgs),
}

#[derive(Args)]
struct StoreArgs {
    #[arg(long)]
    source: String,
    #[arg(long = "type")]
    kind: String,
    /// Extracted values as a JSON object
    #[arg(long)]
    values: Option<String>,
    #[arg(long)]
    thread_id: Option<String>,
    #[arg(long)]
    conversation_id: Option<String>,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    source: Option<String>,
    #[arg(long = "type")]
    kind: Option<String>,
    #[arg(long)]
    thread_id: Option<String>,
    #[arg(long)]
    conversation_id: Option<String>,
    /// Earliest timestamp (RFC 3339), inclusive
    #[arg(long)]
    since: Option<DateTime<Utc>>,
    /// Latest timestamp (RFC 3339), inclusive
    #[arg(long)]
    until: Option<DateTime<Utc>>,
}

impl From<SearchArgs> for SearchCriteria {
    fn from(args: SearchArgs) -> Self {
        Self {
            source: args.source,
            kind: args.kind,
            thread_id: args.thread_id,
            conversation_id: args.conversation_id,
            start_time: args.since,
            end_time: args.until,
        }
    }
}

/// Entry point for the Docflow CLI.
fn main() -> anyhow::Result<()> {
    docflow_rs::init_logging();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let memory = open_shared_memory(&config)?;
    info!("using {} memory backend", memory.backend_name());

    match cli.command {
        Command::Store(args) => run_store(&memory, args),
        Command::Get { id } => run_get(&memory, id),
        Command::Search(args) => run_search(&memory, args),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<DocflowConfig> {
    let mut config = if let Some(path) = cli.config.as_ref() {
        DocflowConfig::load_from_path(path).context("failed to load config")?
    } else {
        let cwd = std::env::current_dir().context("cwd")?;
        let layered = DocflowConfig::load_layered(&cwd).context("failed to load layered config")?;
        debug!("layered config loaded (layers={})", layered.layers.len());
        layered.config
    };
    if let Some(backend) = cli.backend.as_ref() {
        config.memory.backend = backend.clone();
    }
    if let Some(path) = cli.sqlite_path.as_ref() {
        config.memory.sqlite.path = Some(path.to_string_lossy().to_string());
    }
    // A private in-memory database would be gone before the next invocation.
    if config.memory.sqlite.path.is_none() {
        let path = default_db_path()?;
        debug!("using default sqlite database: {}", path.display());
        config.memory.sqlite.path = Some(path.to_string_lossy().to_string());
    }
    config.validate().context("invalid config")?;
    Ok(config)
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    if let Some(home) = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf()) {
        return Ok(home.join(".docflow").join(DEFAULT_DB_FILENAME));
    }
    let cwd = std::env::current_dir().context("cwd")?;
    Ok(cwd.join(".docflow").join(DEFAULT_DB_FILENAME))
}

fn run_store(memory: &SharedMemory, args: StoreArgs) -> anyhow::Result<()> {
    let values = match args.values.as_deref() {
        Some(raw) => Some(
            serde_json::from_str::<ExtractedValues>(raw)
                .context("--values must be a JSON object")?,
        ),
        None => None,
    };
    let id = memory.store(
        &args.source,
        &args.kind,
        values,
        args.thread_id.as_deref(),
        args.conversation_id.as_deref(),
    )?;
    println!("{id}");
    Ok(())
}

fn run_get(memory: &SharedMemory, id: String) -> anyhow::Result<()> {
    let id = EntryId::from(id);
    let Some(entry) = memory.retrieve(&id)? else {
        bail!("entry not found: {id}");
    };
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

fn run_search(memory: &SharedMemory, args: SearchArgs) -> anyhow::Result<()> {
    let outcome = memory.search_partial(&args.into())?;
    for skipped in &outcome.skipped {
        eprintln!("skipped unreadable entry {}: {}", skipped.id, skipped.reason);
    }
    println!("{}", serde_json::to_string_pretty(&outcome.entries)?);
    Ok(())
}
