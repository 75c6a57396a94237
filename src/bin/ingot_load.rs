//! ingot-load: Load JSON files into a SQLite database
//!
//! Usage:
//!   # Load one file into a table named after it
//!   ingot-load orders.json
//!
//!   # Several files with explicit tables and a config file
//!   ingot-load --config ingot.toml -t orders -t customers orders.json customers.json
//!
//!   # Start over, printing outcomes as JSON
//!   ingot-load --if-exists replace --json --db out.db events.jsonl

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use ingot::{FileLoader, IfExists, LoadConfig, LoadOutcome, SqliteSink};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingot-load")]
#[command(about = "Load nested JSON into relational tables", long_about = None)]
struct Args {
    /// Input files
    #[arg(value_name = "FILE", required = true)]
    files: Vec<PathBuf>,

    /// Destination table per file, in order (defaults to each file's stem)
    #[arg(long, short = 't')]
    table: Vec<String>,

    /// TOML configuration (defaults to $INGOT_CONFIG or ./ingot.toml)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configured one
    #[arg(long)]
    db: Option<PathBuf>,

    /// Rows per insert transaction
    #[arg(long)]
    chunk_size: Option<usize>,

    /// What to do when a table already exists
    #[arg(long, value_enum)]
    if_exists: Option<IfExists>,

    /// Treat input as newline-delimited JSON
    #[arg(long)]
    lines: bool,

    /// Fail on fields whose shape contradicts their policy
    #[arg(long)]
    strict: bool,

    /// Print outcomes as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => LoadConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LoadConfig::load().context("Failed to load config")?,
    };
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(if_exists) = args.if_exists {
        config.if_exists = if_exists;
    }
    config.lines |= args.lines;
    config.strict |= args.strict;

    let db_path = match args.db {
        Some(path) => path,
        None => config.sink.resolved_path()?,
    };
    let sink = SqliteSink::open(&db_path, config.sink.pool_size)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    let loader = FileLoader::new(&sink, config).context("Invalid configuration")?;
    let tables = if args.table.is_empty() {
        None
    } else {
        Some(args.table.as_slice())
    };
    let outcomes = loader.load_multiple(&args.files, tables)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            print_outcome(outcome, 0);
        }
    }

    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        bail!("{} of {} files failed to load", failed, outcomes.len());
    }
    Ok(())
}

fn print_outcome(outcome: &LoadOutcome, depth: usize) {
    println!("{}{}", "  ".repeat(depth), outcome);
    for error in &outcome.errors {
        println!("{}  error: {}", "  ".repeat(depth), error);
    }
    for warning in &outcome.warnings {
        println!("{}  warning: {}", "  ".repeat(depth), warning);
    }
    for child in &outcome.children {
        print_outcome(child, depth + 1);
    }
}
