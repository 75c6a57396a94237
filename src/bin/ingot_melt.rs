//! ingot-melt: Decompose nested JSON into per-table JSON Lines without a database
//!
//! Usage:
//!   # Read from file, output one tagged stream to stdout
//!   ingot-melt orders.json
//!
//!   # Read NDJSON from stdin, write one file per table
//!   cat events.jsonl | ingot-melt --ndjson --table events --output-dir ./tables
//!
//!   # Apply the policies of a load config
//!   ingot-melt --config ingot.toml orders.json -o ./tables

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::Parser;
use ingot::loader::table_name_for;
use ingot::melt::{Decomposer, Decomposition, StreamWriter, TableWriter};
use ingot::{ingest, LoadConfig};
use std::io::{stdin, stdout, BufReader};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingot-melt")]
#[command(about = "Decompose nested JSON into relational rows", long_about = None)]
struct Args {
    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Main table name (defaults to the file stem)
    #[arg(long, short = 't')]
    table: Option<String>,

    /// Output directory for separate .jsonl files per table.
    /// If omitted, writes to stdout as a single stream tagged with `_table`
    #[arg(long, short = 'o')]
    output_dir: Option<PathBuf>,

    /// TOML configuration holding the field policies
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Process newline-delimited JSON (one JSON object per line)
    #[arg(long)]
    ndjson: bool,

    /// Fail on fields whose shape contradicts their policy
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
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
    config.lines |= args.ndjson;
    config.strict |= args.strict;

    let table = match (&args.table, &args.input) {
        (Some(table), _) => table.clone(),
        (None, Some(path)) => table_name_for(path),
        (None, None) => "data".to_string(),
    };
    let decompose_config = config.decompose_config(&table)?;

    // NDJSON from stdin straight into files: stream record by record
    if let (None, Some(output_dir), true) = (&args.input, &args.output_dir, config.lines) {
        let mut writer = TableWriter::new(output_dir)?;
        let records = ingot::melt_ndjson(BufReader::new(stdin()), &mut writer, &table, decompose_config)?;
        eprintln!("✓ {} records melted into {} tables", records, writer.paths().len());
        return Ok(());
    }

    let records = match &args.input {
        Some(path) => ingest::read_path(path, config.input_format())
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => ingest::read_from(stdin().lock(), config.input_format()).context("Failed to read stdin")?,
    };

    let decomposition = Decomposer::new(decompose_config).decompose(records)?;
    for warning in &decomposition.warnings {
        tracing::warn!("{}", warning);
    }

    match args.output_dir {
        Some(output_dir) => {
            let mut writer = TableWriter::new(&output_dir)?;
            writer.write(&table, &decomposition)?;
            writer.flush()?;
            print_summary(&table, &decomposition);
        }
        None => {
            let mut writer = StreamWriter::new(stdout().lock());
            writer.write(&table, &decomposition)?;
            writer.flush()?;
        }
    }

    Ok(())
}

fn print_summary(table: &str, decomposition: &Decomposition) {
    eprintln!("✓ {}: {} rows", table, decomposition.main.len());
    for child in &decomposition.children {
        eprintln!("  ✓ {}: {} rows", child.table, child.rows.len());
    }
}
