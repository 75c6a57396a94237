//! ingot-ddl: Print the tables a JSON file would be loaded into
//!
//! Nothing is written; the file is decomposed with the configured policies
//! and each resulting table's inferred `CREATE TABLE` is printed.
//!
//! Usage:
//!   ingot-ddl orders.json
//!   ingot-ddl --dialect sqlite --config ingot.toml --table orders data.json
//!   ingot-ddl --sample 0 events.jsonl   # sample every record

use anyhow::{Context, Result};
use clap::Parser;
use ingot::loader::{preview, table_name_for, DEFAULT_PREVIEW_SAMPLE};
use ingot::schema::create_table_sql;
use ingot::{Dialect, LoadConfig};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ingot-ddl")]
#[command(about = "Infer CREATE TABLE statements from JSON", long_about = None)]
struct Args {
    /// Input file
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Main table name (defaults to the file stem)
    #[arg(long, short = 't')]
    table: Option<String>,

    /// TOML configuration holding the field policies
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Dialect::MySql)]
    dialect: Dialect,

    /// Number of leading records to infer from (0 for all)
    #[arg(long, default_value_t = DEFAULT_PREVIEW_SAMPLE)]
    sample: usize,
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

    let config = match &args.config {
        Some(path) => LoadConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => LoadConfig::load().context("Failed to load config")?,
    };
    let table = args.table.unwrap_or_else(|| table_name_for(&args.input));
    let sample = (args.sample > 0).then_some(args.sample);

    let previews = preview(&args.input, &table, &config, sample)
        .with_context(|| format!("Failed to infer tables from {}", args.input.display()))?;

    for table in &previews {
        println!("{};\n", create_table_sql(args.dialect, &table.table, &table.columns));
    }

    Ok(())
}
