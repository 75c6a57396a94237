//! # Ingot - JSON to relational loader
//!
//! Takes semi-structured JSON records, splits each into flat main-table rows
//! and correlated child-table rows according to per-field policies, evolves
//! the destination schema additively, and writes the rows in chunks.
//!
//! ## Modules
//!
//! - **melt**: Decompose nested records into flat rows under a policy table
//! - **schema**: Infer SQL column types, diff against a table, generate DDL
//! - **sink**: The database interface and its SQLite implementation
//! - **loader**: Chunked per-table loads and whole-file pipelines
//! - **ingest**: Read JSON arrays, `{"data": [...]}` wrappers and NDJSON
//! - **config**: TOML load configuration
//!
//! ## Quick Start
//!
//! ### Decomposition
//!
//! ```rust
//! use ingot::melt::{DecomposeConfig, Decomposer, FieldPolicy, PolicyTable};
//! use serde_json::json;
//!
//! # fn main() -> ingot::Result<()> {
//! let policies = PolicyTable::new()
//!     .with("paymentTerm", FieldPolicy::FlattenOneLevel)
//!     .with("receipts", FieldPolicy::child("orders_receipts"));
//!
//! let decomposer = Decomposer::new(DecomposeConfig {
//!     policies,
//!     ..DecomposeConfig::default()
//! });
//!
//! let out = decomposer.decompose(vec![json!({
//!     "id": 1,
//!     "paymentTerm": {"type": "cash"},
//!     "receipts": [{"n": 1}, {"n": 2}]
//! })])?;
//!
//! assert_eq!(out.main[0].get("paymentTermType"), Some(&json!("cash")));
//! assert_eq!(out.child_row_count(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ### Loading
//!
//! ```rust
//! use ingot::{FileLoader, LoadConfig, Sink, SqliteSink};
//! use serde_json::json;
//!
//! # fn main() -> ingot::Result<()> {
//! let sink = SqliteSink::open_in_memory()?;
//! let loader = FileLoader::new(&sink, LoadConfig::default())?;
//!
//! let outcome = loader.load_records(vec![json!({"id": 1, "name": "Alice"})], "users");
//! assert!(outcome.success);
//! assert_eq!(sink.row_count("users")?, 1);
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::io::BufRead;

pub mod config;
pub mod error;
pub mod ingest;
pub mod loader;
pub mod melt;
pub mod schema;
pub mod sink;
pub mod types;

// Re-export commonly used types for convenience
pub use config::LoadConfig;
pub use error::{Error, Result};
pub use ingest::InputFormat;
pub use loader::{ChunkedLoader, FileLoader};
pub use melt::{DecomposeConfig, Decomposer, FieldPolicy, PolicyTable, TableWriter};
pub use schema::{Dialect, SchemaSynthesizer};
pub use sink::{Sink, SqliteSink};
pub use types::{IfExists, LoadOutcome, Row};

/// Decompose an NDJSON stream record by record, writing every table's rows
/// through `writer`. Returns the number of records read.
pub fn melt_ndjson<R: BufRead>(
    reader: R,
    writer: &mut TableWriter,
    table: &str,
    config: DecomposeConfig,
) -> Result<usize> {
    let decomposer = Decomposer::new(config);
    let mut session = decomposer.session();
    let mut records = 0;

    for value in ingest::NdjsonReader::new(reader) {
        let value: Value = value?;
        session.push(value)?;
        let decomposition = session.take();
        for warning in &decomposition.warnings {
            tracing::warn!(table, "{}", warning);
        }
        writer.write(table, &decomposition)?;
        records += 1;
    }

    writer.flush()?;
    Ok(records)
}
