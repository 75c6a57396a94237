//! Schema synthesis
//!
//! Infers SQL column types from batches of flat rows, diffs them against the
//! destination table and emits the `CREATE TABLE` / `ALTER TABLE` statements
//! needed before the batch can be inserted.

pub mod ddl;
pub mod diff;
pub mod infer;
pub mod synth;

pub use ddl::{add_column_sql, create_table_sql, Dialect};
pub use diff::{diff, incoming_columns, storage_row, storage_rows, ColumnSpec, TableSchemaDiff};
pub use infer::{detect_temporal, infer_type, InferenceConfig, SqlType, TemporalKind};
pub use synth::{SchemaChange, SchemaSynthesizer};
