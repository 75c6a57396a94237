//! Relational destinations
//!
//! The loader only talks to a database through the [`Sink`] trait, so schema
//! evolution and chunked writes stay independent of any particular engine.

pub mod sqlite;

pub use sqlite::{ConnectionPool, SqliteSink};

use crate::error::Result;
use crate::schema::Dialect;
use crate::types::Row;

/// A database that can describe its tables, run DDL and bulk-insert rows
pub trait Sink {
    /// SQL dialect used to render DDL for this sink
    fn dialect(&self) -> Dialect;

    fn table_exists(&self, table: &str) -> Result<bool>;

    /// Column names of `table`, empty if it does not exist
    fn table_columns(&self, table: &str) -> Result<Vec<String>>;

    fn execute_ddl(&self, sql: &str) -> Result<()>;

    fn drop_table(&self, table: &str) -> Result<()>;

    fn row_count(&self, table: &str) -> Result<u64>;

    /// Insert `rows` into `table` as one transaction.
    ///
    /// `columns` lists every column written; a row missing one stores NULL.
    /// On error nothing from this call remains in the table.
    fn bulk_insert(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<usize>;
}
