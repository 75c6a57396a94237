//! SQLite implementation of [`Sink`].

use crate::error::Result;
use crate::schema::{ddl, Dialect};
use crate::sink::Sink;
use crate::types::Row;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Fixed set of reusable connections to one database.
///
/// Connections are opened up front. When every one is checked out a
/// temporary overflow connection is opened and closed again on return.
pub struct ConnectionPool {
    location: String,
    in_memory: bool,
    size: usize,
    idle: Mutex<Vec<Connection>>,
}

impl ConnectionPool {
    /// Open `size` connections to the database file at `path`
    pub fn open(path: impl AsRef<Path>, size: usize) -> Result<Self> {
        Self::with_location(path.as_ref().to_string_lossy().into_owned(), false, size)
    }

    /// Open `size` connections sharing one private in-memory database
    pub fn in_memory(size: usize) -> Result<Self> {
        let location = format!("file:ingot-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        Self::with_location(location, true, size)
    }

    fn with_location(location: String, in_memory: bool, size: usize) -> Result<Self> {
        let mut pool = ConnectionPool {
            location,
            in_memory,
            size: size.max(1),
            idle: Mutex::new(Vec::new()),
        };

        let mut connections = Vec::with_capacity(pool.size);
        for _ in 0..pool.size {
            connections.push(pool.connect()?);
        }
        pool.idle = Mutex::new(connections);

        tracing::debug!(location = %pool.location, size = pool.size, "opened connection pool");
        Ok(pool)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(&self.location, OpenFlags::default())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        if !self.in_memory {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        }
        Ok(conn)
    }

    /// Run `f` with a connection checked out of the pool
    pub fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let pooled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => {
                tracing::debug!(size = self.size, "pool exhausted, opening overflow connection");
                self.connect()?
            }
        };

        let result = f(&mut conn);

        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.size {
            idle.push(conn);
        }
        result
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A SQLite database reached through a [`ConnectionPool`]
pub struct SqliteSink {
    pool: ConnectionPool,
}

impl SqliteSink {
    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self> {
        Ok(SqliteSink {
            pool: ConnectionPool::open(path, pool_size)?,
        })
    }

    /// Open a private in-memory database - useful for testing
    pub fn open_in_memory() -> Result<Self> {
        Ok(SqliteSink {
            pool: ConnectionPool::in_memory(1)?,
        })
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

impl Sink for SqliteSink {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn table_exists(&self, table: &str) -> Result<bool> {
        self.pool.with_connection(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
            let columns = stmt
                .query_map([table], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })
    }

    fn execute_ddl(&self, sql: &str) -> Result<()> {
        tracing::debug!(sql, "executing ddl");
        self.pool.with_connection(|conn| {
            conn.execute_batch(sql)?;
            Ok(())
        })
    }

    fn drop_table(&self, table: &str) -> Result<()> {
        self.execute_ddl(&ddl::drop_table_sql(Dialect::Sqlite, table))
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", Dialect::Sqlite.quote(table));
        self.pool.with_connection(|conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
    }

    fn bulk_insert(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = insert_sql(table, columns);
        self.pool.with_connection(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&sql)?;
                for row in rows {
                    let params = columns.iter().map(|column| sql_value(row.get_ignore_case(column)));
                    stmt.execute(rusqlite::params_from_iter(params))?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
    }
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let dialect = Dialect::Sqlite;
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", dialect.quote(table));
    }

    let names: Vec<String> = columns.iter().map(|c| dialect.quote(c)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        dialect.quote(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// Convert a row value to its SQLite storage form
fn sql_value(value: Option<&Value>) -> SqlValue {
    match value {
        None | Some(Value::Null) => SqlValue::Null,
        Some(Value::Bool(b)) => SqlValue::Integer(i64::from(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Some(Value::String(s)) => SqlValue::Text(s.clone()),
        Some(composite) => SqlValue::Text(composite.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map.into_iter().collect(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_table_introspection() {
        let sink = SqliteSink::open_in_memory().unwrap();
        assert!(!sink.table_exists("users").unwrap());
        assert!(sink.table_columns("users").unwrap().is_empty());

        sink.execute_ddl("CREATE TABLE users (id INTEGER, name TEXT)").unwrap();
        assert!(sink.table_exists("users").unwrap());
        assert_eq!(sink.table_columns("users").unwrap(), vec!["id", "name"]);

        sink.drop_table("users").unwrap();
        assert!(!sink.table_exists("users").unwrap());
    }

    #[test]
    fn test_bulk_insert_fills_missing_columns_with_null() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.execute_ddl("CREATE TABLE users (id INTEGER, name TEXT, active BOOLEAN)")
            .unwrap();

        let columns = vec!["id".to_string(), "name".to_string(), "active".to_string()];
        let rows = vec![
            row(json!({"id": 1, "name": "Alice", "active": true})),
            row(json!({"id": 2})),
        ];
        assert_eq!(sink.bulk_insert("users", &columns, &rows).unwrap(), 2);
        assert_eq!(sink.row_count("users").unwrap(), 2);

        let nulls: i64 = sink
            .pool()
            .with_connection(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM users WHERE name IS NULL AND active IS NULL",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(nulls, 1);
    }

    #[test]
    fn test_failed_insert_rolls_back_whole_chunk() {
        let sink = SqliteSink::open_in_memory().unwrap();
        sink.execute_ddl("CREATE TABLE t (a INTEGER NOT NULL)").unwrap();

        let columns = vec!["a".to_string()];
        let rows = vec![row(json!({"a": 1})), row(json!({"a": null}))];
        assert!(sink.bulk_insert("t", &columns, &rows).is_err());
        assert_eq!(sink.row_count("t").unwrap(), 0);
    }

    #[test]
    fn test_pool_reuses_connections() {
        let pool = ConnectionPool::in_memory(2).unwrap();
        assert_eq!(pool.idle_count(), 2);

        pool.with_connection(|conn| {
            conn.execute_batch("CREATE TABLE t (a INTEGER)")?;
            Ok(())
        })
        .unwrap();
        assert_eq!(pool.idle_count(), 2);

        // Every connection sees the same in-memory database
        for _ in 0..3 {
            let exists: i64 = pool
                .with_connection(|conn| {
                    Ok(conn.query_row(
                        "SELECT COUNT(*) FROM sqlite_master WHERE name = 't'",
                        [],
                        |r| r.get(0),
                    )?)
                })
                .unwrap();
            assert_eq!(exists, 1);
        }
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("load.db");

        {
            let sink = SqliteSink::open(&path, 2).unwrap();
            sink.execute_ddl("CREATE TABLE t (a INTEGER)").unwrap();
            sink.bulk_insert("t", &["a".to_string()], &[row(json!({"a": 7}))])
                .unwrap();
        }

        let sink = SqliteSink::open(&path, 1).unwrap();
        assert_eq!(sink.row_count("t").unwrap(), 1);
    }
}
