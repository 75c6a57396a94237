//! DDL generation for the supported SQL dialects

use crate::schema::diff::ColumnSpec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Surrogate key added to every created table
pub const SURROGATE_KEY_COLUMN: &str = "_id";
pub const CREATED_AT_COLUMN: &str = "_created_at";
pub const UPDATED_AT_COLUMN: &str = "_updated_at";

/// Columns every created table has before any data column
pub const RESERVED_COLUMNS: [&str; 3] = [SURROGATE_KEY_COLUMN, CREATED_AT_COLUMN, UPDATED_AT_COLUMN];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[value(name = "mysql")]
    MySql,
    #[default]
    Sqlite,
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::MySql => f.write_str("mysql"),
            Dialect::Sqlite => f.write_str("sqlite"),
        }
    }
}

impl Dialect {
    /// Quote an identifier, doubling any embedded quote character
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Dialect::MySql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// Data columns always accept nulls: any later batch may omit them.
    fn column_definition(&self, column: &ColumnSpec) -> String {
        let definition = format!("{} {}", self.quote(&column.name), column.sql_type);
        match self {
            Dialect::MySql => format!("{} NULL", definition),
            Dialect::Sqlite => definition,
        }
    }
}

/// Whether `name` clashes with a column every created table already has
pub fn is_reserved(name: &str) -> bool {
    RESERVED_COLUMNS.iter().any(|r| r.eq_ignore_ascii_case(name))
}

/// `CREATE TABLE` for `table` with the given data columns.
///
/// Every table gets an auto-incrementing surrogate key plus creation and
/// update timestamps. Data columns must not reuse those names; see
/// [`storage_row`](crate::schema::storage_row).
pub fn create_table_sql(dialect: Dialect, table: &str, columns: &[ColumnSpec]) -> String {
    let mut definitions = Vec::with_capacity(columns.len() + 3);

    match dialect {
        Dialect::MySql => {
            definitions.push(format!(
                "{} BIGINT AUTO_INCREMENT PRIMARY KEY",
                dialect.quote(SURROGATE_KEY_COLUMN)
            ));
        }
        Dialect::Sqlite => {
            definitions.push(format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                dialect.quote(SURROGATE_KEY_COLUMN)
            ));
        }
    }

    for column in columns {
        definitions.push(dialect.column_definition(column));
    }

    match dialect {
        Dialect::MySql => {
            definitions.push(format!(
                "{} DATETIME DEFAULT CURRENT_TIMESTAMP",
                dialect.quote(CREATED_AT_COLUMN)
            ));
            definitions.push(format!(
                "{} DATETIME DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP",
                dialect.quote(UPDATED_AT_COLUMN)
            ));
        }
        Dialect::Sqlite => {
            definitions.push(format!(
                "{} DATETIME DEFAULT CURRENT_TIMESTAMP",
                dialect.quote(CREATED_AT_COLUMN)
            ));
            definitions.push(format!(
                "{} DATETIME DEFAULT CURRENT_TIMESTAMP",
                dialect.quote(UPDATED_AT_COLUMN)
            ));
        }
    }

    let body = definitions.join(",\n    ");
    match dialect {
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci",
            dialect.quote(table),
            body
        ),
        Dialect::Sqlite => format!("CREATE TABLE IF NOT EXISTS {} (\n    {}\n)", dialect.quote(table), body),
    }
}

/// `ALTER TABLE ... ADD COLUMN` for one missing column
pub fn add_column_sql(dialect: Dialect, table: &str, column: &ColumnSpec) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        dialect.quote(table),
        dialect.column_definition(column)
    )
}

pub fn drop_table_sql(dialect: Dialect, table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", dialect.quote(table))
}
