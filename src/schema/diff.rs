use crate::schema::ddl::{is_reserved, RESERVED_COLUMNS};
use crate::schema::infer::{infer_type, InferenceConfig, SqlType};
use crate::types::Row;
use serde_json::Value;
use std::collections::HashSet;

/// A column the destination table should have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

/// Columns an incoming batch needs that the destination table lacks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchemaDiff {
    pub table: String,
    pub existing_columns: HashSet<String>,
    /// In order of first appearance in the batch
    pub missing_columns: Vec<ColumnSpec>,
}

impl TableSchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.missing_columns.is_empty()
    }

    pub fn missing_names(&self) -> Vec<&str> {
        self.missing_columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Union of the columns in `rows`, in order of first appearance.
///
/// Names differing only in case are one column, spelled as first seen.
pub fn incoming_columns(rows: &[Row]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for row in rows {
        for column in row.columns() {
            if seen.insert(column.to_lowercase()) {
                columns.push(column.clone());
            }
        }
    }
    columns
}

/// Infer a [`ColumnSpec`] for `column` from the rows of the current batch.
///
/// A row lacking the column counts as a null for it.
pub fn column_spec(column: &str, rows: &[Row], config: &InferenceConfig) -> ColumnSpec {
    let values: Vec<&Value> = rows.iter().filter_map(|row| row.get_ignore_case(column)).collect();
    let nullable = values.len() < rows.len() || values.iter().any(|v| v.is_null());

    ColumnSpec {
        name: column.to_string(),
        sql_type: infer_type(values, config),
        nullable,
    }
}

/// The form of `row` a table stores.
///
/// Data columns named like the surrogate key or timestamp columns become
/// `_data{name}`, and a column equal ignoring case to an earlier one gets a
/// numeric suffix, so every value lands in a column of its own.
pub fn storage_row(row: &Row) -> Row {
    let mut stored = Row::new();
    for (column, value) in row.iter() {
        let target = if is_reserved(column) {
            format!("_data{}", column)
        } else {
            column.clone()
        };
        let name = stored.free_name(&target, &RESERVED_COLUMNS);
        stored.insert(name, value.clone());
    }
    stored
}

pub fn storage_rows(rows: &[Row]) -> Vec<Row> {
    rows.iter().map(storage_row).collect()
}

/// Compare the columns of a batch against a table's existing columns.
///
/// Column names are compared case-insensitively, as both supported databases
/// treat them. Only the batch itself is sampled for the types of missing
/// columns.
pub fn diff(
    table: &str,
    existing_columns: &HashSet<String>,
    rows: &[Row],
    config: &InferenceConfig,
) -> TableSchemaDiff {
    let mut known: HashSet<String> = existing_columns.iter().map(|c| c.to_lowercase()).collect();

    let missing_columns = incoming_columns(rows)
        .into_iter()
        .filter(|column| known.insert(column.to_lowercase()))
        .map(|column| column_spec(&column, rows, config))
        .collect();

    TableSchemaDiff {
        table: table.to_string(),
        existing_columns: existing_columns.clone(),
        missing_columns,
    }
}
