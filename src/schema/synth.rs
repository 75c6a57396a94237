use crate::error::Result;
use crate::schema::ddl::{add_column_sql, create_table_sql, Dialect};
use crate::schema::diff::{column_spec, diff, incoming_columns, ColumnSpec, TableSchemaDiff};
use crate::schema::infer::InferenceConfig;
use crate::sink::Sink;
use crate::types::Row;
use std::collections::HashSet;

/// What has to happen to a table before a batch can be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    /// The table does not exist yet
    Create { table: String, columns: Vec<ColumnSpec> },
    /// The table lacks some of the batch's columns
    AddColumns(TableSchemaDiff),
    Unchanged,
}

impl SchemaChange {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, SchemaChange::Unchanged)
    }

    /// DDL statements realizing this change, in execution order
    pub fn statements(&self, dialect: Dialect) -> Vec<String> {
        match self {
            SchemaChange::Create { table, columns } => vec![create_table_sql(dialect, table, columns)],
            SchemaChange::AddColumns(diff) => diff
                .missing_columns
                .iter()
                .map(|column| add_column_sql(dialect, &diff.table, column))
                .collect(),
            SchemaChange::Unchanged => Vec::new(),
        }
    }
}

/// Creates and evolves destination tables so incoming batches fit.
///
/// Evolution is additive only: columns are added, never dropped, retyped or
/// renamed.
#[derive(Debug, Clone, Default)]
pub struct SchemaSynthesizer {
    config: InferenceConfig,
}

impl SchemaSynthesizer {
    pub fn new(config: InferenceConfig) -> Self {
        SchemaSynthesizer { config }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Column definitions for a table holding `rows`
    pub fn columns_for(&self, rows: &[Row]) -> Vec<ColumnSpec> {
        incoming_columns(rows)
            .iter()
            .map(|column| column_spec(column, rows, &self.config))
            .collect()
    }

    /// Work out what `table` needs before `rows` can be inserted
    pub fn plan<S: Sink + ?Sized>(&self, sink: &S, table: &str, rows: &[Row]) -> Result<SchemaChange> {
        if !sink.table_exists(table).map_err(|e| e.into_schema(table))? {
            return Ok(SchemaChange::Create {
                table: table.to_string(),
                columns: self.columns_for(rows),
            });
        }

        let existing: HashSet<String> = sink
            .table_columns(table)
            .map_err(|e| e.into_schema(table))?
            .into_iter()
            .collect();

        let diff = diff(table, &existing, rows, &self.config);
        if diff.is_empty() {
            Ok(SchemaChange::Unchanged)
        } else {
            Ok(SchemaChange::AddColumns(diff))
        }
    }

    /// Execute the DDL for `change`. Returns the number of statements run.
    pub fn apply<S: Sink + ?Sized>(&self, sink: &S, change: &SchemaChange) -> Result<usize> {
        let table = match change {
            SchemaChange::Unchanged => return Ok(0),
            SchemaChange::Create { table, columns } => {
                tracing::info!(table = %table, columns = columns.len(), "creating table");
                table
            }
            SchemaChange::AddColumns(diff) => {
                tracing::info!(table = %diff.table, columns = ?diff.missing_names(), "adding columns");
                &diff.table
            }
        };

        let statements = change.statements(sink.dialect());
        for sql in &statements {
            sink.execute_ddl(sql).map_err(|e| e.into_schema(table))?;
        }
        Ok(statements.len())
    }

    /// Bring `table` in line with `rows`: plan, then apply
    pub fn ensure<S: Sink + ?Sized>(&self, sink: &S, table: &str, rows: &[Row]) -> Result<SchemaChange> {
        let change = self.plan(sink, table, rows)?;
        self.apply(sink, &change)?;
        Ok(change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::infer::SqlType;
    use crate::sink::SqliteSink;
    use serde_json::{json, Value};

    fn rows(values: Vec<Value>) -> Vec<Row> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map.into_iter().collect(),
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_plan_create_for_missing_table() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let synth = SchemaSynthesizer::default();

        let batch = rows(vec![json!({"id": 1, "name": "Alice"})]);
        match synth.plan(&sink, "users", &batch).unwrap() {
            SchemaChange::Create { table, columns } => {
                assert_eq!(table, "users");
                assert_eq!(columns[0].sql_type, SqlType::BigInt);
                assert_eq!(columns[1].name, "name");
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn test_additive_evolution() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let synth = SchemaSynthesizer::default();

        let first = rows(vec![json!({"id": 1, "name": "Alice"})]);
        synth.ensure(&sink, "users", &first).unwrap();

        let second = rows(vec![json!({"id": 3, "name": "Bob", "email": "b@x"})]);
        let change = synth.plan(&sink, "users", &second).unwrap();
        assert_eq!(change.statements(Dialect::Sqlite).len(), 1);
        assert_eq!(synth.apply(&sink, &change).unwrap(), 1);

        let columns = sink.table_columns("users").unwrap();
        assert!(columns.contains(&"email".to_string()));
        assert!(columns.contains(&"_id".to_string()));

        // Running again finds nothing to do
        assert!(synth.plan(&sink, "users", &second).unwrap().is_unchanged());
    }

    #[test]
    fn test_fewer_columns_never_drop() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let synth = SchemaSynthesizer::default();

        synth
            .ensure(&sink, "t", &rows(vec![json!({"a": 1, "b": 2})]))
            .unwrap();
        let change = synth.ensure(&sink, "t", &rows(vec![json!({"a": 1})])).unwrap();

        assert!(change.is_unchanged());
        assert!(sink.table_columns("t").unwrap().contains(&"b".to_string()));
    }

    #[test]
    fn test_unchanged_runs_no_ddl() {
        let synth = SchemaSynthesizer::default();
        let sink = SqliteSink::open_in_memory().unwrap();
        assert_eq!(synth.apply(&sink, &SchemaChange::Unchanged).unwrap(), 0);
    }
}
