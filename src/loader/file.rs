use crate::config::LoadConfig;
use crate::error::{Error, Result};
use crate::ingest;
use crate::loader::chunked::ChunkedLoader;
use crate::melt::{Decomposer, Decomposition};
use crate::schema::{storage_rows, ColumnSpec, SchemaSynthesizer};
use crate::sink::Sink;
use crate::types::LoadOutcome;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Steps a file goes through on its way into the sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Parsing,
    Decomposing,
    Writing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Parsing => "parsing",
            Stage::Decomposing => "decomposing",
            Stage::Writing => "writing",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Inferred columns for one table of a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePreview {
    pub table: String,
    pub columns: Vec<ColumnSpec>,
}

/// Loads whole JSON files: parse, decompose, then write the main table
/// followed by each child table.
pub struct FileLoader<'a, S: Sink + ?Sized> {
    sink: &'a S,
    config: LoadConfig,
}

impl<'a, S: Sink + ?Sized> FileLoader<'a, S> {
    pub fn new(sink: &'a S, config: LoadConfig) -> Result<Self> {
        config.validate()?;
        Ok(FileLoader { sink, config })
    }

    pub fn config(&self) -> &LoadConfig {
        &self.config
    }

    /// Load the file at `path` into `table` (and its child tables).
    ///
    /// Every failure, including unreadable or unparsable input, is reported
    /// in the returned outcome.
    pub fn load_file(&self, path: &Path, table: &str) -> LoadOutcome {
        let clock = LoadOutcome::begin(table);
        let span = tracing::info_span!("load_file", path = %path.display(), table);
        let _enter = span.enter();

        tracing::info!(stage = %Stage::Parsing);
        let records = match ingest::read_path(path, self.config.input_format()) {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "failed to read input");
                return clock.finish(0, 0, vec![e.to_string()]);
            }
        };

        let outcome = self.load_records(records, table);
        clock.finish_with(outcome)
    }

    /// Load already-parsed records into `table` (and its child tables)
    pub fn load_records(&self, records: Vec<Value>, table: &str) -> LoadOutcome {
        let clock = LoadOutcome::begin(table);

        if records.is_empty() {
            tracing::warn!(table, "input contains no records");
            return clock.finish(0, 0, vec!["input contains no records".to_string()]);
        }

        tracing::info!(stage = %Stage::Decomposing, records = records.len());
        let decomposition = match self.decompose(records, table) {
            Ok(decomposition) => decomposition,
            Err(e) => {
                tracing::error!(error = %e, "decomposition failed");
                return clock.finish(0, 0, vec![e.to_string()]);
            }
        };

        let warnings: Vec<String> = decomposition.warnings.iter().map(|w| w.to_string()).collect();
        for warning in &warnings {
            tracing::warn!(table, "{}", warning);
        }

        tracing::info!(stage = %Stage::Writing, rows = decomposition.main.len());
        let loader = ChunkedLoader::new(self.sink, self.config.inference.clone());
        let main = loader.load(
            &decomposition.main,
            table,
            self.config.chunk_size,
            self.config.if_exists,
        );

        let mut outcome = clock.finish_with(main);
        outcome.warnings = warnings;

        if !outcome.success {
            tracing::error!(table, "main table failed, skipping child tables");
            return outcome;
        }

        for child in &decomposition.children {
            if child.rows.is_empty() {
                tracing::debug!(table = %child.table, "no rows for child table");
                continue;
            }

            let child_outcome = loader.load(
                &child.rows,
                &child.table,
                self.config.chunk_size,
                self.config.if_exists,
            );
            if !child_outcome.success {
                outcome.success = false;
                outcome
                    .errors
                    .extend(child_outcome.errors.iter().map(|e| format!("{}: {}", child.table, e)));
            }
            outcome.children.push(child_outcome);
        }

        tracing::info!(stage = %Stage::Done, success = outcome.success, rows = outcome.total_rows_inserted());
        outcome
    }

    /// Load several files one after another.
    ///
    /// Table names default to each file's stem. A failure in one file does
    /// not stop the others.
    pub fn load_multiple(&self, files: &[PathBuf], tables: Option<&[String]>) -> Result<Vec<LoadOutcome>> {
        let names: Vec<String> = match tables {
            Some(tables) if tables.len() != files.len() => {
                return Err(Error::Config(format!(
                    "{} table names given for {} files",
                    tables.len(),
                    files.len()
                )));
            }
            Some(tables) => tables.to_vec(),
            None => files.iter().map(|f| table_name_for(f)).collect(),
        };

        Ok(files
            .iter()
            .zip(names.iter())
            .map(|(file, table)| self.load_file(file, table))
            .collect())
    }

    fn decompose(&self, records: Vec<Value>, table: &str) -> Result<Decomposition> {
        decompose(&self.config, records, table)
    }
}

fn decompose(config: &LoadConfig, records: Vec<Value>, table: &str) -> Result<Decomposition> {
    let decomposer = Decomposer::new(config.decompose_config(table)?);
    decomposer.decompose(records)
}

/// Records sampled by [`preview`] unless told otherwise
pub const DEFAULT_PREVIEW_SAMPLE: usize = 100;

/// Decompose the first `sample_size` records of the file at `path` (all of
/// them when `None`) and infer columns for every table they would produce,
/// without touching any database
pub fn preview(
    path: &Path,
    table: &str,
    config: &LoadConfig,
    sample_size: Option<usize>,
) -> Result<Vec<TablePreview>> {
    let mut records = ingest::read_path(path, config.input_format())?;
    if let Some(n) = sample_size {
        records.truncate(n);
    }

    let decomposition = decompose(config, records, table)?;
    let synthesizer = SchemaSynthesizer::new(config.inference.clone());

    let mut previews = vec![TablePreview {
        table: table.to_string(),
        columns: synthesizer.columns_for(&storage_rows(&decomposition.main)),
    }];
    for child in &decomposition.children {
        previews.push(TablePreview {
            table: child.table.clone(),
            columns: synthesizer.columns_for(&storage_rows(&child.rows)),
        });
    }
    Ok(previews)
}

/// Default table name for a file: its stem
pub fn table_name_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SqliteSink;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_table_name_for() {
        assert_eq!(table_name_for(Path::new("/data/orders.json")), "orders");
        assert_eq!(table_name_for(Path::new("events.jsonl")), "events");
    }

    #[test]
    fn test_parse_failure_is_an_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "bad.json", r#"{"foo": 1}"#);

        let sink = SqliteSink::open_in_memory().unwrap();
        let loader = FileLoader::new(&sink, LoadConfig::default()).unwrap();
        let outcome = loader.load_file(&path, "bad");

        assert!(!outcome.success);
        assert_eq!(outcome.rows_inserted, 0);
        assert!(outcome.errors[0].contains("parsing error"));
        assert!(!sink.table_exists("bad").unwrap());
    }

    #[test]
    fn test_missing_file_is_an_outcome() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let loader = FileLoader::new(&sink, LoadConfig::default()).unwrap();
        let outcome = loader.load_file(Path::new("/nonexistent/input.json"), "t");

        assert!(!outcome.success);
        assert_eq!(outcome.errors.len(), 1);
    }

    #[test]
    fn test_empty_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "empty.json", "[]");

        let sink = SqliteSink::open_in_memory().unwrap();
        let loader = FileLoader::new(&sink, LoadConfig::default()).unwrap();
        let outcome = loader.load_file(&path, "empty");

        assert!(!outcome.success);
        assert_eq!(outcome.rows_inserted, 0);
        assert!(outcome.errors[0].contains("no records"));
    }

    #[test]
    fn test_load_multiple_name_mismatch() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let loader = FileLoader::new(&sink, LoadConfig::default()).unwrap();

        let files = vec![PathBuf::from("a.json"), PathBuf::from("b.json")];
        let tables = vec!["only_one".to_string()];
        assert!(matches!(
            loader.load_multiple(&files, Some(tables.as_slice())),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_preview_covers_child_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "orders.json",
            r#"[{"id": 1, "receipts": [{"amount": 2.5}]}]"#,
        );
        let config = LoadConfig::from_toml_str(
            "[[policies]]\nfield = \"receipts\"\npolicy = \"child\"\ntable = \"{table}_receipts\"\n",
        )
        .unwrap();

        let previews = preview(&path, "orders", &config, None).unwrap();
        assert_eq!(previews.len(), 2);
        assert_eq!(previews[0].table, "orders");
        assert_eq!(previews[1].table, "orders_receipts");

        let amount = previews[1].columns.iter().find(|c| c.name == "amount").unwrap();
        assert_eq!(amount.sql_type, crate::schema::SqlType::Double);
    }

    #[test]
    fn test_preview_samples_leading_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "users.json",
            r#"[{"id": 1, "name": "a"}, {"id": 2, "name": "b"}, {"id": 3, "email": "c@x", "_id": "x"}]"#,
        );

        let sampled = preview(&path, "users", &LoadConfig::default(), Some(2)).unwrap();
        let names: Vec<&str> = sampled[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "_row_id"]);

        let full = preview(&path, "users", &LoadConfig::default(), None).unwrap();
        let names: Vec<&str> = full[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "name", "_row_id", "email", "_data_id"]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let sink = SqliteSink::open_in_memory().unwrap();
        let config = LoadConfig {
            chunk_size: 0,
            ..LoadConfig::default()
        };
        assert!(FileLoader::new(&sink, config).is_err());
    }
}
