use crate::error::Result;
use crate::melt::decompose::Decomposition;
use crate::types::Row;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Column added by [`StreamWriter`] to tell tables apart in one stream
pub const TABLE_COLUMN: &str = "_table";

/// Writes decomposed rows to JSON Lines files, one `{table}.jsonl` per table
pub struct TableWriter {
    output_dir: PathBuf,
    writers: HashMap<String, BufWriter<File>>,
}

impl TableWriter {
    /// Create a writer for `output_dir`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        std::fs::create_dir_all(&output_dir)?;

        Ok(TableWriter {
            output_dir: output_dir.as_ref().to_path_buf(),
            writers: HashMap::new(),
        })
    }

    /// Append the main rows under `main_table` and every child table under its own name
    pub fn write(&mut self, main_table: &str, decomposition: &Decomposition) -> Result<()> {
        self.write_rows(main_table, &decomposition.main)?;
        for child in &decomposition.children {
            self.write_rows(&child.table, &child.rows)?;
        }
        Ok(())
    }

    pub fn write_rows(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        if !self.writers.contains_key(table) {
            let path = self.output_dir.join(format!("{}.jsonl", table));
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            self.writers.insert(table.to_string(), BufWriter::new(file));
        }

        if let Some(writer) = self.writers.get_mut(table) {
            for row in rows {
                serde_json::to_writer(&mut *writer, row)?;
                writer.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    /// Files written so far
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut tables: Vec<&String> = self.writers.keys().collect();
        tables.sort();
        tables
            .into_iter()
            .map(|t| self.output_dir.join(format!("{}.jsonl", t)))
            .collect()
    }

    /// Flush all writers
    pub fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Writes every row of every table into a single stream, tagged with `_table`
pub struct StreamWriter<W: Write> {
    writer: W,
}

impl<W: Write> StreamWriter<W> {
    pub fn new(writer: W) -> Self {
        StreamWriter { writer }
    }

    pub fn write(&mut self, main_table: &str, decomposition: &Decomposition) -> Result<()> {
        self.write_rows(main_table, &decomposition.main)?;
        for child in &decomposition.children {
            self.write_rows(&child.table, &child.rows)?;
        }
        Ok(())
    }

    fn write_rows(&mut self, table: &str, rows: &[Row]) -> Result<()> {
        for row in rows {
            let mut data = row.clone().into_map();
            data.insert(TABLE_COLUMN.to_string(), Value::String(table.to_string()));

            serde_json::to_writer(&mut self.writer, &data)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melt::{DecomposeConfig, Decomposer, FieldPolicy, PolicyTable};
    use serde_json::json;

    fn sample() -> Decomposition {
        let decomposer = Decomposer::new(DecomposeConfig {
            policies: PolicyTable::new().with("posts", FieldPolicy::child("users_posts")),
            ..DecomposeConfig::default()
        });
        decomposer
            .decompose(vec![json!({"name": "Alice", "posts": [{"title": "Hi"}]})])
            .unwrap()
    }

    #[test]
    fn test_stream_writer() {
        let mut buffer = Vec::new();
        let mut writer = StreamWriter::new(&mut buffer);
        writer.write("users", &sample()).unwrap();

        let output = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Alice"));
        assert!(lines[0].contains(r#""_table":"users""#));
        assert!(lines[1].contains(r#""_table":"users_posts""#));
    }

    #[test]
    fn test_table_writer_creates_one_file_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = TableWriter::new(dir.path()).unwrap();
        writer.write("users", &sample()).unwrap();
        writer.flush().unwrap();

        let paths = writer.paths();
        assert_eq!(paths.len(), 2);

        let users = std::fs::read_to_string(dir.path().join("users.jsonl")).unwrap();
        let row: Value = serde_json::from_str(users.trim()).unwrap();
        assert_eq!(row["name"], "Alice");

        let posts = std::fs::read_to_string(dir.path().join("users_posts.jsonl")).unwrap();
        let post: Value = serde_json::from_str(posts.trim()).unwrap();
        assert_eq!(post["_parent_id"], row["_row_id"]);
    }
}
