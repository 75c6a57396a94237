use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Synthetic identifier column assigned to every main row
pub const ROW_ID_COLUMN: &str = "_row_id";

/// Column on child rows pointing back at the main row's `_row_id`
pub const PARENT_ID_COLUMN: &str = "_parent_id";

/// Column used for values that have no field name of their own
/// (non-object records, scalar elements moved into child tables)
pub const VALUE_COLUMN: &str = "_value";

/// Identifier correlating a main row with its child rows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowId(pub String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        RowId(id.into())
    }

    /// Allocate a fresh random (v4) identifier
    pub fn generate() -> Self {
        RowId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One flat row destined for a sink table.
///
/// Columns keep insertion order. Values are always scalars: inserting an
/// object or array stores its JSON text instead, so nested data can never
/// reach the sink undecomposed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    columns: Map<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Row { columns: Map::new() }
    }

    /// Set a column, serializing composite values to JSON text.
    /// Re-inserting an existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), scalarize(value));
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        self.columns.shift_remove(column)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// Exact match first, then the first column equal ignoring ASCII case
    pub fn get_ignore_case(&self, column: &str) -> Option<&Value> {
        self.get(column).or_else(|| {
            self.columns
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, value)| value)
        })
    }

    pub fn contains_ignore_case(&self, column: &str) -> bool {
        self.columns.keys().any(|name| name.eq_ignore_ascii_case(column))
    }

    /// A name for a new column: `candidate` itself, or `{candidate}_{n}` for
    /// the smallest `n >= 2` that clashes (ignoring case) with neither an
    /// existing column nor one of `reserved`.
    pub fn free_name(&self, candidate: &str, reserved: &[&str]) -> String {
        let taken = |name: &str| {
            self.contains_ignore_case(name) || reserved.iter().any(|r| r.eq_ignore_ascii_case(name))
        };
        if !taken(candidate) {
            return candidate.to_string();
        }

        let mut n = 2;
        loop {
            let name = format!("{}_{}", candidate, n);
            if !taken(&name) {
                return name;
            }
            n += 1;
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &String> {
        self.columns.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// The `_row_id` of a main row, if assigned
    pub fn row_id(&self) -> Option<&str> {
        self.get(ROW_ID_COLUMN).and_then(Value::as_str)
    }

    /// The `_parent_id` of a child row, if present
    pub fn parent_id(&self) -> Option<&str> {
        self.get(PARENT_ID_COLUMN).and_then(Value::as_str)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.columns
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// Replace objects and arrays with their canonical JSON text
pub fn scalarize(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => Value::String(value.to_string()),
        scalar => scalar,
    }
}

/// What to do when the destination table already exists on the first write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IfExists {
    /// Refuse to load into a table that already holds rows
    Fail,
    /// Drop and recreate the table
    Replace,
    /// Keep the table and only add missing columns
    #[default]
    Append,
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IfExists::Fail => "fail",
            IfExists::Replace => "replace",
            IfExists::Append => "append",
        };
        f.write_str(name)
    }
}

/// Result of loading rows into one table (or one file, for file-level loads)
#[derive(Debug, Clone, Serialize)]
pub struct LoadOutcome {
    pub success: bool,
    pub table: String,
    pub rows_inserted: usize,
    pub rows_failed: usize,
    pub duration: Duration,
    pub errors: Vec<String>,
    /// Shape surprises absorbed during decomposition
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcomes of child tables loaded after this (main) table
    pub children: Vec<LoadOutcome>,
}

impl LoadOutcome {
    /// Start an outcome clock for `table`
    pub(crate) fn begin(table: &str) -> OutcomeClock {
        OutcomeClock {
            table: table.to_string(),
            started_at: Utc::now(),
            timer: std::time::Instant::now(),
        }
    }

    /// Fraction of rows written, 0 when nothing was attempted
    pub fn success_rate(&self) -> f64 {
        let total = self.rows_inserted + self.rows_failed;
        if total == 0 {
            return 0.0;
        }
        self.rows_inserted as f64 / total as f64
    }

    /// Rows inserted across this table and all child tables
    pub fn total_rows_inserted(&self) -> usize {
        self.rows_inserted
            + self
                .children
                .iter()
                .map(LoadOutcome::total_rows_inserted)
                .sum::<usize>()
    }
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.success { "✓" } else { "✗" };
        write!(
            f,
            "{} {}: {} rows ({:.1}% success) in {:.2}s",
            mark,
            self.table,
            self.rows_inserted,
            self.success_rate() * 100.0,
            self.duration.as_secs_f64()
        )
    }
}

/// Captures start time so an outcome can be finished from any exit path
#[derive(Debug)]
pub(crate) struct OutcomeClock {
    table: String,
    started_at: DateTime<Utc>,
    timer: std::time::Instant,
}

impl OutcomeClock {
    pub(crate) fn finish(
        self,
        rows_inserted: usize,
        rows_failed: usize,
        errors: Vec<String>,
    ) -> LoadOutcome {
        LoadOutcome {
            success: errors.is_empty(),
            table: self.table,
            rows_inserted,
            rows_failed,
            duration: self.timer.elapsed(),
            errors,
            warnings: Vec::new(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            children: Vec::new(),
        }
    }

    /// Finish with the counts of a table-level outcome, timed from this clock
    pub(crate) fn finish_with(self, inner: LoadOutcome) -> LoadOutcome {
        LoadOutcome {
            table: self.table,
            duration: self.timer.elapsed(),
            started_at: self.started_at,
            finished_at: Utc::now(),
            ..inner
        }
    }
}
