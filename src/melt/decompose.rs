use crate::error::{Error, Result};
use crate::melt::classify::classify;
use crate::melt::policy::{FieldPolicy, PolicyTable};
use crate::types::{Row, RowId, PARENT_ID_COLUMN, ROW_ID_COLUMN, VALUE_COLUMN};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Names a data column on a main row may never take
const MAIN_RESERVED: &[&str] = &[ROW_ID_COLUMN];

/// Configuration for decomposing records
#[derive(Debug, Clone, Default)]
pub struct DecomposeConfig {
    /// Per-field policies
    pub policies: PolicyTable,

    /// Business identifiers copied from the main row onto every child row
    pub link_keys: Vec<String>,

    /// Keys that, inside an exploded element, hold an array to explode one level further
    pub nested_explode_keys: Vec<String>,

    /// Fail instead of warning when a field's shape contradicts its policy
    pub strict: bool,
}

/// Rows destined for one child table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChildRows {
    pub table: String,
    pub rows: Vec<Row>,
}

/// A field whose value was not what decomposition needed, and what was done
/// about it instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeWarning {
    /// Zero-based position of the record in its input
    pub record: usize,
    pub field: String,
    pub expected: &'static str,
    pub found: &'static str,
    pub action: &'static str,
}

impl fmt::Display for ShapeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {}: field `{}` expected {}, found {}; {}",
            self.record, self.field, self.expected, self.found, self.action
        )
    }
}

/// Output of one decomposition pass
#[derive(Debug, Clone, Default)]
pub struct Decomposition {
    pub main: Vec<Row>,
    /// Child tables in policy declaration order (possibly empty)
    pub children: Vec<ChildRows>,
    pub warnings: Vec<ShapeWarning>,
}

impl Decomposition {
    fn with_tables(tables: Vec<&str>) -> Self {
        Decomposition {
            main: Vec::new(),
            children: tables
                .into_iter()
                .map(|table| ChildRows {
                    table: table.to_string(),
                    rows: Vec::new(),
                })
                .collect(),
            warnings: Vec::new(),
        }
    }

    /// Rows collected for a child table
    pub fn child(&self, table: &str) -> Option<&[Row]> {
        self.children
            .iter()
            .find(|c| c.table == table)
            .map(|c| c.rows.as_slice())
    }

    pub fn child_row_count(&self) -> usize {
        self.children.iter().map(|c| c.rows.len()).sum()
    }

    fn bucket_mut(&mut self, table: &str) -> &mut Vec<Row> {
        let pos = match self.children.iter().position(|c| c.table == table) {
            Some(pos) => pos,
            None => {
                self.children.push(ChildRows {
                    table: table.to_string(),
                    rows: Vec::new(),
                });
                self.children.len() - 1
            }
        };
        &mut self.children[pos].rows
    }
}

/// Splits nested JSON records into main rows and correlated child rows
pub struct Decomposer {
    config: DecomposeConfig,
}

impl Decomposer {
    pub fn new(config: DecomposeConfig) -> Self {
        Decomposer { config }
    }

    pub fn config(&self) -> &DecomposeConfig {
        &self.config
    }

    /// Start a pass that is fed one record at a time
    pub fn session(&self) -> DecomposeSession<'_> {
        DecomposeSession {
            decomposer: self,
            ids: HashSet::new(),
            records: 0,
            out: self.empty_output(),
        }
    }

    /// Decompose a sequence of records.
    ///
    /// Shape surprises are absorbed into [`Decomposition::warnings`]; only
    /// strict mode turns them into an error.
    pub fn decompose<I>(&self, records: I) -> Result<Decomposition>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut session = self.session();
        for record in records {
            session.push(record)?;
        }
        let out = session.finish();

        tracing::debug!(
            main_rows = out.main.len(),
            child_rows = out.child_row_count(),
            warnings = out.warnings.len(),
            "decomposed records"
        );

        Ok(out)
    }

    fn empty_output(&self) -> Decomposition {
        Decomposition::with_tables(self.config.policies.child_tables())
    }

    fn decompose_record(
        &self,
        idx: usize,
        record: Value,
        ids: &mut HashSet<String>,
        out: &mut Decomposition,
    ) -> Result<()> {
        let obj = match record {
            Value::Object(obj) => obj,
            other => {
                // Never drop data: keep the whole value as text
                let mut row = Row::new();
                row.insert(VALUE_COLUMN, Value::String(other.to_string()));
                row.insert(ROW_ID_COLUMN, Value::String(claim_id(idx, None, ids, out).0));
                out.main.push(row);
                return Ok(());
            }
        };

        let supplied = obj.get(ROW_ID_COLUMN).and_then(supplied_id);

        // Plain fields claim their names first, then flattened and count
        // columns, then exploded elements; field order never decides a name.
        let mut base = Row::new();
        let mut flattened: Vec<(String, Map<String, Value>)> = Vec::new();
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut exploded: Vec<(String, Vec<Value>)> = Vec::new();
        let mut moved: Vec<(String, Vec<Value>)> = Vec::new();

        for (field, value) in obj {
            if field == ROW_ID_COLUMN {
                continue;
            }

            let policy = self.config.policies.resolve(&field, &value);
            match policy {
                FieldPolicy::PassThrough | FieldPolicy::SerializeAsText => {
                    let name = base.free_name(&field, MAIN_RESERVED);
                    base.insert(name, value);
                }
                FieldPolicy::FlattenOneLevel => match value {
                    Value::Object(inner) => flattened.push((field, inner)),
                    other => self.shape_surprise(idx, &field, policy, &other, out)?,
                },
                FieldPolicy::ExplodeToRows => match value {
                    Value::Array(items) => exploded.push((field, items)),
                    other => self.shape_surprise(idx, &field, policy, &other, out)?,
                },
                FieldPolicy::MoveToChildTable { table, retain_count } => match value {
                    Value::Array(items) => {
                        if *retain_count {
                            counts.push((format!("{}_count", field), items.len()));
                        }
                        moved.push((table.clone(), items));
                    }
                    other => self.shape_surprise(idx, &field, policy, &other, out)?,
                },
            }
        }

        for (field, inner) in flattened {
            for (key, sub) in inner {
                let mut candidate = flatten_name(&field, &key);
                if base.contains_ignore_case(&candidate) {
                    candidate = format!("{}_{}", field, key);
                }
                let name = base.free_name(&candidate, MAIN_RESERVED);
                base.insert(name, sub);
            }
        }

        for (column, count) in counts {
            let name = base.free_name(&column, MAIN_RESERVED);
            base.insert(name, Value::from(count));
        }

        let mut rows = vec![base];
        for (field, items) in &exploded {
            rows = self.explode(field, &rows, items);
        }

        // Exploded into nothing: no main row, so no child rows either
        if rows.is_empty() {
            return Ok(());
        }

        let record_id = claim_id(idx, supplied, ids, out);
        for (n, row) in rows.iter_mut().enumerate() {
            let id = if n == 0 {
                record_id.clone()
            } else {
                claim_id(idx, None, ids, out)
            };
            row.insert(ROW_ID_COLUMN, Value::String(id.0));
        }

        // Children attach to the first row emitted for the record
        let links: Vec<(&str, Value)> = self
            .config
            .link_keys
            .iter()
            .filter_map(|key| rows[0].get(key).map(|v| (key.as_str(), v.clone())))
            .collect();

        for (table, items) in moved {
            let bucket = out.bucket_mut(&table);
            for item in items {
                bucket.push(child_row(&record_id, &links, item));
            }
        }

        out.main.extend(rows);
        Ok(())
    }

    /// Cross product of the rows built so far with the array's elements
    fn explode(&self, field: &str, rows: &[Row], items: &[Value]) -> Vec<Row> {
        let mut exploded = Vec::with_capacity(rows.len() * items.len());

        for row in rows {
            for (i, item) in items.iter().enumerate() {
                let Value::Object(element) = item else {
                    let mut copy = row.clone();
                    let name = copy.free_name(&format!("{}Value", field), MAIN_RESERVED);
                    copy.insert(name, item.clone());
                    exploded.push(copy);
                    continue;
                };

                let mut merged = row.clone();
                let mut nested: Option<(&str, &Vec<Value>)> = None;

                for (key, value) in element.iter() {
                    if nested.is_none() && self.is_nested_explode_key(key) {
                        if let Value::Array(arr) = value {
                            nested = Some((key.as_str(), arr));
                            continue;
                        }
                    }
                    match value {
                        Value::Object(inner) => {
                            for (sub_key, sub) in inner.iter() {
                                merge_column(&mut merged, row, field, i, flatten_name(key, sub_key), sub);
                            }
                        }
                        _ => merge_column(&mut merged, row, field, i, key.clone(), value),
                    }
                }

                match nested {
                    Some((key, arr)) if !arr.is_empty() => {
                        // Second and last level: nested arrays below this are kept as text
                        for nested_item in arr {
                            let mut copy = merged.clone();
                            match nested_item {
                                Value::Object(obj) => {
                                    for (sub_key, sub) in obj.iter() {
                                        let name = copy.free_name(&flatten_name(key, sub_key), MAIN_RESERVED);
                                        copy.insert(name, sub.clone());
                                    }
                                }
                                other => {
                                    let name = copy.free_name(&format!("{}Value", key), MAIN_RESERVED);
                                    copy.insert(name, other.clone());
                                }
                            }
                            exploded.push(copy);
                        }
                    }
                    _ => exploded.push(merged),
                }
            }
        }

        exploded
    }

    fn is_nested_explode_key(&self, key: &str) -> bool {
        self.config.nested_explode_keys.iter().any(|k| k == key)
    }

    /// Absorb (or, in strict mode, reject) a value whose shape contradicts its policy.
    /// Null counts as absent and is never reported.
    fn shape_surprise(
        &self,
        record: usize,
        field: &str,
        policy: &FieldPolicy,
        value: &Value,
        out: &mut Decomposition,
    ) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }

        let expected = policy.expected_shape().unwrap_or("a value");
        let found = classify(value).describe();

        if self.config.strict {
            return Err(Error::Validation {
                field: field.to_string(),
                expected,
                found,
            });
        }

        let warning = ShapeWarning {
            record,
            field: field.to_string(),
            expected,
            found,
            action: "no columns added",
        };
        tracing::debug!(%warning, "shape surprise absorbed");
        out.warnings.push(warning);
        Ok(())
    }
}

/// A decomposition pass fed one record at a time.
///
/// Row ids stay unique across everything pushed into the session, including
/// rows already handed out by [`DecomposeSession::take`].
pub struct DecomposeSession<'a> {
    decomposer: &'a Decomposer,
    ids: HashSet<String>,
    records: usize,
    out: Decomposition,
}

impl<'a> DecomposeSession<'a> {
    pub fn push(&mut self, record: Value) -> Result<()> {
        let idx = self.records;
        self.records += 1;
        self.decomposer.decompose_record(idx, record, &mut self.ids, &mut self.out)
    }

    /// Rows collected since the previous call
    pub fn take(&mut self) -> Decomposition {
        std::mem::replace(&mut self.out, self.decomposer.empty_output())
    }

    pub fn finish(self) -> Decomposition {
        self.out
    }
}

/// Column name for `key` flattened under `parent`: `{parent}{Key}`
pub fn flatten_name(parent: &str, key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => {
            let mut name = String::with_capacity(parent.len() + key.len());
            name.push_str(parent);
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
            name
        }
        None => parent.to_string(),
    }
}

/// A record's own `_row_id` as text; null counts as absent
fn supplied_id(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reserve a row id for this pass. A supplied id already taken is replaced
/// by a fresh one and reported.
fn claim_id(record: usize, supplied: Option<String>, ids: &mut HashSet<String>, out: &mut Decomposition) -> RowId {
    if let Some(id) = supplied {
        if ids.insert(id.clone()) {
            return RowId::new(id);
        }
        let warning = ShapeWarning {
            record,
            field: ROW_ID_COLUMN.to_string(),
            expected: "an id unused in this pass",
            found: "a repeated id",
            action: "a fresh id was generated",
        };
        tracing::debug!(%warning, "repeated row id replaced");
        out.warnings.push(warning);
    }

    let id = RowId::generate();
    ids.insert(id.0.clone());
    id
}

/// Merge an exploded element's column. A name the parent row already has
/// becomes `{field}_{i}_{key}`; any remaining clash gets a numeric suffix.
fn merge_column(merged: &mut Row, parent: &Row, field: &str, index: usize, column: String, value: &Value) {
    let candidate = if parent.contains_ignore_case(&column) || column.eq_ignore_ascii_case(ROW_ID_COLUMN) {
        format!("{}_{}_{}", field, index, column)
    } else {
        column
    };
    let name = merged.free_name(&candidate, MAIN_RESERVED);
    merged.insert(name, value.clone());
}

/// Correlation columns go in first; element keys that clash with them are renamed.
fn child_row(parent_id: &RowId, links: &[(&str, Value)], item: Value) -> Row {
    let mut child = Row::new();
    child.insert(PARENT_ID_COLUMN, Value::String(parent_id.0.clone()));
    for (key, value) in links {
        child.insert(*key, value.clone());
    }

    match item {
        Value::Object(element) => flatten_into(&mut child, element),
        other => insert_fresh(&mut child, VALUE_COLUMN, other),
    }
    child
}

fn flatten_into(row: &mut Row, element: Map<String, Value>) {
    for (key, value) in element {
        match value {
            Value::Object(inner) => {
                for (sub_key, sub) in inner {
                    insert_fresh(row, &flatten_name(&key, &sub_key), sub);
                }
            }
            other => insert_fresh(row, &key, other),
        }
    }
}

fn insert_fresh(row: &mut Row, column: &str, value: Value) {
    let name = row.free_name(column, &[]);
    row.insert(name, value);
}
