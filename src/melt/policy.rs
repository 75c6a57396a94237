//! Per-field decomposition policies
//!
//! A [`PolicyTable`] is supplied by the caller for each logical data source
//! and decides, field by field, how a record is split into main-row columns,
//! extra main rows, or child-table rows. Fields that are not listed fall back
//! to a default chosen from the value's shape.

use crate::error::{Error, Result};
use crate::melt::classify::{classify, ValueShape};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Placeholder replaced by the destination table name in child-table names
pub const TABLE_PLACEHOLDER: &str = "{table}";

/// Treatment applied to one field of every record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPolicy {
    /// Copy the value verbatim (composites still end up as JSON text)
    PassThrough,
    /// Store the value as one column holding its JSON text
    SerializeAsText,
    /// Spread an object's keys into `{field}{Key}` columns
    FlattenOneLevel,
    /// Turn each array element into its own main row
    ExplodeToRows,
    /// Move each array element into a row of a child table
    MoveToChildTable {
        table: String,
        /// Keep a `{field}_count` column on the main row
        retain_count: bool,
    },
}

impl FieldPolicy {
    pub fn child(table: impl Into<String>) -> Self {
        FieldPolicy::MoveToChildTable {
            table: table.into(),
            retain_count: false,
        }
    }

    /// Name of the shape this policy requires, if it requires one
    pub(crate) fn expected_shape(&self) -> Option<&'static str> {
        match self {
            FieldPolicy::FlattenOneLevel => Some("an object"),
            FieldPolicy::ExplodeToRows | FieldPolicy::MoveToChildTable { .. } => Some("an array"),
            FieldPolicy::PassThrough | FieldPolicy::SerializeAsText => None,
        }
    }
}

static PASS_THROUGH: FieldPolicy = FieldPolicy::PassThrough;
static SERIALIZE_AS_TEXT: FieldPolicy = FieldPolicy::SerializeAsText;

/// Policy names as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[serde(alias = "pass")]
    PassThrough,
    #[serde(alias = "serialize", alias = "text")]
    SerializeAsText,
    #[serde(alias = "flatten")]
    FlattenOneLevel,
    #[serde(alias = "explode")]
    ExplodeToRows,
    #[serde(alias = "child")]
    MoveToChildTable,
}

/// One `[[policies]]` entry of a configuration file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub field: String,
    pub policy: PolicyKind,
    /// Child table name, required for `move_to_child_table`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub retain_count: bool,
}

impl PolicyEntry {
    fn into_policy(self) -> Result<(String, FieldPolicy)> {
        let policy = match self.policy {
            PolicyKind::PassThrough => FieldPolicy::PassThrough,
            PolicyKind::SerializeAsText => FieldPolicy::SerializeAsText,
            PolicyKind::FlattenOneLevel => FieldPolicy::FlattenOneLevel,
            PolicyKind::ExplodeToRows => FieldPolicy::ExplodeToRows,
            PolicyKind::MoveToChildTable => {
                let table = self.table.filter(|t| !t.is_empty()).ok_or_else(|| {
                    Error::Config(format!(
                        "policy for `{}` moves to a child table but names no table",
                        self.field
                    ))
                })?;
                FieldPolicy::MoveToChildTable {
                    table,
                    retain_count: self.retain_count,
                }
            }
        };
        Ok((self.field, policy))
    }
}

/// Ordered field → policy mapping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyTable {
    entries: Vec<(String, FieldPolicy)>,
    index: HashMap<String, usize>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from configuration entries, keeping their order
    pub fn from_entries(entries: impl IntoIterator<Item = PolicyEntry>) -> Result<Self> {
        let mut table = PolicyTable::new();
        for entry in entries {
            let (field, policy) = entry.into_policy()?;
            table.insert(field, policy);
        }
        Ok(table)
    }

    /// Add a policy (builder form)
    pub fn with(mut self, field: impl Into<String>, policy: FieldPolicy) -> Self {
        self.insert(field, policy);
        self
    }

    /// Set the policy for `field`. Redeclaring a field keeps its original position.
    pub fn insert(&mut self, field: impl Into<String>, policy: FieldPolicy) {
        let field = field.into();
        match self.index.get(&field) {
            Some(&pos) => self.entries[pos].1 = policy,
            None => {
                self.index.insert(field.clone(), self.entries.len());
                self.entries.push((field, policy));
            }
        }
    }

    /// Declared policy for `field`, without default fallback
    pub fn get(&self, field: &str) -> Option<&FieldPolicy> {
        self.index.get(field).map(|&pos| &self.entries[pos].1)
    }

    /// Policy to apply to `field` holding `value`.
    ///
    /// Unlisted fields pass scalars through and serialize objects and arrays.
    pub fn resolve(&self, field: &str, value: &Value) -> &FieldPolicy {
        if let Some(policy) = self.get(field) {
            return policy;
        }
        match classify(value) {
            ValueShape::Scalar => &PASS_THROUGH,
            ValueShape::Object
            | ValueShape::ArrayOfObject
            | ValueShape::ArrayOfScalar
            | ValueShape::EmptyArray => &SERIALIZE_AS_TEXT,
        }
    }

    /// Child tables in declaration order, without duplicates
    pub fn child_tables(&self) -> Vec<&str> {
        let mut tables: Vec<&str> = Vec::new();
        for (_, policy) in &self.entries {
            if let FieldPolicy::MoveToChildTable { table, .. } = policy {
                if !tables.contains(&table.as_str()) {
                    tables.push(table);
                }
            }
        }
        tables
    }

    /// Copy of this table with `{table}` in child-table names replaced by `table_name`
    pub fn bind(&self, table_name: &str) -> PolicyTable {
        let mut bound = self.clone();
        for (_, policy) in bound.entries.iter_mut() {
            if let FieldPolicy::MoveToChildTable { table, .. } = policy {
                *table = table.replace(TABLE_PLACEHOLDER, table_name);
            }
        }
        bound
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldPolicy)> {
        self.entries.iter().map(|(field, policy)| (field.as_str(), policy))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_resolution() {
        let table = PolicyTable::new();
        assert_eq!(table.resolve("id", &json!(1)), &FieldPolicy::PassThrough);
        assert_eq!(table.resolve("meta", &json!({"a": 1})), &FieldPolicy::SerializeAsText);
        assert_eq!(table.resolve("tags", &json!([])), &FieldPolicy::SerializeAsText);
    }

    #[test]
    fn test_declared_policy_wins() {
        let table = PolicyTable::new().with("company", FieldPolicy::FlattenOneLevel);
        // Declared policy applies even when the value has the wrong shape
        assert_eq!(table.resolve("company", &json!(null)), &FieldPolicy::FlattenOneLevel);
    }

    #[test]
    fn test_child_tables_in_declaration_order() {
        let table = PolicyTable::new()
            .with("units", FieldPolicy::child("t_units"))
            .with("company", FieldPolicy::FlattenOneLevel)
            .with("receipts", FieldPolicy::child("t_receipts"))
            .with("more_units", FieldPolicy::child("t_units"));

        assert_eq!(table.child_tables(), vec!["t_units", "t_receipts"]);
    }

    #[test]
    fn test_redeclared_field_keeps_position() {
        let mut table = PolicyTable::new()
            .with("a", FieldPolicy::FlattenOneLevel)
            .with("b", FieldPolicy::ExplodeToRows);
        table.insert("a", FieldPolicy::SerializeAsText);

        let fields: Vec<&str> = table.iter().map(|(f, _)| f).collect();
        assert_eq!(fields, vec!["a", "b"]);
        assert_eq!(table.get("a"), Some(&FieldPolicy::SerializeAsText));
    }

    #[test]
    fn test_bind_table_placeholder() {
        let table = PolicyTable::new().with("receipts", FieldPolicy::child("{table}_receipts"));
        let bound = table.bind("orders");
        assert_eq!(bound.child_tables(), vec!["orders_receipts"]);
        // The original is untouched
        assert_eq!(table.child_tables(), vec!["{table}_receipts"]);
    }

    #[test]
    fn test_from_entries() {
        let entries = vec![
            PolicyEntry {
                field: "paymentTerm".into(),
                policy: PolicyKind::FlattenOneLevel,
                table: None,
                retain_count: false,
            },
            PolicyEntry {
                field: "receipts".into(),
                policy: PolicyKind::MoveToChildTable,
                table: Some("orders_receipts".into()),
                retain_count: true,
            },
        ];

        let table = PolicyTable::from_entries(entries).unwrap();
        assert_eq!(
            table.get("receipts"),
            Some(&FieldPolicy::MoveToChildTable {
                table: "orders_receipts".into(),
                retain_count: true
            })
        );
    }

    #[test]
    fn test_child_entry_without_table_is_rejected() {
        let entries = vec![PolicyEntry {
            field: "receipts".into(),
            policy: PolicyKind::MoveToChildTable,
            table: None,
            retain_count: false,
        }];

        let err = PolicyTable::from_entries(entries).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
