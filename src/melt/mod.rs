//! JSON decomposition - split nested records into relational rows
//!
//! This module turns each record into one flat main row (or several, when a
//! field is exploded) plus rows for child tables, correlated through
//! `_row_id` / `_parent_id`. How every field is treated is decided by a
//! caller-supplied [`PolicyTable`]; nothing here knows about particular
//! tables or data sources.

pub mod classify;
pub mod decompose;
pub mod policy;
pub mod writer;

pub use classify::{classify, ValueShape};
pub use decompose::{
    flatten_name, ChildRows, DecomposeConfig, DecomposeSession, Decomposer, Decomposition, ShapeWarning,
};
pub use policy::{FieldPolicy, PolicyEntry, PolicyKind, PolicyTable};
pub use writer::{StreamWriter, TableWriter};
