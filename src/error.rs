//! Error type for `ingot`.
//!
//! Only conditions that abort work are errors. Record shape surprises seen
//! during decomposition are reported as [`ShapeWarning`](crate::melt::ShapeWarning)s
//! instead, unless strict mode turns them into [`Error::Validation`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed JSON, or a top-level shape that is neither an array nor a
    /// `{"data": [...]}` wrapper.
    #[error("parsing error: {0}")]
    Parsing(String),

    /// DDL against the sink failed.
    #[error("schema error on `{table}`: {message}")]
    Schema { table: String, message: String },

    /// A bulk insert (or a load precondition) failed.
    #[error("loader error on `{table}`: {message}")]
    Loader { table: String, message: String },

    /// A field's runtime shape contradicts its declared policy (strict mode only).
    #[error("field `{field}` expected {expected}, found {found}")]
    Validation {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub(crate) fn schema(table: &str, err: impl std::fmt::Display) -> Self {
        Error::Schema {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn loader(table: &str, err: impl std::fmt::Display) -> Self {
        Error::Loader {
            table: table.to_string(),
            message: err.to_string(),
        }
    }

    /// Attribute a sink error to schema work on `table`, unless it already is
    pub(crate) fn into_schema(self, table: &str) -> Self {
        match self {
            Error::Schema { .. } => self,
            other => Error::schema(table, other),
        }
    }

    /// Attribute a sink error to loading `table`, unless it already is
    pub(crate) fn into_loader(self, table: &str) -> Self {
        match self {
            Error::Loader { .. } => self,
            other => Error::loader(table, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_are_wrapped_once() {
        let err = Error::loader("users", "connection lost").into_loader("users");
        assert_eq!(err.to_string(), "loader error on `users`: connection lost");

        let err = Error::Parsing("bad".into()).into_schema("users");
        assert_eq!(err.to_string(), "schema error on `users`: parsing error: bad");
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
