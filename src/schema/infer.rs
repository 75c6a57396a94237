//! Column type inference from sampled values
//!
//! Statistics are accumulated in one pass over the sample and the SQL type is
//! decided once at the end, the same streaming-accumulator approach used for
//! JSON Schema inference elsewhere.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

static ISO_DATETIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?$").unwrap()
});

static ISO_DATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Longest string (in chars) still stored as `VARCHAR`
const VARCHAR_LIMIT: usize = 256;

/// Longest string (in chars) still stored as `TEXT`
const TEXT_LIMIT: usize = 65536;

/// Column types the synthesizer can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    BigInt,
    Double,
    Boolean,
    DateTime,
    Date,
    Varchar(u32),
    Text,
    LongText,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Double => f.write_str("DOUBLE"),
            SqlType::Boolean => f.write_str("BOOLEAN"),
            SqlType::DateTime => f.write_str("DATETIME"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::Varchar(len) => write!(f, "VARCHAR({})", len),
            SqlType::Text => f.write_str("TEXT"),
            SqlType::LongText => f.write_str("LONGTEXT"),
        }
    }
}

/// Tunables for type inference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Largest integer magnitude stored as `BIGINT`; anything beyond becomes `DOUBLE`
    pub integer_bound: u64,

    /// Extra characters added to the longest sampled string for `VARCHAR(n)`
    pub varchar_margin: u32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            integer_bound: i64::MAX as u64,
            varchar_margin: 10,
        }
    }
}

/// Temporal string formats recognized as dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Date,
    DateTime,
}

/// Accumulated statistics about one column's sample
#[derive(Debug, Default)]
struct ColumnStats {
    non_null: usize,
    booleans: usize,
    integers: usize,
    floats: usize,
    out_of_bound: usize,
    strings: usize,
    dates: usize,
    datetimes: usize,
    /// Longest value, in chars, as it would be stored
    max_len: usize,
}

impl ColumnStats {
    fn add_value(&mut self, value: &Value, config: &InferenceConfig) {
        if value.is_null() {
            return;
        }
        self.non_null += 1;

        match value {
            Value::Bool(_) => {
                self.booleans += 1;
                self.track_len(value.to_string().len());
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    self.integers += 1;
                    if i.unsigned_abs() > config.integer_bound {
                        self.out_of_bound += 1;
                    }
                } else if let Some(u) = n.as_u64() {
                    self.integers += 1;
                    if u > config.integer_bound {
                        self.out_of_bound += 1;
                    }
                } else {
                    self.floats += 1;
                }
                self.track_len(n.to_string().len());
            }
            Value::String(s) => {
                self.strings += 1;
                match detect_temporal(s) {
                    Some(TemporalKind::Date) => self.dates += 1,
                    Some(TemporalKind::DateTime) => self.datetimes += 1,
                    None => {}
                }
                self.track_len(s.chars().count());
            }
            Value::Array(_) | Value::Object(_) => {
                // Rows never hold these, but a raw sample might
                self.track_len(value.to_string().chars().count());
            }
            Value::Null => {}
        }
    }

    fn track_len(&mut self, len: usize) {
        self.max_len = self.max_len.max(len);
    }

    fn build(&self, config: &InferenceConfig) -> SqlType {
        if self.non_null == 0 {
            // Nothing to go on: later batches may bring anything
            return SqlType::Text;
        }

        if self.booleans == self.non_null {
            return SqlType::Boolean;
        }

        if self.integers + self.floats == self.non_null {
            if self.floats > 0 || self.out_of_bound > 0 {
                return SqlType::Double;
            }
            return SqlType::BigInt;
        }

        if self.strings == self.non_null && self.dates + self.datetimes == self.strings {
            if self.datetimes == 0 {
                return SqlType::Date;
            }
            return SqlType::DateTime;
        }

        if self.max_len < VARCHAR_LIMIT {
            SqlType::Varchar(self.max_len as u32 + config.varchar_margin)
        } else if self.max_len < TEXT_LIMIT {
            SqlType::Text
        } else {
            SqlType::LongText
        }
    }
}

/// Infer the SQL type for a column from a sample of its values
pub fn infer_type<'a, I>(values: I, config: &InferenceConfig) -> SqlType
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut stats = ColumnStats::default();
    for value in values {
        stats.add_value(value, config);
    }
    stats.build(config)
}

/// Detect whether a string is a date or date-time.
///
/// The regex only screens the shape; chrono then rejects impossible
/// calendar values such as `2024-13-45`.
pub fn detect_temporal(value: &str) -> Option<TemporalKind> {
    let len = value.len();

    // ISO Date - fixed length with fast pattern
    if len == 10 && value.as_bytes()[4] == b'-' && value.as_bytes()[7] == b'-' {
        if is_iso_date(value) {
            return Some(TemporalKind::Date);
        }
        return None;
    }

    // DateTime - check length and separator before regex
    if len >= 19 && matches!(value.as_bytes()[10], b'T' | b' ') && is_iso_datetime(value) {
        return Some(TemporalKind::DateTime);
    }

    None
}

fn is_iso_date(s: &str) -> bool {
    ISO_DATE_REGEX.is_match(s) && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn is_iso_datetime(s: &str) -> bool {
    if !ISO_DATETIME_REGEX.is_match(s) {
        return false;
    }

    DateTime::parse_from_rfc3339(s).is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z").is_ok()
        || DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn infer(values: &[Value]) -> SqlType {
        infer_type(values, &InferenceConfig::default())
    }

    #[test]
    fn test_integers() {
        assert_eq!(infer(&[json!(1), json!(-20), json!(null)]), SqlType::BigInt);
    }

    #[test]
    fn test_float_widens_to_double() {
        assert_eq!(infer(&[json!(1), json!(2.5)]), SqlType::Double);
    }

    #[test]
    fn test_integer_bound() {
        assert_eq!(infer(&[json!(u64::MAX)]), SqlType::Double);

        let config = InferenceConfig {
            integer_bound: 1000,
            ..InferenceConfig::default()
        };
        assert_eq!(infer_type(&[json!(999)], &config), SqlType::BigInt);
        assert_eq!(infer_type(&[json!(-1001)], &config), SqlType::Double);
    }

    #[test]
    fn test_booleans() {
        assert_eq!(infer(&[json!(true), json!(false)]), SqlType::Boolean);
    }

    #[test]
    fn test_temporal() {
        assert_eq!(infer(&[json!("2021-01-01"), json!("2021-12-31")]), SqlType::Date);
        assert_eq!(
            infer(&[json!("2021-01-01T10:00:00Z"), json!("2021-01-02 08:30:00")]),
            SqlType::DateTime
        );
        // A date mixed with date-times widens to DATETIME
        assert_eq!(
            infer(&[json!("2021-01-01"), json!("2021-01-02T08:30:00.123+02:00")]),
            SqlType::DateTime
        );
    }

    #[test]
    fn test_invalid_calendar_dates_are_strings() {
        assert_eq!(detect_temporal("2024-13-45"), None);
        assert_eq!(infer(&[json!("2024-13-45")]), SqlType::Varchar(20));
    }

    #[test]
    fn test_string_lengths() {
        assert_eq!(infer(&[json!("abc"), json!("a")]), SqlType::Varchar(13));

        let long = "x".repeat(300);
        assert_eq!(infer(&[json!(long)]), SqlType::Text);

        let huge = "x".repeat(70_000);
        assert_eq!(infer(&[json!(huge)]), SqlType::LongText);
    }

    #[test]
    fn test_mixed_values_use_serialized_length() {
        assert_eq!(infer(&[json!(12345), json!("ab")]), SqlType::Varchar(15));
        assert_eq!(infer(&[json!(true), json!(1)]), SqlType::Varchar(14));
    }

    #[test]
    fn test_empty_sample_is_wide_text() {
        assert_eq!(infer(&[]), SqlType::Text);
        assert_eq!(infer(&[json!(null), json!(null)]), SqlType::Text);
    }

    #[test]
    fn test_display() {
        assert_eq!(SqlType::Varchar(42).to_string(), "VARCHAR(42)");
        assert_eq!(SqlType::LongText.to_string(), "LONGTEXT");
    }
}
