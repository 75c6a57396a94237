//! Reading raw JSON input into a sequence of records
//!
//! Three top-level shapes are accepted: an array of records, a
//! `{"data": [...]}` wrapper, and newline-delimited JSON (one record per
//! line). Documents are parsed with simd-json; NDJSON lines with serde_json.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Key of the wrapper object holding the record array
pub const DATA_KEY: &str = "data";

/// How input bytes are framed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// NDJSON for `.jsonl`/`.ndjson` files; otherwise a document, falling back
    /// to NDJSON when the whole input does not parse as one document
    #[default]
    Auto,
    /// One JSON array or `{"data": [...]}` wrapper
    Document,
    /// One JSON value per line
    Ndjson,
}

impl InputFormat {
    /// Resolve `Auto` from a file extension where it is decisive
    pub fn for_path(self, path: &Path) -> InputFormat {
        if self != InputFormat::Auto {
            return self;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("jsonl") || ext.eq_ignore_ascii_case("ndjson") => {
                InputFormat::Ndjson
            }
            _ => InputFormat::Auto,
        }
    }
}

/// Read all records from the file at `path`
pub fn read_path(path: &Path, format: InputFormat) -> Result<Vec<Value>> {
    let format = format.for_path(path);
    let mut content = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut content)?;
    tracing::debug!(path = %path.display(), bytes = content.len(), ?format, "read input");
    parse_bytes(content, format)
}

/// Read all records from any reader (for example stdin)
pub fn read_from<R: Read>(mut reader: R, format: InputFormat) -> Result<Vec<Value>> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    parse_bytes(content, format)
}

/// Split raw input bytes into records
pub fn parse_bytes(content: Vec<u8>, format: InputFormat) -> Result<Vec<Value>> {
    match format {
        InputFormat::Ndjson => parse_ndjson(utf8(&content)?),
        InputFormat::Document => records_from_document(parse_document(content)?),
        InputFormat::Auto => {
            // simd-json parses in place, so keep the original for the fallback
            match parse_document(content.clone()) {
                Ok(document) => records_from_document(document),
                Err(document_err) => {
                    tracing::debug!(error = %document_err, "not a single document, trying NDJSON");
                    let text = utf8(&content)?;
                    parse_ndjson(text).map_err(|_| document_err)
                }
            }
        }
    }
}

fn utf8(content: &[u8]) -> Result<&str> {
    std::str::from_utf8(content).map_err(|e| Error::Parsing(format!("input is not valid UTF-8: {}", e)))
}

/// Parse one JSON document using SIMD acceleration
pub fn parse_document(mut content: Vec<u8>) -> Result<Value> {
    simd_json::serde::from_slice::<Value>(&mut content).map_err(|e| Error::Parsing(e.to_string()))
}

/// Extract the records of a parsed document.
///
/// A top-level array is the record list; an object must wrap the list under
/// `"data"`. Anything else is rejected.
pub fn records_from_document(document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove(DATA_KEY) {
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err(Error::Parsing(format!(
                "`{}` must hold an array of records",
                DATA_KEY
            ))),
            None => Err(Error::Parsing(format!(
                "top-level object has no `{}` array; expected an array of records",
                DATA_KEY
            ))),
        },
        _ => Err(Error::Parsing(
            "expected an array of records or an object with a `data` array".to_string(),
        )),
    }
}

/// Parse newline-delimited JSON; blank lines are skipped
pub fn parse_ndjson(text: &str) -> Result<Vec<Value>> {
    NdjsonReader::new(text.as_bytes()).collect()
}

/// Streams records from newline-delimited JSON
pub struct NdjsonReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> NdjsonReader<R> {
    pub fn new(reader: R) -> Self {
        NdjsonReader {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for NdjsonReader<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            return Some(
                serde_json::from_str(line)
                    .map_err(|e| Error::Parsing(format!("line {}: {}", self.line_no, e))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(input: &str, format: InputFormat) -> Result<Vec<Value>> {
        parse_bytes(input.as_bytes().to_vec(), format)
    }

    #[test]
    fn test_array_document() {
        let records = parse(r#"[{"id": 1}, {"id": 2}]"#, InputFormat::Auto).unwrap();
        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn test_data_wrapper() {
        let records = parse(r#"{"data": [{"id": 1}], "meta": {}}"#, InputFormat::Document).unwrap();
        assert_eq!(records, vec![json!({"id": 1})]);
    }

    #[test]
    fn test_bare_object_is_rejected() {
        let err = parse(r#"{"foo": 1}"#, InputFormat::Auto).unwrap_err();
        assert!(matches!(err, Error::Parsing(_)));
    }

    #[test]
    fn test_scalar_document_is_rejected() {
        assert!(matches!(parse("42", InputFormat::Document), Err(Error::Parsing(_))));
        assert!(matches!(
            parse(r#"{"data": 1}"#, InputFormat::Document),
            Err(Error::Parsing(_))
        ));
    }

    #[test]
    fn test_auto_falls_back_to_ndjson() {
        let records = parse("{\"id\": 1}\n\n{\"id\": 2}\n", InputFormat::Auto).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], 2);
    }

    #[test]
    fn test_malformed_input() {
        let err = parse(r#"[{"id": 1},"#, InputFormat::Auto).unwrap_err();
        assert!(matches!(err, Error::Parsing(_)));

        let err = parse("{\"id\": 1}\n{oops}\n", InputFormat::Ndjson).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_input_has_no_records() {
        assert!(parse("", InputFormat::Ndjson).unwrap().is_empty());
        assert!(parse("  \n", InputFormat::Auto).unwrap().is_empty());
    }

    #[test]
    fn test_document_keeps_key_order() {
        let records = parse(r#"[{"z": 1, "a": 2, "m": 3}]"#, InputFormat::Document).unwrap();
        let keys: Vec<&String> = records[0].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn test_format_for_path() {
        assert_eq!(
            InputFormat::Auto.for_path(Path::new("events.JSONL")),
            InputFormat::Ndjson
        );
        assert_eq!(InputFormat::Auto.for_path(Path::new("data.json")), InputFormat::Auto);
        assert_eq!(
            InputFormat::Document.for_path(Path::new("events.ndjson")),
            InputFormat::Document
        );
    }

    #[test]
    fn test_read_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(&path, "{\"id\": 1}\n{\"id\": 2}\n").unwrap();

        let records = read_path(&path, InputFormat::Auto).unwrap();
        assert_eq!(records.len(), 2);
    }
}
