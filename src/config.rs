//! TOML configuration for a load.
//!
//! Example configuration:
//! ```toml
//! chunk_size = 5000
//! if_exists = "append"
//! link_keys = ["orderId"]
//! nested_explode_keys = ["receipts"]
//!
//! [[policies]]
//! field = "paymentTerm"
//! policy = "flatten_one_level"
//!
//! [[policies]]
//! field = "units"
//! policy = "explode_to_rows"
//!
//! [[policies]]
//! field = "receipts"
//! policy = "move_to_child_table"
//! table = "{table}_receipts"
//! retain_count = true
//!
//! [sink]
//! path = "${DATA_DIR}/warehouse.db"
//! pool_size = 4
//!
//! [inference]
//! varchar_margin = 10
//! ```

use crate::error::{Error, Result};
use crate::ingest::InputFormat;
use crate::loader::DEFAULT_CHUNK_SIZE;
use crate::melt::{DecomposeConfig, PolicyEntry, PolicyTable};
use crate::schema::InferenceConfig;
use crate::types::IfExists;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "INGOT_CONFIG";

/// Config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ingot.toml";

static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Everything that shapes one load
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Rows per insert transaction
    pub chunk_size: usize,

    /// What to do when the destination table already exists
    pub if_exists: IfExists,

    /// Treat input as newline-delimited JSON regardless of its extension
    pub lines: bool,

    pub format: InputFormat,

    /// Field policies, in declaration order
    pub policies: Vec<PolicyEntry>,

    /// Fields copied from the main row onto every child row
    pub link_keys: Vec<String>,

    /// Keys inside exploded elements that are exploded once more
    pub nested_explode_keys: Vec<String>,

    /// Fail on shape surprises instead of recording warnings
    pub strict: bool,

    pub sink: SinkSettings,

    pub inference: InferenceConfig,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            if_exists: IfExists::default(),
            lines: false,
            format: InputFormat::default(),
            policies: Vec::new(),
            link_keys: Vec::new(),
            nested_explode_keys: Vec::new(),
            strict: false,
            sink: SinkSettings::default(),
            inference: InferenceConfig::default(),
        }
    }
}

/// Destination database settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SinkSettings {
    /// SQLite database file (supports `${ENV_VAR}` expansion)
    pub path: String,

    /// Connections kept open
    pub pool_size: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            path: "ingot.db".to_string(),
            pool_size: 4,
        }
    }
}

impl SinkSettings {
    /// Database path with environment variables expanded
    pub fn resolved_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(expand_env_vars(&self.path)?))
    }
}

impl LoadConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: LoadConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Config(format!("config file not found: {}", path.display())));
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// Load from `$INGOT_CONFIG`, then `./ingot.toml`, else defaults
    pub fn load() -> Result<Self> {
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            return Self::from_file(path);
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(local);
        }

        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        if self.sink.pool_size == 0 {
            return Err(Error::Config("sink.pool_size must be at least 1".to_string()));
        }
        self.policy_table()?;
        Ok(())
    }

    /// Policy table as declared, with `{table}` placeholders still unbound
    pub fn policy_table(&self) -> Result<PolicyTable> {
        PolicyTable::from_entries(self.policies.iter().cloned())
    }

    /// Decomposer settings for loading into `table`
    pub fn decompose_config(&self, table: &str) -> Result<DecomposeConfig> {
        Ok(DecomposeConfig {
            policies: self.policy_table()?.bind(table),
            link_keys: self.link_keys.clone(),
            nested_explode_keys: self.nested_explode_keys.clone(),
            strict: self.strict,
        })
    }

    /// Input framing, with `lines = true` forcing NDJSON
    pub fn input_format(&self) -> InputFormat {
        if self.lines {
            InputFormat::Ndjson
        } else {
            self.format
        }
    }
}

/// Expand `${VAR}` references; an unset variable is an error
pub fn expand_env_vars(s: &str) -> Result<String> {
    let mut missing = None;
    let expanded = ENV_VAR_REGEX.replace_all(s, |caps: &Captures| match env::var(&caps[1]) {
        Ok(value) => value,
        Err(_) => {
            missing.get_or_insert_with(|| caps[1].to_string());
            String::new()
        }
    });

    match missing {
        Some(name) => Err(Error::Config(format!("missing environment variable: {}", name))),
        None => Ok(expanded.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melt::FieldPolicy;

    #[test]
    fn test_defaults() {
        let config = LoadConfig::from_toml_str("").unwrap();
        assert_eq!(config.chunk_size, 5000);
        assert_eq!(config.if_exists, IfExists::Append);
        assert_eq!(config.input_format(), InputFormat::Auto);
        assert_eq!(config.sink.pool_size, 4);
        assert_eq!(config.inference, InferenceConfig::default());
    }

    #[test]
    fn test_full_config() {
        let config = LoadConfig::from_toml_str(
            r#"
            chunk_size = 100
            if_exists = "replace"
            lines = true
            link_keys = ["orderId"]
            nested_explode_keys = ["receipts"]
            strict = true

            [[policies]]
            field = "paymentTerm"
            policy = "flatten"

            [[policies]]
            field = "receipts"
            policy = "move_to_child_table"
            table = "{table}_receipts"
            retain_count = true

            [sink]
            path = "out.db"
            pool_size = 2

            [inference]
            varchar_margin = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.if_exists, IfExists::Replace);
        assert_eq!(config.input_format(), InputFormat::Ndjson);
        assert_eq!(config.inference.varchar_margin, 5);
        assert_eq!(config.inference.integer_bound, i64::MAX as u64);

        let decompose = config.decompose_config("orders").unwrap();
        assert!(decompose.strict);
        assert_eq!(decompose.link_keys, vec!["orderId"]);
        assert_eq!(
            decompose.policies.get("paymentTerm"),
            Some(&FieldPolicy::FlattenOneLevel)
        );
        assert_eq!(decompose.policies.child_tables(), vec!["orders_receipts"]);
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            LoadConfig::from_toml_str("chunk_size = 0"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            LoadConfig::from_toml_str("if_exists = \"sometimes\""),
            Err(Error::Toml(_))
        ));
        assert!(matches!(
            LoadConfig::from_toml_str("[[policies]]\nfield = \"x\"\npolicy = \"child\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingot.toml");
        fs::write(&path, "chunk_size = 10\n").unwrap();

        assert_eq!(LoadConfig::from_file(&path).unwrap().chunk_size, 10);
        assert!(LoadConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_expand_env_vars() {
        env::set_var("INGOT_TEST_DATA_DIR", "/var/data");
        assert_eq!(
            expand_env_vars("${INGOT_TEST_DATA_DIR}/w.db").unwrap(),
            "/var/data/w.db"
        );
        assert_eq!(expand_env_vars("plain.db").unwrap(), "plain.db");
        assert!(expand_env_vars("${INGOT_TEST_SURELY_UNSET_VAR}").is_err());
    }
}
