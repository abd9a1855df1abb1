//! YAML configuration and rule files.
//!
//! A rule file maps property names to either a literal or a path:
//!
//! ```yaml
//! rules:
//!   author:
//!     literal: Thomas
//!   updateTime:
//!     path: [titles, 1, updateTime]
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::path::{FieldPath, PathSegment};
use crate::rule::{Rule, RuleSet};
use crate::value::FieldValue;

/// Error type for loading configuration and rule files
#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse(serde_yaml::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse(e) => write!(f, "Failed to parse YAML: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Parse(err)
    }
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ModelistConfig {
    /// Default strict mode for collections built by the CLI.
    pub strict: bool,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ModelistConfig {
    fn default() -> Self {
        Self {
            strict: false,
            log_filter: "warn".to_string(),
        }
    }
}

impl ModelistConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// let config = ModelistConfig::load_from_file("config/modelist.yaml")?;
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = read_file(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        // An empty document means all defaults.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }
}

/// One step of a path rule in a rule file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StepSpec {
    Index(usize),
    Field(String),
}

impl From<&StepSpec> for PathSegment {
    fn from(step: &StepSpec) -> Self {
        match step {
            StepSpec::Index(index) => PathSegment::Index(*index),
            StepSpec::Field(name) => PathSegment::Field(name.clone()),
        }
    }
}

/// One entry of a rule file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Path { path: Vec<StepSpec> },
    Literal { literal: JsonValue },
}

impl RuleSpec {
    pub fn to_rule(&self) -> Rule {
        match self {
            RuleSpec::Path { path } => Rule::Path(FieldPath::new(path)),
            RuleSpec::Literal { literal } => Rule::Literal(FieldValue::from(literal)),
        }
    }
}

/// Rules loaded from YAML, in file order.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: IndexMap<String, RuleSpec>,
}

impl RuleFile {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = read_file(path)?;
        let file = Self::from_yaml_str(&contents)?;
        tracing::info!("loaded {} rule(s) from {}", file.rules.len(), path.display());
        Ok(file)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn to_rule_set(&self) -> RuleSet {
        self.rules
            .iter()
            .map(|(key, spec)| (key.as_str(), spec.to_rule()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_defaults() {
        let config = ModelistConfig::from_yaml_str("strict: true\n").unwrap();
        assert!(config.strict);
        assert_eq!(config.log_filter, "warn");

        assert_eq!(ModelistConfig::from_yaml_str("").unwrap(), ModelistConfig::default());
    }

    #[test]
    fn test_rule_file_round_trip_to_rule_set() {
        let file = RuleFile::from_yaml_str(
            "rules:\n  author:\n    literal: Thomas\n  updateTime:\n    path: [titles, 1, updateTime]\n",
        )
        .unwrap();

        let rules = file.to_rule_set();
        let keys: Vec<&str> = rules.keys().collect();
        assert_eq!(keys, vec!["author", "updateTime"]);
        assert!(matches!(rules.get("author"), Some(Rule::Literal(v)) if *v == FieldValue::from("Thomas")));
        assert!(matches!(rules.get("updateTime"), Some(Rule::Path(p)) if p.len() == 3));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "log_filter: debug").unwrap();

        let config = ModelistConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.log_filter, "debug");
        assert!(!config.strict);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = RuleFile::load_from_file("/nonexistent/rules.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_malformed_rule_is_parse_error() {
        let err = RuleFile::from_yaml_str("rules:\n  a:\n    neither: 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
