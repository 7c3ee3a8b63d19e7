//! YAML run configuration: where the dataset lives and which columns play
//! which role.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::interpreter::FIELD_COUNT;

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub description: Option<String>,
    pub dataset: PathBuf,
    pub identity_columns: Vec<String>,
    pub target_columns: Vec<String>,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl RunConfig {
    /// Reads, validates and resolves a configuration file.
    ///
    /// A relative `dataset` path is resolved against the directory holding the
    /// configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.dataset.is_relative() {
            if let Some(parent) = path.parent() {
                config.dataset = parent.join(&config.dataset);
            }
        }
        config.validate()?;
        debug!("Loaded configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.identity_columns.is_empty() {
            return Err(ConfigError::Invalid(
                "identity_columns must name at least one column".to_string(),
            ));
        }
        if self.target_columns.len() != FIELD_COUNT {
            return Err(ConfigError::Invalid(format!(
                "target_columns must name exactly {} columns, found {}",
                FIELD_COUNT,
                self.target_columns.len()
            )));
        }

        let mut seen = HashSet::new();
        for column in self.identity_columns.iter().chain(&self.target_columns) {
            let name = column.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("column names must not be blank".to_string()));
            }
            if !seen.insert(name) {
                return Err(ConfigError::Invalid(format!(
                    "column '{}' is listed more than once across identity_columns and target_columns",
                    name
                )));
            }
        }

        if let Some(delimiter) = self.delimiter {
            if !delimiter.is_ascii() {
                return Err(ConfigError::Invalid(format!(
                    "delimiter must be a single ASCII character, got '{}'",
                    delimiter
                )));
            }
        }
        Ok(())
    }

    pub fn delimiter_byte(&self) -> u8 {
        // validate() guarantees ASCII
        self.delimiter.map_or(b',', |d| d as u8)
    }

    pub fn target_columns_array(&self) -> [&str; FIELD_COUNT] {
        let mut columns = [""; FIELD_COUNT];
        for (slot, name) in columns.iter_mut().zip(&self.target_columns) {
            *slot = name.as_str();
        }
        columns
    }
}
