//! Reader configuration.
//!
//! Every reader is constructed from an explicit [`ReaderConfig`]; nothing is
//! read from process-wide state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// What a reader does with a record that does not conform to its schema.
///
/// The policy is fixed for the lifetime of a reader, so every pass of a
/// two-pass scan treats the same records the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchPolicy {
    /// Fail the pass with `SchemaMismatch`.
    #[default]
    Abort,
    /// Drop the record, log a warning and count it.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Rows decoded per batch by columnar formats.
    pub batch_size: usize,
    /// Column separator for delimited text.
    pub delimiter: char,
    /// Separator between elements of a multi-valued cell in delimited text.
    pub multi_value_delimiter: char,
    /// Cell text that denotes a null value in delimited text.
    pub null_token: String,
    pub on_mismatch: MismatchPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            delimiter: ',',
            multi_value_delimiter: ';',
            null_token: String::new(),
            on_mismatch: MismatchPolicy::Abort,
        }
    }
}

impl ReaderConfig {
    /// Load a configuration from a JSON file. Missing keys take their defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ReaderConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.on_mismatch = policy;
        self
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        if !self.delimiter.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "delimiter {:?} is not a single-byte character",
                self.delimiter
            )));
        }
        if self.delimiter == self.multi_value_delimiter {
            return Err(ConfigError::Invalid(
                "delimiter and multi_value_delimiter must differ".into(),
            ));
        }
        Ok(())
    }

    /// The column delimiter as a byte. Only meaningful after [`Self::validate`].
    pub(crate) fn delimiter_byte(&self) -> u8 {
        let mut buf = [0u8; 4];
        self.delimiter.encode_utf8(&mut buf);
        buf[0]
    }
}
