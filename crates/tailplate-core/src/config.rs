//! Inline cache configuration
//!
//! Values come from an optional TOML file layered under `TAILPLATE_*`
//! environment variables, e.g. `TAILPLATE_STRICT_VARIABLES=false`.

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, extract::DEFAULT_COMMENT_MARKER};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TAILPLATE";

/// Inline template configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineConfig {
    /// Line-comment marker that introduces template lines
    pub comment_marker: String,
    /// Directory relative call-site paths are resolved against
    pub source_root: Option<PathBuf>,
    /// Fail renders that reference undefined variables
    pub strict_variables: bool,
}

impl Default for InlineConfig {
    fn default() -> Self {
        Self {
            comment_marker: DEFAULT_COMMENT_MARKER.to_string(),
            source_root: None,
            strict_variables: true,
        }
    }
}

impl InlineConfig {
    /// Load from `path` (if given and present) and the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path.to_path_buf()).required(false));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()?;

        let inline: InlineConfig = config.try_deserialize()?;
        inline.validate()?;
        Ok(inline)
    }

    /// Write the configuration as TOML
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.comment_marker.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Comment marker must not be empty".to_string(),
            ));
        }
        if self.comment_marker.chars().any(char::is_whitespace) {
            return Err(ConfigError::Validation(format!(
                "Comment marker must not contain whitespace: {:?}",
                self.comment_marker
            )));
        }
        Ok(())
    }
}
