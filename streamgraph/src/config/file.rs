//! Loading `~/.streamgraph/config.ini`.
//!
//! A missing file is not an error: the graph runs on [`super::defaults`].
//! Section handling is in [`super::parser`].

use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::settings::ConfigFile;

const CONFIG_DIR_NAME: &str = ".streamgraph";
const CONFIG_FILE_NAME: &str = "config.ini";

#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The file exists but is not readable INI.
    #[error("cannot read streamgraph config: {0}")]
    ReadError(#[from] ini::Error),

    #[error("bad value for [{section}] {key} = '{value}': {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigFile {
    /// Reads [`config_file_path`], falling back to defaults when it is absent.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "No streamgraph config, running on defaults");
            return Ok(Self::default());
        }

        let document = Ini::load_from_file(path)?;
        let config = super::parser::parse_ini(&document)?;
        tracing::debug!(
            path = %path.display(),
            initial_capacity = config.graph.initial_capacity,
            stage_overrides = config.graph.stage_delays.len(),
            "Loaded streamgraph config"
        );
        Ok(config)
    }
}

/// `~/.streamgraph`, or `./.streamgraph` when there is no home directory.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}
