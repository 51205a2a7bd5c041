//! Configuration for the request graph and its host process.
//!
//! Configuration is read from an INI file (default `~/.streamgraph/config.ini`):
//!
//! ```ini
//! [graph]
//! initial_capacity = 64
//! default_stage_delay_ms = 0
//! trace_events = false
//!
//! [stage.device]
//! delay_ms = 12
//!
//! [logging]
//! directory = ~/.streamgraph/logs
//! file = streamgraph.log
//! ```
//!
//! A missing file yields defaults. Stages look up their estimate delay by name
//! through [`GraphConfig::stage_delay`].

mod defaults;
mod file;
mod parser;
mod settings;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{ConfigFile, GraphConfig, LoggingSettings};
