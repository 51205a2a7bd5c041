//! Maps INI sections and keys onto [`ConfigFile`] fields.
//!
//! | Section | Keys |
//! |---|---|
//! | `[graph]` | `initial_capacity`, `default_stage_delay_ms`, `trace_events` |
//! | `[stage.<name>]` | `delay_ms` |
//! | `[logging]` | `directory`, `file` |
//!
//! Unknown sections and keys are ignored.

use ini::Ini;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::MAX_INITIAL_CAPACITY;
use super::file::ConfigFileError;
use super::settings::ConfigFile;

/// Prefix of per-stage sections, e.g. `[stage.cache]`.
const STAGE_SECTION_PREFIX: &str = "stage.";

/// Overlays the values present in `document` on top of the defaults.
pub(super) fn parse_ini(document: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut settings = ConfigFile::default();

    if let Some(section) = document.section(Some("graph")) {
        if let Some(v) = section.get("initial_capacity") {
            let capacity: usize = v.trim().parse().map_err(|_| ConfigFileError::InvalidValue {
                section: "graph".to_string(),
                key: "initial_capacity".to_string(),
                value: v.to_string(),
                reason: "must be a non-negative integer".to_string(),
            })?;
            if capacity > MAX_INITIAL_CAPACITY {
                return Err(ConfigFileError::InvalidValue {
                    section: "graph".to_string(),
                    key: "initial_capacity".to_string(),
                    value: v.to_string(),
                    reason: format!("must not exceed {}", MAX_INITIAL_CAPACITY),
                });
            }
            settings.graph.initial_capacity = capacity;
        }
        if let Some(v) = section.get("default_stage_delay_ms") {
            settings.graph.default_stage_delay = parse_millis("graph", "default_stage_delay_ms", v)?;
        }
        if let Some(v) = section.get("trace_events") {
            settings.graph.trace_events = parse_bool(v);
        }
    }

    for (name, section) in document.iter() {
        let Some(stage) = name.and_then(|n| n.strip_prefix(STAGE_SECTION_PREFIX)) else {
            continue;
        };
        if stage.is_empty() {
            return Err(ConfigFileError::InvalidValue {
                section: STAGE_SECTION_PREFIX.to_string(),
                key: String::new(),
                value: String::new(),
                reason: "stage sections need a name, e.g. [stage.cache]".to_string(),
            });
        }
        if let Some(v) = section.get("delay_ms") {
            let delay = parse_millis(&format!("{}{}", STAGE_SECTION_PREFIX, stage), "delay_ms", v)?;
            settings.graph.stage_delays.insert(stage.to_string(), delay);
        }
    }

    if let Some(section) = document.section(Some("logging")) {
        let non_empty = |key: &str| section.get(key).map(str::trim).filter(|v| !v.is_empty());
        if let Some(directory) = non_empty("directory") {
            settings.logging.directory = expand_tilde(directory);
        }
        if let Some(file) = non_empty("file") {
            settings.logging.file = file.to_string();
        }
    }

    Ok(settings)
}

fn parse_millis(section: &str, key: &str, value: &str) -> Result<Duration, ConfigFileError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigFileError::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative integer (milliseconds)".to_string(),
        })
}

/// `true`, `yes`, `on` and `1` in any case; everything else is false.
pub(super) fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "on" | "1"
    )
}

/// Resolves a leading `~/` against the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
