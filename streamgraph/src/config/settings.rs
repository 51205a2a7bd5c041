//! Settings structs for all configuration sections.
//!
//! Each struct represents one `[section]` of the INI config file.
//! These are pure data types with no parsing logic.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    /// Request graph settings, including per-stage delays
    pub graph: GraphConfig,
    /// Logging settings
    pub logging: LoggingSettings,
}

/// Request graph configuration.
///
/// Covers the `[graph]` section and every `[stage.<name>]` section.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Number of request slots built up front.
    pub initial_capacity: usize,
    /// Estimate delay for stages without their own section.
    pub default_stage_delay: Duration,
    /// Estimate delay per stage name.
    pub stage_delays: HashMap<String, Duration>,
    /// Log graph telemetry events through `tracing`.
    pub trace_events: bool,
}

impl GraphConfig {
    /// Additional delay a stage adds when its estimates bubble to the parent.
    pub fn stage_delay(&self, stage: &str) -> Duration {
        self.stage_delays
            .get(stage)
            .copied()
            .unwrap_or(self.default_stage_delay)
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_default_stage_delay(mut self, delay: Duration) -> Self {
        self.default_stage_delay = delay;
        self
    }

    pub fn with_stage_delay(mut self, stage: impl Into<String>, delay: Duration) -> Self {
        self.stage_delays.insert(stage.into(), delay);
        self
    }

    pub fn with_trace_events(mut self, enabled: bool) -> Self {
        self.trace_events = enabled;
        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingSettings {
    /// Directory the log file is written to
    pub directory: PathBuf,
    /// Log file name
    pub file: String,
}
