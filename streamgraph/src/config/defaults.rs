//! Default values and constants for all configuration settings.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use super::settings::*;

// =============================================================================
// Graph
// =============================================================================

/// Request slots built when a graph is created.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

/// Upper bound for `initial_capacity`.
pub const MAX_INITIAL_CAPACITY: usize = 1 << 20;

/// Estimate delay, in milliseconds, for stages without their own section.
pub const DEFAULT_STAGE_DELAY_MS: u64 = 0;

// =============================================================================
// Logging
// =============================================================================

pub const DEFAULT_LOG_DIR: &str = "logs";

pub const DEFAULT_LOG_FILE: &str = "streamgraph.log";

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            default_stage_delay: Duration::from_millis(DEFAULT_STAGE_DELAY_MS),
            stage_delays: HashMap::new(),
            trace_events: false,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_LOG_DIR),
            file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}
