//! Logging setup installs a process-global subscriber, so it gets its own
//! test binary.

use streamgraph::config::LoggingSettings;
use streamgraph::logging::{init_logging, init_logging_from};
use tempfile::TempDir;

#[test]
fn test_init_logging_creates_file_and_rejects_second_subscriber() {
    let temp_dir = TempDir::new().unwrap();
    let log_dir = temp_dir.path().join("logs");
    std::fs::create_dir_all(&log_dir).unwrap();
    std::fs::write(log_dir.join("graph.log"), "stale contents").unwrap();

    let settings = LoggingSettings {
        directory: log_dir.clone(),
        file: "graph.log".to_string(),
    };
    let guard = init_logging_from(&settings).unwrap();
    tracing::error!(target: "streamgraph", "logging initialized");

    assert!(log_dir.join("graph.log").exists());
    assert!(init_logging(&log_dir, "second.log").is_err());

    drop(guard);
    let contents = std::fs::read_to_string(log_dir.join("graph.log")).unwrap();
    assert!(!contents.contains("stale contents"));
}
