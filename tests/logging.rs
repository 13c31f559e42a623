//! Installing the subscriber with a log file.
//!
//! Kept in its own test binary: the global subscriber can be set only once.

use anyhow::Result;
use stagewise::logging::{LogConfig, LogFormat, init_logging};
use stagewise::testing::*;
use std::fs;
use tracing::Level;

#[test]
fn test_log_file_receives_pipeline_events() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("logs/stagewise.log");
    fs::create_dir_all(tmp.path().join("logs"))?;
    let config = LogConfig::default()
        .with_level(Level::INFO)
        .with_format(LogFormat::Json)
        .with_log_file(&path);
    assert_eq!(config.log_file.as_deref(), Some(path.as_path()));

    init_logging(&config)?;
    sentiment_pipeline()?.fit(&sample_reviews(20))?;

    let text = fs::read_to_string(&path)?;
    let fitted = text
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .find(|event| event["fields"]["message"] == "pipeline fitted")
        .expect("fit event in the log file");
    assert_eq!(fitted["level"], "INFO");
    assert_eq!(fitted["fields"]["stages"], 7);

    assert!(init_logging(&LogConfig::default()).is_err());
    Ok(())
}
