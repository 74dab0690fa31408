use ca_telemetry::error_log::{
    ErrorLogEntry, ErrorLogger, FileErrorLogger, LogLevel, MemoryErrorLogger, TracingErrorLogger,
};
use serde_json::{json, Value};

fn read_entries(logger: &FileErrorLogger) -> Vec<ErrorLogEntry> {
    let text = std::fs::read_to_string(logger.log_file_path()).expect("log file exists");
    text.lines()
        .map(|line| serde_json::from_str(line).expect("valid json line"))
        .collect()
}

#[tokio::test]
async fn file_logger_creates_directory_lazily() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("logs");
    let logger = FileErrorLogger::new(&dir);
    assert!(!dir.exists());

    logger.log_info("session started", Value::Null).await;
    assert!(dir.exists());

    let name = logger
        .log_file_path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    assert!(name.starts_with("errors-"));
    assert!(name.ends_with(".log"));
}

#[tokio::test]
async fn file_logger_appends_json_lines() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = FileErrorLogger::new(tmp.path());

    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "ENOENT: no such file");
    logger.log_error(&err, json!({ "type": "filesystem" })).await;
    logger
        .log_warning("Retry attempt 1 of 2", json!({ "error": "boom" }))
        .await;

    let entries = read_entries(&logger);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level, LogLevel::Error);
    assert_eq!(entries[0].message, "ENOENT: no such file");
    assert_eq!(entries[0].context_str("type"), Some("filesystem"));
    assert_eq!(entries[1].level, LogLevel::Warning);
    assert_eq!(entries[1].context_str("error"), Some("boom"));
}

#[tokio::test]
async fn failed_writes_are_requeued() {
    let tmp = tempfile::tempdir().unwrap();
    let blocked = tmp.path().join("logs");
    // A regular file where the directory should be makes every write fail.
    std::fs::write(&blocked, b"not a directory").unwrap();

    let logger = FileErrorLogger::new(&blocked);
    logger.log_warning("first", Value::Null).await;
    assert_eq!(logger.pending_len().await, 1);

    std::fs::remove_file(&blocked).unwrap();
    logger.log_warning("second", Value::Null).await;
    assert_eq!(logger.pending_len().await, 0);

    let messages: Vec<String> = read_entries(&logger)
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, vec!["first", "second"]);
}

#[tokio::test]
async fn queued_entries_are_capped_oldest_first() {
    let tmp = tempfile::tempdir().unwrap();
    let blocked = tmp.path().join("logs");
    std::fs::write(&blocked, b"not a directory").unwrap();

    let logger = FileErrorLogger::with_pending_capacity(&blocked, 3);
    for i in 0..10 {
        logger.log_warning(&format!("entry {i}"), Value::Null).await;
    }
    assert_eq!(logger.pending_len().await, 3);

    std::fs::remove_file(&blocked).unwrap();
    logger.log_warning("entry 10", Value::Null).await;
    assert_eq!(logger.pending_len().await, 0);

    let messages: Vec<String> = read_entries(&logger)
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, vec!["entry 8", "entry 9", "entry 10"]);
}

#[tokio::test]
async fn memory_logger_filters_by_level() {
    let logger = MemoryErrorLogger::new();
    logger.log_info("a", Value::Null).await;
    logger.log_warning("b", Value::Null).await;
    logger.log_warning("c", Value::Null).await;

    assert_eq!(logger.entries().len(), 3);
    let warnings = logger.entries_at(LogLevel::Warning);
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[1].message, "c");

    logger.clear();
    assert!(logger.entries().is_empty());
}

#[tokio::test]
async fn tracing_logger_accepts_every_level() {
    let logger = TracingErrorLogger;
    let err = std::io::Error::other("state is undefined");
    logger.log_error(&err, json!({ "type": "state_corruption" })).await;
    logger.log_warning("warn", Value::Null).await;
    logger.log_info("info", Value::Null).await;
}
