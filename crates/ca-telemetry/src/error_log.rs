use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warning,
    Info,
}

/// One line of the error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    /// Chain of underlying causes, outermost first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl ErrorLogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>, context: Value) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            level,
            message: message.into(),
            stack: None,
            context: (!context.is_null()).then_some(context),
        }
    }

    pub fn from_error(error: &(dyn std::error::Error + Send + Sync), context: Value) -> Self {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }
        let mut entry = Self::new(LogLevel::Error, error.to_string(), context);
        entry.stack = (!causes.is_empty()).then(|| causes.join(": "));
        entry
    }

    /// Read a string field from the context object.
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.as_ref()?.get(key)?.as_str()
    }
}

// ---------------------------------------------------------------------------
// ErrorLogger
// ---------------------------------------------------------------------------

/// Sink for failures, retry warnings and notable events.
///
/// `context` is free-form JSON; pass `Value::Null` for none.
#[async_trait]
pub trait ErrorLogger: Send + Sync {
    async fn log(&self, entry: ErrorLogEntry);

    async fn log_error(&self, error: &(dyn std::error::Error + Send + Sync), context: Value) {
        self.log(ErrorLogEntry::from_error(error, context)).await;
    }

    async fn log_warning(&self, message: &str, context: Value) {
        self.log(ErrorLogEntry::new(LogLevel::Warning, message, context))
            .await;
    }

    async fn log_info(&self, message: &str, context: Value) {
        self.log(ErrorLogEntry::new(LogLevel::Info, message, context))
            .await;
    }
}

// ---------------------------------------------------------------------------
// TracingErrorLogger
// ---------------------------------------------------------------------------

/// Forwards every entry to the `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorLogger;

#[async_trait]
impl ErrorLogger for TracingErrorLogger {
    async fn log(&self, entry: ErrorLogEntry) {
        emit(&entry);
    }
}

fn emit(entry: &ErrorLogEntry) {
    let context = entry
        .context
        .as_ref()
        .map(Value::to_string)
        .unwrap_or_default();
    match entry.level {
        LogLevel::Error => {
            tracing::error!(context = %context, stack = ?entry.stack, "{}", entry.message)
        }
        LogLevel::Warning => tracing::warn!(context = %context, "{}", entry.message),
        LogLevel::Info => tracing::info!(context = %context, "{}", entry.message),
    }
}

// ---------------------------------------------------------------------------
// FileErrorLogger
// ---------------------------------------------------------------------------

/// Appends JSON lines to `<dir>/errors-YYYY-MM-DD.log`.
///
/// The directory is created on first write. Entries that fail to write stay
/// queued and go out with the next successful write. At most
/// `pending_capacity` entries are kept; the oldest are dropped first.
pub struct FileErrorLogger {
    dir: PathBuf,
    pending: tokio::sync::Mutex<VecDeque<ErrorLogEntry>>,
    pending_capacity: usize,
}

pub const DEFAULT_PENDING_CAPACITY: usize = 1000;

impl FileErrorLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_pending_capacity(dir, DEFAULT_PENDING_CAPACITY)
    }

    pub fn with_pending_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            pending: tokio::sync::Mutex::new(VecDeque::new()),
            pending_capacity: capacity.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of today's log file (UTC date).
    pub fn log_file_path(&self) -> PathBuf {
        self.dir
            .join(format!("errors-{}.log", Utc::now().format("%Y-%m-%d")))
    }

    /// Number of entries still waiting to be written.
    pub async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn write_lines(&self, entries: &VecDeque<ErrorLogEntry>) -> std::io::Result<()> {
        let mut content = String::new();
        for entry in entries {
            let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
            content.push_str(&line);
            content.push('\n');
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path())
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl ErrorLogger for FileErrorLogger {
    async fn log(&self, entry: ErrorLogEntry) {
        let mut pending = self.pending.lock().await;
        pending.push_back(entry);
        while pending.len() > self.pending_capacity {
            pending.pop_front();
        }
        match self.write_lines(&pending).await {
            Ok(()) => pending.clear(),
            Err(e) => {
                tracing::error!(
                    path = %self.log_file_path().display(),
                    queued = pending.len(),
                    "failed to write error log: {e}"
                );
            }
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryErrorLogger
// ---------------------------------------------------------------------------

/// Keeps entries in memory. Used by tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryErrorLogger {
    entries: Mutex<Vec<ErrorLogEntry>>,
}

impl MemoryErrorLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<ErrorLogEntry> {
        self.lock().clone()
    }

    pub fn entries_at(&self, level: LogLevel) -> Vec<ErrorLogEntry> {
        self.lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ErrorLogEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ErrorLogger for MemoryErrorLogger {
    async fn log(&self, entry: ErrorLogEntry) {
        self.lock().push(entry);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
