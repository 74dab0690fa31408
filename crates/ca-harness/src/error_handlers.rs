use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use ca_telemetry::error_log::ErrorLogger;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// A raw failure on its way through the classification chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AppError {
    pub message: String,
    /// Set when the error came from `std::io`.
    pub kind: Option<io::ErrorKind>,
}

impl AppError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    fn mentions(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.message.contains(n))
    }

    fn kind_in(&self, kinds: &[io::ErrorKind]) -> bool {
        self.kind.is_some_and(|k| kinds.contains(&k))
    }
}

impl From<io::Error> for AppError {
    fn from(e: io::Error) -> Self {
        Self {
            message: e.to_string(),
            kind: Some(e.kind()),
        }
    }
}

impl From<String> for AppError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for AppError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

// ---------------------------------------------------------------------------
// Classification result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    FileSystem,
    Network,
    StateCorruption,
    Unclassified,
}

impl ErrorCategory {
    /// Value recorded under the `type` key of the log context.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::FileSystem => "filesystem",
            ErrorCategory::Network => "network",
            ErrorCategory::StateCorruption => "state_corruption",
            ErrorCategory::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user-facing error produced by the chain.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandledError {
    pub category: ErrorCategory,
    pub message: String,
}

// ---------------------------------------------------------------------------
// ErrorHandler
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    fn category(&self) -> ErrorCategory;

    fn can_handle(&self, error: &AppError) -> bool;

    fn user_message(&self, error: &AppError) -> String;

    /// Log `error` with the handler's `type` tag, then build the user-facing
    /// replacement.
    async fn handle(
        &self,
        error: &AppError,
        context: Value,
        logger: &dyn ErrorLogger,
    ) -> HandledError {
        let category = self.category();
        logger
            .log_error(error, tag_context(context, category.as_str()))
            .await;
        HandledError {
            category,
            message: self.user_message(error),
        }
    }
}

fn tag_context(context: Value, kind: &str) -> Value {
    let mut map = match context {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    };
    map.insert("type".into(), Value::String(kind.into()));
    Value::Object(map)
}

// ---------------------------------------------------------------------------
// Built-in handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemErrorHandler;

impl ErrorHandler for FileSystemErrorHandler {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::FileSystem
    }

    fn can_handle(&self, error: &AppError) -> bool {
        error.mentions(&["ENOENT", "EACCES", "EPERM", "ENOSPC"])
            || error.kind_in(&[
                io::ErrorKind::NotFound,
                io::ErrorKind::PermissionDenied,
                io::ErrorKind::StorageFull,
            ])
    }

    fn user_message(&self, error: &AppError) -> String {
        let msg = if error.mentions(&["ENOENT"]) || error.kind_in(&[io::ErrorKind::NotFound]) {
            "File or directory not found"
        } else if error.mentions(&["EACCES", "EPERM"])
            || error.kind_in(&[io::ErrorKind::PermissionDenied])
        {
            "Permission denied. Please check file permissions"
        } else if error.mentions(&["ENOSPC"]) || error.kind_in(&[io::ErrorKind::StorageFull]) {
            "No space left on device"
        } else {
            "File system error occurred"
        };
        msg.to_string()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkErrorHandler;

impl ErrorHandler for NetworkErrorHandler {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::Network
    }

    fn can_handle(&self, error: &AppError) -> bool {
        error.mentions(&["ETIMEDOUT", "ECONNREFUSED", "ENOTFOUND", "fetch"])
            || error.kind_in(&[io::ErrorKind::TimedOut, io::ErrorKind::ConnectionRefused])
    }

    fn user_message(&self, error: &AppError) -> String {
        let msg = if error.mentions(&["ETIMEDOUT"]) || error.kind_in(&[io::ErrorKind::TimedOut]) {
            "Request timed out. Please check your connection"
        } else if error.mentions(&["ECONNREFUSED"])
            || error.kind_in(&[io::ErrorKind::ConnectionRefused])
        {
            "Connection refused. The server may be down"
        } else if error.mentions(&["ENOTFOUND"]) {
            "Server not found. Please check the URL"
        } else {
            "Network error occurred"
        };
        msg.to_string()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StateCorruptionErrorHandler;

impl ErrorHandler for StateCorruptionErrorHandler {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::StateCorruption
    }

    fn can_handle(&self, error: &AppError) -> bool {
        error.mentions(&["state", "store", "undefined", "null"])
    }

    fn user_message(&self, _error: &AppError) -> String {
        "Application state error. Please restart the application".to_string()
    }
}

// ---------------------------------------------------------------------------
// ErrorHandlerChain
// ---------------------------------------------------------------------------

/// Ordered list of handlers; the first one that accepts an error wins.
pub struct ErrorHandlerChain {
    handlers: Vec<Box<dyn ErrorHandler>>,
    logger: Arc<dyn ErrorLogger>,
}

impl ErrorHandlerChain {
    /// Empty chain. Every error falls through to the raw log.
    pub fn new(logger: Arc<dyn ErrorLogger>) -> Self {
        Self {
            handlers: Vec::new(),
            logger,
        }
    }

    /// Filesystem, network, then state-corruption.
    pub fn with_defaults(logger: Arc<dyn ErrorLogger>) -> Self {
        Self::new(logger)
            .with_handler(FileSystemErrorHandler)
            .with_handler(NetworkErrorHandler)
            .with_handler(StateCorruptionErrorHandler)
    }

    pub fn with_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.add_handler(handler);
        self
    }

    pub fn add_handler(&mut self, handler: impl ErrorHandler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn logger(&self) -> &Arc<dyn ErrorLogger> {
        &self.logger
    }

    /// Classify `error`. Unmatched errors are logged as-is and come back
    /// with their original message.
    pub async fn handle(&self, error: &AppError, context: Value) -> HandledError {
        if let Some(handler) = self.handlers.iter().find(|h| h.can_handle(error)) {
            let handled = handler.handle(error, context, self.logger.as_ref()).await;
            tracing::debug!(category = %handled.category, "classified error: {}", error);
            return handled;
        }

        self.logger.log_error(error, context).await;
        HandledError {
            category: ErrorCategory::Unclassified,
            message: error.message.clone(),
        }
    }
}

/// Run `error` through `chain` and return the message to show the user.
pub async fn handle_error(
    chain: &ErrorHandlerChain,
    error: impl Into<AppError>,
    context: Value,
) -> String {
    chain.handle(&error.into(), context).await.message
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_context_merges_into_objects() {
        let tagged = tag_context(json!({ "issue_id": "3" }), "network");
        assert_eq!(tagged, json!({ "issue_id": "3", "type": "network" }));
        assert_eq!(tag_context(Value::Null, "filesystem"), json!({ "type": "filesystem" }));
        assert_eq!(
            tag_context(json!("raw"), "network"),
            json!({ "value": "raw", "type": "network" })
        );
    }

    #[test]
    fn io_errors_keep_their_kind() {
        let err = AppError::from(io::Error::new(io::ErrorKind::PermissionDenied, "nope"));
        assert_eq!(err.kind, Some(io::ErrorKind::PermissionDenied));
        assert!(FileSystemErrorHandler.can_handle(&err));
        assert_eq!(
            FileSystemErrorHandler.user_message(&err),
            "Permission denied. Please check file permissions"
        );
    }
}
