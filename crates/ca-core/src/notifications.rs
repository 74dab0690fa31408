use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Maximum number of toasts kept visible at once.
pub const MAX_TOASTS: usize = 5;

// ---------------------------------------------------------------------------
// ToastLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl ToastLevel {
    /// How long a toast of this level stays up when no duration is given.
    pub fn default_duration(&self) -> Duration {
        match self {
            ToastLevel::Error => Duration::from_millis(5000),
            ToastLevel::Warning => Duration::from_millis(4000),
            ToastLevel::Success | ToastLevel::Info => Duration::from_millis(3000),
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            ToastLevel::Info => "ℹ",
            ToastLevel::Success => "✔",
            ToastLevel::Warning => "⚠",
            ToastLevel::Error => "✖",
        }
    }
}

impl fmt::Display for ToastLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToastLevel::Info => "info",
            ToastLevel::Success => "success",
            ToastLevel::Warning => "warning",
            ToastLevel::Error => "error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Toast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: String,
    pub message: String,
    pub level: ToastLevel,
    pub created: Instant,
    pub duration: Duration,
}

impl Toast {
    pub fn expired(&self) -> bool {
        self.created.elapsed() >= self.duration
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Fire-and-forget sink for user-facing notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, level: ToastLevel, duration: Option<Duration>);
}

/// Notifier that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _message: &str, _level: ToastLevel, _duration: Option<Duration>) {}
}

// ---------------------------------------------------------------------------
// ToastQueue
// ---------------------------------------------------------------------------

/// Shared stack of toasts (max [`MAX_TOASTS`]); the oldest is dropped on
/// overflow.
#[derive(Clone, Default)]
pub struct ToastQueue {
    toasts: Arc<Mutex<VecDeque<Toast>>>,
    counter: Arc<AtomicU64>,
}

impl ToastQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a toast and return its id (`{millis}-{counter}`).
    pub fn show(
        &self,
        message: impl Into<String>,
        level: ToastLevel,
        duration: Option<Duration>,
    ) -> String {
        let id = format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            self.counter.fetch_add(1, Ordering::Relaxed)
        );
        let toast = Toast {
            id: id.clone(),
            message: message.into(),
            level,
            created: Instant::now(),
            duration: duration.unwrap_or_else(|| level.default_duration()),
        };

        let mut toasts = self.lock();
        toasts.push_back(toast);
        if toasts.len() > MAX_TOASTS {
            toasts.pop_front();
        }
        id
    }

    /// Remove the toast with `id`. Returns whether it was present.
    pub fn hide(&self, id: &str) -> bool {
        let mut toasts = self.lock();
        let before = toasts.len();
        toasts.retain(|t| t.id != id);
        toasts.len() != before
    }

    /// Remove all expired toasts.
    pub fn prune_expired(&self) {
        self.lock().retain(|t| !t.expired());
    }

    /// Snapshot, oldest first.
    pub fn toasts(&self) -> Vec<Toast> {
        self.lock().iter().cloned().collect()
    }

    /// Remove and return every toast, oldest first.
    pub fn drain(&self) -> Vec<Toast> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Toast>> {
        self.toasts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Notifier for ToastQueue {
    fn notify(&self, message: &str, level: ToastLevel, duration: Option<Duration>) {
        self.show(message, level, duration);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
