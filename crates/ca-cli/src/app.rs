use std::sync::Arc;

use ca_agents::events::EngineEvent;
use ca_agents::issue_engine::{IssueEngine, IssueEngineSettings};
use ca_agents::session_runner::{SessionRunner, SessionRunnerSettings};
use ca_core::config::Config;
use ca_core::event_bus::EventBus;
use ca_core::notifications::ToastQueue;
use ca_telemetry::error_log::{ErrorLogger, FileErrorLogger};

/// Everything a command needs, wired once at startup.
#[derive(Clone)]
pub struct AppContext {
    pub logger: Arc<dyn ErrorLogger>,
    pub toasts: ToastQueue,
    pub bus: EventBus<EngineEvent>,
    pub issues: IssueEngine,
    pub sessions: SessionRunner,
}

impl AppContext {
    /// Build the engines from `config`, logging errors under its log dir.
    pub fn new(config: &Config) -> Self {
        let logger: Arc<dyn ErrorLogger> =
            Arc::new(FileErrorLogger::new(&config.logging.log_dir));
        Self::with_logger(config, logger)
    }

    pub fn with_logger(config: &Config, logger: Arc<dyn ErrorLogger>) -> Self {
        let toasts = ToastQueue::new();
        let bus = EventBus::new();
        let issues = IssueEngine::new(
            IssueEngineSettings::from_config(config),
            logger.clone(),
            Arc::new(toasts.clone()),
            bus.clone(),
        );
        let sessions = SessionRunner::new(
            SessionRunnerSettings::from_config(config),
            logger.clone(),
            bus.clone(),
        );
        Self {
            logger,
            toasts,
            bus,
            issues,
            sessions,
        }
    }
}
