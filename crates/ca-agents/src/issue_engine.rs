use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use ca_core::config::{Config, ErrorSimulationConfig, ErrorSimulationUpdate};
use ca_core::event_bus::EventBus;
use ca_core::notifications::{Notifier, ToastLevel};
use ca_core::ring_buffer::RingBuffer;
use ca_core::types::{ExecutionState, Issue, IssueStatus, ProjectStatus};
use ca_harness::error_handlers::{AppError, ErrorCategory, ErrorHandlerChain};
use ca_harness::retry::RetryPolicy;
use ca_telemetry::error_log::ErrorLogger;
use chrono::{Local, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::events::EngineEvent;
use crate::state_machine::{issue_transition, IssueEvent, StateMachineError};

const PROGRESS_STEP: usize = 20;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct IssueEngineSettings {
    /// Simulated work per progress step.
    pub step_delay: Duration,
    /// Budget for each issue in [`IssueEngine::execute_all`].
    pub retry: RetryPolicy,
    pub output_capacity: usize,
    pub error_simulation: ErrorSimulationConfig,
    pub phase: String,
}

impl Default for IssueEngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl IssueEngineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            step_delay: Duration::from_millis(cfg.execution.issue_step_delay_ms),
            retry: RetryPolicy::from(&cfg.execution.retry),
            output_capacity: cfg.buffers.output_lines,
            error_simulation: cfg.execution.error_simulation.clone(),
            phase: "Development".into(),
        }
    }

    /// No waiting anywhere. Retry budget unchanged.
    pub fn immediate() -> Self {
        let mut settings = Self::default();
        settings.step_delay = Duration::ZERO;
        settings.retry.base_delay = Duration::ZERO;
        settings
    }
}

// ---------------------------------------------------------------------------
// Errors & results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IssueError {
    #[error("issue {running} is already executing")]
    Busy { running: String },
    #[error("{message}")]
    Failed {
        issue_id: String,
        progress: u8,
        category: ErrorCategory,
        message: String,
    },
    #[error(transparent)]
    InvalidTransition(#[from] StateMachineError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl fmt::Display for ExecutionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Execution complete: {} succeeded, {} failed",
            self.succeeded, self.failed
        )
    }
}

// ---------------------------------------------------------------------------
// IssueEngine
// ---------------------------------------------------------------------------

struct IssueState {
    issues: Vec<Issue>,
    project_status: ProjectStatus,
    execution: ExecutionState,
    output: RingBuffer<String>,
    error_simulation: ErrorSimulationConfig,
    overrides: HashMap<String, ErrorSimulationConfig>,
}

/// Owns the issue set and runs the simulated execution lifecycle.
///
/// Cloning is cheap; every clone drives the same state. Locks are only held
/// for the duration of a snapshot update, never across a step delay.
#[derive(Clone)]
pub struct IssueEngine {
    state: Arc<RwLock<IssueState>>,
    step_delay: Duration,
    retry: RetryPolicy,
    logger: Arc<dyn ErrorLogger>,
    notifier: Arc<dyn Notifier>,
    chain: Arc<ErrorHandlerChain>,
    bus: EventBus<EngineEvent>,
}

impl IssueEngine {
    pub fn new(
        settings: IssueEngineSettings,
        logger: Arc<dyn ErrorLogger>,
        notifier: Arc<dyn Notifier>,
        bus: EventBus<EngineEvent>,
    ) -> Self {
        let chain = Arc::new(ErrorHandlerChain::with_defaults(logger.clone()));
        let state = IssueState {
            issues: Vec::new(),
            project_status: ProjectStatus::from_issues(&[], settings.phase),
            execution: ExecutionState::default(),
            output: RingBuffer::new(settings.output_capacity),
            error_simulation: settings.error_simulation,
            overrides: HashMap::new(),
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            step_delay: settings.step_delay,
            retry: settings.retry,
            logger,
            notifier,
            chain,
            bus,
        }
    }

    /// Replace the classification chain (defaults to filesystem, network,
    /// state-corruption).
    pub fn with_error_chain(mut self, chain: ErrorHandlerChain) -> Self {
        self.chain = Arc::new(chain);
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, IssueState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IssueState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -- snapshots ----------------------------------------------------------

    pub fn issues(&self) -> Vec<Issue> {
        self.read().issues.clone()
    }

    pub fn issue(&self, id: &str) -> Option<Issue> {
        self.read().issues.iter().find(|i| i.id == id).cloned()
    }

    pub fn project_status(&self) -> ProjectStatus {
        self.read().project_status.clone()
    }

    pub fn execution(&self) -> ExecutionState {
        self.read().execution.clone()
    }

    /// Output lines, oldest first.
    pub fn output(&self) -> Vec<String> {
        self.read().output.to_vec()
    }

    pub fn error_simulation(&self) -> ErrorSimulationConfig {
        self.read().error_simulation.clone()
    }

    // -- mutation -----------------------------------------------------------

    pub fn load_issues(&self, issues: Vec<Issue>) {
        {
            let mut guard = self.write();
            let state = &mut *guard;
            state.issues = issues;
            state.project_status.recompute(&state.issues);
        }
        info!(count = self.read().issues.len(), "issues loaded");
        self.bus.publish(EngineEvent::IssuesChanged);
    }

    /// Merge a partial update into the global fault injection settings.
    pub fn set_error_simulation(&self, update: ErrorSimulationUpdate) {
        let mut state = self.write();
        state.error_simulation.apply(&update);
        debug!(config = ?state.error_simulation, "error simulation updated");
    }

    /// Pin fault injection for one issue, ignoring the global settings.
    pub fn override_error_simulation(&self, issue_id: impl Into<String>, config: ErrorSimulationConfig) {
        self.write().overrides.insert(issue_id.into(), config);
    }

    pub fn clear_error_simulation_override(&self, issue_id: &str) {
        self.write().overrides.remove(issue_id);
    }

    fn effective_simulation(&self, issue_id: &str) -> ErrorSimulationConfig {
        let state = self.read();
        state
            .overrides
            .get(issue_id)
            .unwrap_or(&state.error_simulation)
            .clone()
    }

    /// Append a `[HH:MM:SS]`-prefixed line to the bounded output log.
    pub fn add_output(&self, message: impl AsRef<str>) {
        let line = format!("[{}] {}", Local::now().format("%H:%M:%S"), message.as_ref());
        self.write().output.push(line.clone());
        self.bus.publish(EngineEvent::OutputAppended(line));
    }

    pub fn clear_output(&self) {
        self.write().output.clear();
    }

    pub fn update_project_status(&self) {
        {
            let mut guard = self.write();
            let state = &mut *guard;
            state.project_status.recompute(&state.issues);
        }
        self.bus.publish(EngineEvent::IssuesChanged);
    }

    // -- execution ----------------------------------------------------------

    /// Execute one issue to completion or failure.
    ///
    /// Missing and already-completed issues are a no-op. Simulated faults
    /// are classified, recorded on the issue and returned.
    pub async fn execute_issue(&self, issue_id: &str) -> Result<(), IssueError> {
        let title = {
            let mut guard = self.write();
            let state = &mut *guard;
            let Some(issue) = state.issues.iter_mut().find(|i| i.id == issue_id) else {
                debug!(issue_id, "execute requested for unknown issue");
                return Ok(());
            };
            if issue.status == IssueStatus::Completed {
                return Ok(());
            }
            if state.execution.is_running {
                return Err(IssueError::Busy {
                    running: state.execution.current_issue_id.clone().unwrap_or_default(),
                });
            }

            issue.status = issue_transition(issue.status, IssueEvent::Start)?;
            issue.error = None;
            let title = issue.title.clone();
            state.execution = ExecutionState {
                is_running: true,
                current_issue_id: Some(issue_id.to_string()),
                progress: 0,
                start_time: Some(Utc::now()),
                end_time: None,
                error: None,
            };
            state.project_status.recompute(&state.issues);
            title
        };
        info!(issue_id, title = %title, "executing issue");
        self.bus.publish(EngineEvent::IssuesChanged);

        let mut fault_at = None;
        for progress in (0..=100u8).step_by(PROGRESS_STEP) {
            tokio::time::sleep(self.step_delay).await;
            self.write().execution.progress = progress;
            self.bus.publish(EngineEvent::ExecutionProgress {
                issue_id: issue_id.to_string(),
                progress,
            });
            self.add_output(format!("Executing {title}: {progress}% complete"));

            if self
                .effective_simulation(issue_id)
                .should_fail(progress, rand::random::<f64>())
            {
                fault_at = Some(progress);
                break;
            }
        }

        match fault_at {
            None => {
                self.finish(issue_id, IssueEvent::Complete, |issue| {
                    issue.output = Some(vec![format!("{} completed successfully", issue.title)]);
                })?;
                let message = format!("{title} completed successfully");
                self.add_output(format!("✅ {message}"));
                self.notifier.notify(&message, ToastLevel::Success, None);
                info!(issue_id, "issue completed");
                Ok(())
            }
            Some(progress) => {
                let raw = AppError::new(format!("Execution failed at {progress}% progress"));
                let handled = self
                    .chain
                    .handle(&raw, json!({ "issue_id": issue_id, "progress": progress }))
                    .await;
                let message = handled.message.clone();

                self.finish(issue_id, IssueEvent::Fail, |issue| {
                    issue.output = Some(vec![format!("{} failed: {message}", issue.title)]);
                    issue.error = Some(message.clone());
                })?;
                self.write().execution.error = Some(message.clone());
                self.add_output(format!("❌ {title} failed: {message}"));
                self.notifier
                    .notify(&format!("{title} failed: {message}"), ToastLevel::Error, None);
                warn!(issue_id, progress, category = %handled.category, "issue failed: {message}");

                Err(IssueError::Failed {
                    issue_id: issue_id.to_string(),
                    progress,
                    category: handled.category,
                    message,
                })
            }
        }
    }

    /// Close out the running issue: stop the execution clock, apply the
    /// terminal transition, and recompute the project status.
    fn finish(
        &self,
        issue_id: &str,
        event: IssueEvent,
        update: impl FnOnce(&mut Issue),
    ) -> Result<(), IssueError> {
        {
            let mut guard = self.write();
            let state = &mut *guard;
            state.execution.is_running = false;
            state.execution.current_issue_id = None;
            state.execution.end_time = Some(Utc::now());
            if event == IssueEvent::Complete {
                state.execution.progress = 100;
            }

            // The issue set may have been reloaded while this one ran.
            if let Some(issue) = state.issues.iter_mut().find(|i| i.id == issue_id) {
                issue.status = issue_transition(issue.status, event)?;
                update(issue);
            }
            state.project_status.recompute(&state.issues);
        }
        self.bus.publish(EngineEvent::IssuesChanged);
        Ok(())
    }

    /// Run every issue that is not completed, in order, each under the
    /// retry policy. Failures are counted and the batch continues.
    pub async fn execute_all(&self) -> ExecutionSummary {
        let targets: Vec<(String, String)> = self
            .read()
            .issues
            .iter()
            .filter(|i| i.status.is_executable())
            .map(|i| (i.id.clone(), i.title.clone()))
            .collect();
        info!(count = targets.len(), "executing all open issues");

        let mut summary = ExecutionSummary::default();
        for (issue_id, title) in &targets {
            let engine = self;
            let id = issue_id.as_str();
            let result = self
                .retry
                .run(self.logger.as_ref(), &format!("execute issue {id}"), move || {
                    engine.execute_issue(id)
                })
                .await;

            match result {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    self.logger
                        .log_error(
                            &e,
                            json!({
                                "issue_id": issue_id,
                                "title": title,
                                "attempts": self.retry.max_attempts(),
                            }),
                        )
                        .await;
                }
            }
        }

        self.add_output(summary.to_string());
        let level = if summary.failed == 0 {
            ToastLevel::Success
        } else {
            ToastLevel::Warning
        };
        self.notifier.notify(&summary.to_string(), level, None);
        info!(succeeded = summary.succeeded, failed = summary.failed, "batch finished");
        summary
    }
}
