use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use ca_core::config::{Config, ErrorSimulationConfig, ErrorSimulationUpdate};
use ca_core::event_bus::EventBus;
use ca_core::ring_buffer::RingBuffer;
use ca_core::types::{
    generate_id, DemoTaskStatus, ExecutionStats, ReplCommand, ReplOutput, SessionInfo, SessionKind,
    SessionStatus, StatsUpdate, StreamingPayload, StreamingUpdate, TaskEvent, TaskEventType,
};
use ca_telemetry::error_log::ErrorLogger;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::demo::{demo_task_queue, DEMO_TASKS, MOCK_TASKS};
use crate::events::EngineEvent;
use crate::state_machine::{SessionEvent, SessionStateMachine, StateMachineError};

const TASK_PROGRESS_STEP: usize = 25;
const COMMAND_HISTORY_CAPACITY: usize = 1000;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SessionRunnerSettings {
    pub step_delay: Duration,
    pub inter_task_delay: Duration,
    pub event_capacity: usize,
    pub output_capacity: usize,
    pub streaming_capacity: usize,
    pub task_error_simulation: ErrorSimulationConfig,
}

impl Default for SessionRunnerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionRunnerSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            step_delay: Duration::from_millis(cfg.execution.task_step_delay_ms),
            inter_task_delay: Duration::from_millis(cfg.execution.inter_task_delay_ms),
            event_capacity: cfg.buffers.task_events,
            output_capacity: cfg.buffers.repl_outputs,
            streaming_capacity: cfg.buffers.streaming_updates,
            task_error_simulation: cfg.execution.task_error_simulation.clone(),
        }
    }

    pub fn immediate() -> Self {
        Self {
            step_delay: Duration::ZERO,
            inter_task_delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("No active session")]
    NoActiveSession,
    #[error("Task {task} failed at {progress}% progress")]
    TaskFailed { task: String, progress: u8 },
    #[error(transparent)]
    InvalidTransition(#[from] StateMachineError),
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

struct RunnerState {
    sessions: Vec<SessionInfo>,
    /// Index into `sessions` of the current one.
    current: Option<usize>,
    machine: SessionStateMachine,
    events: RingBuffer<TaskEvent>,
    outputs: RingBuffer<ReplOutput>,
    streaming: RingBuffer<StreamingUpdate>,
    stats: ExecutionStats,
    stats_since: Instant,
    command_history: RingBuffer<ReplCommand>,
    task_error_simulation: ErrorSimulationConfig,
}

impl RunnerState {
    fn current(&self) -> Option<&SessionInfo> {
        self.current.and_then(|i| self.sessions.get(i))
    }

    fn current_mut(&mut self) -> Option<&mut SessionInfo> {
        self.current.and_then(|i| self.sessions.get_mut(i))
    }

    /// Apply `event` to the current session and mirror the new status onto it.
    fn transition_current(&mut self, event: SessionEvent) -> Result<String, SessionError> {
        let status = self.machine.transition(event)?;
        let session = self.current_mut().ok_or(SessionError::NoActiveSession)?;
        session.status = status;
        if status == SessionStatus::Completed {
            session.end_time = Some(Utc::now());
        }
        Ok(session.id.clone())
    }

    fn uptime(&self) -> u64 {
        self.stats_since.elapsed().as_secs()
    }
}

/// Clears the auto-execution flag when a run ends, unless a newer run has
/// already taken it over.
struct AutoRunGuard<'a> {
    flag: &'a AtomicU64,
    run_id: u64,
    bus: &'a EventBus<EngineEvent>,
}

impl Drop for AutoRunGuard<'_> {
    fn drop(&mut self) {
        if self
            .flag
            .compare_exchange(self.run_id, 0, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.bus.publish(EngineEvent::AutoExecutionChanged(false));
        }
    }
}

// ---------------------------------------------------------------------------
// SessionRunner
// ---------------------------------------------------------------------------

/// Drives autonomous sessions and their task queues.
///
/// Every event, output and stats change is also appended to the bounded
/// streaming log and published on the bus as [`EngineEvent::Streaming`].
#[derive(Clone)]
pub struct SessionRunner {
    state: Arc<RwLock<RunnerState>>,
    /// Id of the auto-execution run in charge, `0` when idle.
    auto_run: Arc<AtomicU64>,
    next_run_id: Arc<AtomicU64>,
    /// Held by an auto-execution run until its loop exits.
    run_lock: Arc<tokio::sync::Mutex<()>>,
    step_delay: Duration,
    inter_task_delay: Duration,
    logger: Arc<dyn ErrorLogger>,
    bus: EventBus<EngineEvent>,
}

impl SessionRunner {
    pub fn new(
        settings: SessionRunnerSettings,
        logger: Arc<dyn ErrorLogger>,
        bus: EventBus<EngineEvent>,
    ) -> Self {
        let state = RunnerState {
            sessions: Vec::new(),
            current: None,
            machine: SessionStateMachine::new(),
            events: RingBuffer::new(settings.event_capacity),
            outputs: RingBuffer::new(settings.output_capacity),
            streaming: RingBuffer::new(settings.streaming_capacity),
            stats: ExecutionStats::default(),
            stats_since: Instant::now(),
            command_history: RingBuffer::new(COMMAND_HISTORY_CAPACITY),
            task_error_simulation: settings.task_error_simulation,
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            auto_run: Arc::new(AtomicU64::new(0)),
            next_run_id: Arc::new(AtomicU64::new(1)),
            run_lock: Arc::new(tokio::sync::Mutex::new(())),
            step_delay: settings.step_delay,
            inter_task_delay: settings.inter_task_delay,
            logger,
            bus,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, RunnerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RunnerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -- snapshots ----------------------------------------------------------

    pub fn current_session(&self) -> Option<SessionInfo> {
        self.read().current().cloned()
    }

    /// Every session started so far, oldest first.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.read().sessions.clone()
    }

    /// Transitions applied to the current session.
    pub fn session_transitions(&self) -> Vec<(SessionStatus, SessionEvent, SessionStatus)> {
        self.read().machine.history().to_vec()
    }

    pub fn events(&self) -> Vec<TaskEvent> {
        self.read().events.to_vec()
    }

    pub fn outputs(&self) -> Vec<ReplOutput> {
        self.read().outputs.to_vec()
    }

    pub fn streaming_updates(&self) -> Vec<StreamingUpdate> {
        self.read().streaming.to_vec()
    }

    pub fn stats(&self) -> ExecutionStats {
        self.read().stats.clone()
    }

    pub fn command_history(&self) -> Vec<ReplCommand> {
        self.read().command_history.to_vec()
    }

    pub fn is_auto_executing(&self) -> bool {
        self.auto_run.load(Ordering::SeqCst) != 0
    }

    /// Names of the current session's demo tasks still pending, in order.
    pub fn available_tasks(&self) -> Vec<String> {
        self.read()
            .current()
            .map(SessionInfo::pending_task_names)
            .unwrap_or_default()
    }

    fn current_session_id(&self) -> Option<String> {
        self.read().current().map(|s| s.id.clone())
    }

    // -- session lifecycle --------------------------------------------------

    /// Start a new current session, completing the previous one if any.
    pub fn start_session(&self, id: Option<String>) -> String {
        let id = id.unwrap_or_else(|| generate_id("session"));
        {
            let mut state = self.write();
            if state.current.is_some() && !state.machine.is_terminal() {
                if let Ok(prev) = state.transition_current(SessionEvent::Stop) {
                    info!(session_id = %prev, "previous session completed");
                }
            }
            let index = state.sessions.len();
            state.sessions.push(SessionInfo::new(id.clone()));
            state.current = Some(index);
            state.machine = SessionStateMachine::new();
            state.stats.uptime = 0;
            state.stats_since = Instant::now();
        }
        info!(session_id = %id, "session started");
        self.bus.publish(EngineEvent::SessionChanged);
        self.add_output(ReplOutput::system(format!("Session {id} started")));
        id
    }

    pub fn stop_session(&self) {
        let stopped = {
            let mut state = self.write();
            if state.current.is_none() {
                return;
            }
            let result = state.transition_current(SessionEvent::Stop);
            state.current = None;
            result
        };
        match stopped {
            Ok(id) => {
                info!(session_id = %id, "session stopped");
                self.bus.publish(EngineEvent::SessionChanged);
                self.add_output(ReplOutput::system(format!("Session {id} stopped")));
            }
            Err(e) => debug!("stop ignored: {e}"),
        }
    }

    pub fn pause_session(&self) {
        self.toggle_session(SessionEvent::Pause, "paused");
    }

    pub fn resume_session(&self) {
        self.toggle_session(SessionEvent::Resume, "resumed");
    }

    fn toggle_session(&self, event: SessionEvent, verb: &str) {
        let result = {
            let mut state = self.write();
            if state.current.is_none() {
                return;
            }
            state.transition_current(event)
        };
        match result {
            Ok(id) => {
                self.bus.publish(EngineEvent::SessionChanged);
                self.add_output(ReplOutput::system(format!("Session {id} {verb}")));
            }
            Err(e) => debug!("{event} ignored: {e}"),
        }
    }

    /// Start a mock session counting the nine fixed mock tasks.
    pub fn generate_mock_session(&self) -> String {
        let id = self.start_session(Some(generate_id("mock-session")));
        if let Some(session) = self.write().current_mut() {
            session.kind = SessionKind::Mock;
            session.total_tasks = MOCK_TASKS.len();
            session.current_phase = "Development".into();
        }
        self.bus.publish(EngineEvent::SessionChanged);
        self.add_output(ReplOutput::system(format!(
            "Mock session initialized with {} tasks",
            MOCK_TASKS.len()
        )));
        id
    }

    /// Start a session seeded with the demo task queue.
    pub fn start_demo_session(&self) -> String {
        let id = self.start_session(Some(generate_id("demo-session")));
        if let Some(session) = self.write().current_mut() {
            session.kind = SessionKind::Demo;
            session.total_tasks = DEMO_TASKS.len();
            session.current_phase = "Autonomous Development".into();
            session.demo_tasks = Some(demo_task_queue());
        }
        self.bus.publish(EngineEvent::SessionChanged);

        self.add_output(ReplOutput::system(
            "🚀 Demo session started! This showcases autonomous coding capabilities.",
        ));
        self.add_output(ReplOutput::system(format!(
            "📋 {} tasks queued for execution. Use 'execute <task>' to run individual tasks.",
            DEMO_TASKS.len()
        )));
        self.add_output(ReplOutput::system(
            "💡 Try commands: 'auto-execute' for continuous execution, 'monitor' for stats, 'status' for session info",
        ));
        id
    }

    // -- logs ---------------------------------------------------------------

    /// Record a task event. `completed` and `failed` events count towards
    /// the current session's task totals.
    pub fn add_event(&self, event: TaskEvent) {
        {
            let mut state = self.write();
            state.events.push(event.clone());
            if let Some(session) = state.current_mut() {
                match event.event_type {
                    TaskEventType::Completed => session.completed_tasks += 1,
                    TaskEventType::Failed => session.failed_tasks += 1,
                    _ => {}
                }
            }
        }
        self.add_streaming_update(StreamingUpdate::new(StreamingPayload::Event(event)));
    }

    pub fn add_output(&self, output: ReplOutput) {
        self.write().outputs.push(output.clone());
        self.add_streaming_update(StreamingUpdate::new(StreamingPayload::Output(output)));
    }

    pub fn add_streaming_update(&self, update: StreamingUpdate) {
        self.write().streaming.push(update.clone());
        self.bus.publish(EngineEvent::Streaming(update));
    }

    pub fn clear_events(&self) {
        self.write().events.clear();
    }

    pub fn clear_output(&self) {
        self.write().outputs.clear();
    }

    pub fn add_command(&self, command: ReplCommand) {
        self.write().command_history.push(command);
    }

    /// Merge `update` into the stats and stream the result.
    pub fn update_stats(&self, update: StatsUpdate) {
        let stats = {
            let mut state = self.write();
            state.stats.apply(&update);
            state.stats.clone()
        };
        self.add_streaming_update(StreamingUpdate::new(StreamingPayload::Stats(stats)));
    }

    /// Refresh the uptime stat from the session clock.
    pub fn refresh_uptime(&self) -> ExecutionStats {
        let mut state = self.write();
        state.stats.uptime = state.uptime();
        state.stats.clone()
    }

    pub fn set_task_error_simulation(&self, update: ErrorSimulationUpdate) {
        self.write().task_error_simulation.apply(&update);
    }

    // -- task execution -----------------------------------------------------

    /// Run one simulated task in the current session.
    pub async fn simulate_task_execution(&self, task_name: &str) -> Result<(), SessionError> {
        let session_id = self
            .current_session_id()
            .ok_or(SessionError::NoActiveSession)?;
        let task_id = generate_id("task");
        let started = Instant::now();
        let event = |kind: TaskEventType, content: String, progress: u8| {
            let mut event =
                TaskEvent::new(kind, &task_id, task_name, content).with_progress(progress);
            event.metadata = Some(json!({ "session_id": session_id }));
            event
        };

        if let Some(session) = self.write().current_mut() {
            session.mark_demo_task(task_name, DemoTaskStatus::Running);
        }
        self.add_event(event(TaskEventType::Started, format!("Started: {task_name}"), 0));
        let running = self.stats().running_tasks;
        self.update_stats(StatsUpdate {
            running_tasks: Some(running + 1),
            ..StatsUpdate::default()
        });

        for progress in (0..=100u8).step_by(TASK_PROGRESS_STEP) {
            tokio::time::sleep(self.step_delay).await;

            let sim = self.read().task_error_simulation.clone();
            if sim.should_fail(progress, rand::random::<f64>()) {
                self.add_event(event(
                    TaskEventType::Failed,
                    format!("Failed: {task_name} at {progress}%"),
                    progress,
                ));
                self.finish_task(task_name, DemoTaskStatus::Failed, started);
                warn!(task = task_name, progress, "task failed");
                return Err(SessionError::TaskFailed {
                    task: task_name.to_string(),
                    progress,
                });
            }

            if progress < 100 {
                self.add_event(event(
                    TaskEventType::Progress,
                    format!("Progress: {progress}%"),
                    progress,
                ));
            }
        }

        self.add_event(event(
            TaskEventType::Completed,
            format!("Completed: {task_name}"),
            100,
        ));
        self.finish_task(task_name, DemoTaskStatus::Completed, started);
        debug!(task = task_name, "task completed");
        Ok(())
    }

    fn finish_task(&self, task_name: &str, outcome: DemoTaskStatus, started: Instant) {
        let stats = {
            let mut guard = self.write();
            let state = &mut *guard;
            if let Some(session) = state.current_mut() {
                session.mark_demo_task(task_name, outcome);
            }

            let uptime = state.uptime();
            let s = &mut state.stats;
            let previous = s.total_tasks as f64;
            s.total_tasks += 1;
            if outcome == DemoTaskStatus::Completed {
                s.completed_tasks += 1;
            } else {
                s.failed_tasks += 1;
            }
            s.running_tasks = s.running_tasks.saturating_sub(1);
            s.average_task_time = (s.average_task_time * previous + started.elapsed().as_secs_f64())
                / s.total_tasks as f64;
            s.success_rate = s.completed_tasks as f64 / s.total_tasks as f64 * 100.0;
            let minutes = (state.stats_since.elapsed().as_secs_f64() / 60.0).max(1.0 / 60.0);
            s.current_throughput = s.total_tasks as f64 / minutes;
            s.uptime = uptime;
            s.clone()
        };
        self.add_streaming_update(StreamingUpdate::new(StreamingPayload::Stats(stats)));
    }

    // -- auto execution -----------------------------------------------------

    /// Run every available task in order until done, paused or failed.
    ///
    /// Never fails: missing preconditions and task failures are reported as
    /// outputs and to the error log.
    ///
    /// A run started while a paused one is still finishing its task waits
    /// for that run to exit, so at most one task executes at a time.
    pub async fn auto_execute_all(&self) {
        let Some(session_id) = self.current_session_id() else {
            self.add_output(ReplOutput::system("No active session for auto-execution"));
            return;
        };
        if self.available_tasks().is_empty() {
            self.add_output(ReplOutput::system("No tasks available for auto-execution"));
            return;
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst);
        if self
            .auto_run
            .compare_exchange(0, run_id, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.add_output(ReplOutput::system("Autonomous execution already in progress"));
            return;
        }
        let _guard = AutoRunGuard {
            flag: &self.auto_run,
            run_id,
            bus: &self.bus,
        };
        self.bus.publish(EngineEvent::AutoExecutionChanged(true));

        let _exclusive = self.run_lock.lock().await;
        let tasks = self.available_tasks();
        if tasks.is_empty() {
            self.add_output(ReplOutput::system("No tasks available for auto-execution"));
            return;
        }
        info!(session_id = %session_id, run_id, tasks = tasks.len(), "auto-execution started");

        self.add_output(ReplOutput::system(format!(
            "🤖 Starting autonomous execution of {} tasks...",
            tasks.len()
        )));

        let mut completed = 0;
        for task in &tasks {
            if self.auto_run.load(Ordering::SeqCst) != run_id {
                break;
            }
            if let Err(e) = self.simulate_task_execution(task).await {
                self.add_output(ReplOutput::error(format!("❌ Auto-execution failed: {e}")));
                self.logger
                    .log_error(&e, json!({ "session_id": session_id, "task": task }))
                    .await;
                return;
            }
            completed += 1;
            tokio::time::sleep(self.inter_task_delay).await;
        }

        if completed == tasks.len() {
            self.add_output(ReplOutput::system(
                "✅ Autonomous execution completed successfully!",
            ));
        } else {
            self.add_output(ReplOutput::system(format!(
                "⏸️ Autonomous execution stopped after {completed} of {} tasks",
                tasks.len()
            )));
        }
        info!(session_id = %session_id, run_id, completed, "auto-execution finished");
    }

    /// Stop the running auto-execution before its next task. The task in
    /// flight still completes.
    pub fn pause_auto_execution(&self) {
        if self.auto_run.swap(0, Ordering::SeqCst) != 0 {
            self.bus.publish(EngineEvent::AutoExecutionChanged(false));
        }
        if self.current_session_id().is_some() {
            self.add_output(ReplOutput::system("⏸️ Autonomous execution paused"));
        }
    }

    /// Continue auto-execution over the tasks still pending.
    pub async fn resume_auto_execution(&self) {
        if self.current_session_id().is_none() {
            return;
        }
        self.add_output(ReplOutput::system("▶️ Autonomous execution resumed"));
        self.auto_execute_all().await;
    }
}
