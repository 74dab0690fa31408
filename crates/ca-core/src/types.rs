use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Build a short unique identifier of the form `{prefix}-{millis}-{suffix}`,
/// where the suffix is the first nine hex digits of a v4 UUID.
pub fn generate_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}-{}", Utc::now().timestamp_millis(), &suffix[..9])
}

// ---------------------------------------------------------------------------
// IssueStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl IssueStatus {
    /// Returns `true` when a transition from `self` to `target` is valid.
    ///
    /// `Completed` is absorbing. An issue left `InProgress` by an earlier
    /// run may be picked up again.
    pub fn can_transition_to(&self, target: &IssueStatus) -> bool {
        matches!(
            (self, target),
            (IssueStatus::Pending, IssueStatus::InProgress)
                | (IssueStatus::Failed, IssueStatus::InProgress)
                | (IssueStatus::InProgress, IssueStatus::InProgress)
                | (IssueStatus::InProgress, IssueStatus::Completed)
                | (IssueStatus::InProgress, IssueStatus::Failed)
        )
    }

    /// Whether a batch run should pick this issue up.
    pub fn is_executable(&self) -> bool {
        !matches!(self, IssueStatus::Completed)
    }
}

impl fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IssueStatus::Pending => "pending",
            IssueStatus::InProgress => "in-progress",
            IssueStatus::Completed => "completed",
            IssueStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: IssueStatus,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    /// Recorded for display only; execution order ignores them.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Issue {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: IssueStatus::Pending,
            acceptance_criteria: Vec::new(),
            dependencies: Vec::new(),
            assigned_agent: None,
            output: None,
            error: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_status(mut self, status: IssueStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_criteria<I, S>(mut self, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.acceptance_criteria = criteria.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output(mut self, line: impl Into<String>) -> Self {
        self.output = Some(vec![line.into()]);
        self
    }
}

// ---------------------------------------------------------------------------
// ProjectStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub total_issues: usize,
    pub completed_issues: usize,
    pub failed_issues: usize,
    pub in_progress: usize,
    pub pending: usize,
    pub current_phase: String,
    pub last_updated: DateTime<Utc>,
}

impl ProjectStatus {
    pub fn from_issues(issues: &[Issue], phase: impl Into<String>) -> Self {
        let mut status = Self {
            total_issues: 0,
            completed_issues: 0,
            failed_issues: 0,
            in_progress: 0,
            pending: 0,
            current_phase: phase.into(),
            last_updated: Utc::now(),
        };
        status.recompute(issues);
        status
    }

    /// Recount every bucket from `issues` and bump `last_updated`.
    pub fn recompute(&mut self, issues: &[Issue]) {
        let count = |s: IssueStatus| issues.iter().filter(|i| i.status == s).count();
        self.total_issues = issues.len();
        self.completed_issues = count(IssueStatus::Completed);
        self.failed_issues = count(IssueStatus::Failed);
        self.in_progress = count(IssueStatus::InProgress);
        self.pending = count(IssueStatus::Pending);
        self.last_updated = Utc::now();
    }

    pub fn is_consistent(&self) -> bool {
        self.completed_issues + self.failed_issues + self.in_progress + self.pending
            == self.total_issues
    }
}

// ---------------------------------------------------------------------------
// ExecutionState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub is_running: bool,
    pub current_issue_id: Option<String>,
    pub progress: u8,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
    /// Accepted when reading stored sessions; the runner never enters it.
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    #[default]
    Standard,
    Demo,
    Mock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemoTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoTask {
    pub id: String,
    pub name: String,
    pub status: DemoTaskStatus,
    pub description: String,
    pub estimated_time_ms: u64,
}

/// Ordered queue of tasks seeded into a demo session.
pub type DemoTaskQueue = Vec<DemoTask>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub current_phase: String,
    #[serde(default)]
    pub kind: SessionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demo_tasks: Option<DemoTaskQueue>,
}

impl SessionInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            current_phase: "Initialization".into(),
            kind: SessionKind::Standard,
            demo_tasks: None,
        }
    }

    /// Names of demo tasks still waiting to run, in queue order.
    pub fn pending_task_names(&self) -> Vec<String> {
        self.demo_tasks
            .iter()
            .flatten()
            .filter(|t| t.status == DemoTaskStatus::Pending)
            .map(|t| t.name.clone())
            .collect()
    }

    /// Update the first demo task named `name` that was not yet finished.
    pub fn mark_demo_task(&mut self, name: &str, status: DemoTaskStatus) -> bool {
        let Some(tasks) = self.demo_tasks.as_mut() else {
            return false;
        };
        match tasks.iter_mut().find(|t| {
            t.name == name
                && matches!(t.status, DemoTaskStatus::Pending | DemoTaskStatus::Running)
        }) {
            Some(task) => {
                task.status = status;
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// TaskEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventType {
    Started,
    Progress,
    Completed,
    Failed,
    Output,
    Error,
}

impl fmt::Display for TaskEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskEventType::Started => "started",
            TaskEventType::Progress => "progress",
            TaskEventType::Completed => "completed",
            TaskEventType::Failed => "failed",
            TaskEventType::Output => "output",
            TaskEventType::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: TaskEventType,
    pub task_id: String,
    pub task_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl TaskEvent {
    pub fn new(
        event_type: TaskEventType,
        task_id: impl Into<String>,
        task_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id("event"),
            timestamp: Utc::now(),
            event_type,
            task_id: task_id.into(),
            task_name: task_name.into(),
            content: content.into(),
            progress: None,
            metadata: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

// ---------------------------------------------------------------------------
// REPL output and commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplOutputType {
    Command,
    Output,
    Error,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplOutput {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub output_type: ReplOutputType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ReplOutput {
    pub fn new(output_type: ReplOutputType, content: impl Into<String>) -> Self {
        Self {
            id: generate_id("output"),
            timestamp: Utc::now(),
            output_type,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ReplOutputType::System, content)
    }

    pub fn output(content: impl Into<String>) -> Self {
        Self::new(ReplOutputType::Output, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ReplOutputType::Error, content)
    }

    pub fn command(content: impl Into<String>) -> Self {
        Self::new(ReplOutputType::Command, content)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplCommandType {
    Start,
    Stop,
    Status,
    Clear,
    Help,
    Task,
    Monitor,
    Execute,
    Demo,
    AutoExecute,
    Pause,
    Resume,
    Tasks,
    Unknown(String),
}

impl ReplCommandType {
    pub fn parse(word: &str) -> Self {
        match word.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "stop" => Self::Stop,
            "status" => Self::Status,
            "clear" => Self::Clear,
            "help" => Self::Help,
            "task" => Self::Task,
            "monitor" => Self::Monitor,
            "execute" => Self::Execute,
            "demo" => Self::Demo,
            "auto-execute" => Self::AutoExecute,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "tasks" => Self::Tasks,
            _ => Self::Unknown(word.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplCommand {
    #[serde(rename = "type")]
    pub command_type: ReplCommandType,
    pub args: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ReplCommand {
    /// Split a raw input line into a command word and its arguments.
    /// Returns `None` for blank input.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let word = parts.next()?;
        Some(Self {
            command_type: ReplCommandType::parse(word),
            args: parts.map(str::to_string).collect(),
            timestamp: Utc::now(),
        })
    }
}

// ---------------------------------------------------------------------------
// ExecutionStats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub running_tasks: usize,
    /// Running mean, in seconds.
    pub average_task_time: f64,
    /// Percentage of completed over total.
    pub success_rate: f64,
    /// Tasks per minute since the session started.
    pub current_throughput: f64,
    /// Seconds.
    pub uptime: u64,
}

/// Partial stats update; absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsUpdate {
    pub total_tasks: Option<usize>,
    pub completed_tasks: Option<usize>,
    pub failed_tasks: Option<usize>,
    pub running_tasks: Option<usize>,
    pub average_task_time: Option<f64>,
    pub success_rate: Option<f64>,
    pub current_throughput: Option<f64>,
    pub uptime: Option<u64>,
}

impl ExecutionStats {
    pub fn apply(&mut self, update: &StatsUpdate) {
        if let Some(v) = update.total_tasks {
            self.total_tasks = v;
        }
        if let Some(v) = update.completed_tasks {
            self.completed_tasks = v;
        }
        if let Some(v) = update.failed_tasks {
            self.failed_tasks = v;
        }
        if let Some(v) = update.running_tasks {
            self.running_tasks = v;
        }
        if let Some(v) = update.average_task_time {
            self.average_task_time = v;
        }
        if let Some(v) = update.success_rate {
            self.success_rate = v;
        }
        if let Some(v) = update.current_throughput {
            self.current_throughput = v;
        }
        if let Some(v) = update.uptime {
            self.uptime = v;
        }
    }
}

// ---------------------------------------------------------------------------
// StreamingUpdate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamingPayload {
    Event(TaskEvent),
    Stats(ExecutionStats),
    Output(ReplOutput),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingUpdate {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: StreamingPayload,
}

impl StreamingUpdate {
    pub fn new(payload: StreamingPayload) -> Self {
        Self {
            id: generate_id("stream"),
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = generate_id("session");
        let b = generate_id("session");
        assert_ne!(a, b);
        assert!(a.starts_with("session-"));
    }

    #[test]
    fn generated_ids_carry_a_random_hex_suffix() {
        let id = generate_id("demo-session");
        let (rest, suffix) = id.rsplit_once('-').unwrap();
        let (prefix, millis) = rest.rsplit_once('-').unwrap();
        assert_eq!(prefix, "demo-session");
        assert!(millis.parse::<i64>().unwrap() > 0);
        assert_eq!(suffix.len(), 9);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn demo_task_marking_skips_finished_tasks() {
        let mut session = SessionInfo::new("s1");
        session.demo_tasks = Some(vec![
            DemoTask {
                id: "t1".into(),
                name: "Write unit tests".into(),
                status: DemoTaskStatus::Completed,
                description: String::new(),
                estimated_time_ms: 1000,
            },
            DemoTask {
                id: "t2".into(),
                name: "Write unit tests".into(),
                status: DemoTaskStatus::Pending,
                description: String::new(),
                estimated_time_ms: 1000,
            },
        ]);
        assert!(session.mark_demo_task("Write unit tests", DemoTaskStatus::Running));
        let tasks = session.demo_tasks.as_ref().unwrap();
        assert_eq!(tasks[0].status, DemoTaskStatus::Completed);
        assert_eq!(tasks[1].status, DemoTaskStatus::Running);
        assert!(!session.mark_demo_task("Missing", DemoTaskStatus::Running));
    }
}
