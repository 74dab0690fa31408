use std::io::Write;

use ca_agents::events::EngineEvent;
use ca_core::types::{
    ExecutionStats, ReplCommand, ReplCommandType, ReplOutput, ReplOutputType, SessionInfo,
    StreamingPayload,
};
use chrono::Local;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;

use crate::app::AppContext;

const HELP: &str = "Available commands:
  start [sessionId]  - Start a new coding session
  demo              - Start a demo session with autonomous coding
  stop              - Stop the current session
  status            - Show session status
  clear             - Clear output
  help              - Show this help message
  task <name>       - Execute a specific task
  monitor           - Show execution statistics
  execute <task>    - Execute a task (alias for task)
  auto-execute      - Start autonomous execution of all pending tasks
  pause             - Pause autonomous execution
  resume            - Resume autonomous execution
  tasks             - List available tasks

Other:
  exit, quit        - Leave the REPL";

const WELCOME: &str = "🚀 Welcome to the Autonomous Coding REPL!
This demo showcases long-running autonomous coding sessions with real-time monitoring.
Quick start: Type \"demo\" to begin a demo session, then \"auto-execute\" to watch it run!
Type \"help\" for all available commands.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Interactive command loop over a [`SessionRunner`](ca_agents::session_runner::SessionRunner).
///
/// Auto-execution runs on a background task so `pause` can be entered
/// while it is in progress.
pub struct Repl {
    ctx: AppContext,
    background: Option<JoinHandle<()>>,
}

impl Repl {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            background: None,
        }
    }

    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let Some(command) = ReplCommand::parse(line) else {
            return Flow::Continue;
        };
        if let ReplCommandType::Unknown(word) = &command.command_type {
            if matches!(word.to_ascii_lowercase().as_str(), "exit" | "quit") {
                return Flow::Exit;
            }
        }

        let runner = &self.ctx.sessions;
        runner.add_command(command.clone());
        let mut echo = ReplOutput::command(format!("> {}", line.trim()));
        echo.metadata = Some(json!({ "command": line.split_whitespace().next() }));
        runner.add_output(echo);

        self.handle_command(&command).await;
        Flow::Continue
    }

    async fn handle_command(&mut self, command: &ReplCommand) {
        let runner = self.ctx.sessions.clone();
        let has_session = runner.current_session().is_some();

        match &command.command_type {
            ReplCommandType::Start => {
                if has_session {
                    self.say("Session already active. Use \"stop\" to end current session.");
                } else {
                    runner.start_session(command.args.first().cloned());
                }
            }
            ReplCommandType::Stop => {
                if has_session {
                    runner.stop_session();
                } else {
                    self.say("No active session to stop.");
                }
            }
            ReplCommandType::Status => {
                self.say(status_text(runner.current_session().as_ref()));
            }
            ReplCommandType::Clear => runner.clear_output(),
            ReplCommandType::Help => self.say(HELP),
            ReplCommandType::Task | ReplCommandType::Execute => {
                let name = if command.args.is_empty() {
                    "Unnamed Task".to_string()
                } else {
                    command.args.join(" ")
                };
                if !has_session {
                    self.say("No active session. Use \"start\" to begin a session.");
                } else if let Err(e) = runner.simulate_task_execution(&name).await {
                    runner.add_output(ReplOutput::error(format!("Error: {e}")));
                }
            }
            ReplCommandType::Monitor => {
                let stats = runner.refresh_uptime();
                self.say(monitor_text(&stats));
            }
            ReplCommandType::Demo => {
                if has_session {
                    self.say(
                        "Demo session already active or session exists. Use \"stop\" to end current session first.",
                    );
                } else {
                    runner.start_demo_session();
                }
            }
            ReplCommandType::AutoExecute => {
                if !has_session {
                    self.say("No active session. Use \"start\" or \"demo\" to begin a session.");
                } else if runner.is_auto_executing() {
                    self.say("Auto-execution is already running. Use \"pause\" to stop it.");
                } else {
                    self.spawn_background(async move { runner.auto_execute_all().await });
                }
            }
            ReplCommandType::Pause => {
                if runner.is_auto_executing() {
                    runner.pause_auto_execution();
                } else {
                    self.say("No auto-execution is currently running.");
                }
            }
            ReplCommandType::Resume => {
                if runner.is_auto_executing() {
                    self.say("Auto-execution is already running.");
                } else if has_session {
                    self.spawn_background(async move { runner.resume_auto_execution().await });
                } else {
                    self.say("No active session to resume.");
                }
            }
            ReplCommandType::Tasks => self.say(tasks_text(&runner.available_tasks())),
            ReplCommandType::Unknown(word) => {
                runner.add_output(ReplOutput::error(format!(
                    "Unknown command: {word}. Type \"help\" for available commands."
                )));
            }
        }
    }

    fn say(&self, text: impl Into<String>) {
        self.ctx.sessions.add_output(ReplOutput::output(text));
    }

    fn spawn_background<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.background = Some(tokio::spawn(fut));
    }

    /// Wait for the current background run, if any, to finish.
    pub async fn join_background(&mut self) {
        if let Some(handle) = self.background.take() {
            if let Err(e) = handle.await {
                tracing::warn!("background execution ended abnormally: {e}");
            }
        }
    }

    /// Stop auto-execution and let the task in flight finish.
    pub async fn shutdown(&mut self) {
        if self.ctx.sessions.is_auto_executing() {
            self.ctx.sessions.pause_auto_execution();
        }
        self.join_background().await;
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// `Hh Mm Ss`, dropping leading zero units.
pub fn format_uptime(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m {secs}s")
    } else if minutes > 0 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

fn bar(value: f64, full: &str, empty: &str) -> String {
    let filled = value.floor().clamp(0.0, 10.0) as usize;
    format!("{}{}", full.repeat(filled), empty.repeat(10 - filled))
}

pub fn monitor_text(stats: &ExecutionStats) -> String {
    let success_bar = bar(stats.success_rate / 10.0, "█", "░");
    let throughput_bar = bar(stats.current_throughput, "▸", "·");
    [
        "╭─── Execution Statistics ────────────────────────╮".to_string(),
        "│                                                 │".to_string(),
        "│  📊 Task Overview                               │".to_string(),
        format!(
            "│  ├─ Total Tasks:    {:<6} ✓ {:<4} ✗ {:<4} │",
            stats.total_tasks, stats.completed_tasks, stats.failed_tasks
        ),
        format!("│  └─ Running Now:    {:<6} ⚡                   │", stats.running_tasks),
        "│                                                 │".to_string(),
        "│  📈 Performance Metrics                         │".to_string(),
        format!(
            "│  ├─ Success Rate:   [{success_bar}] {:.1}%    │",
            stats.success_rate
        ),
        format!(
            "│  ├─ Throughput:     [{throughput_bar}] {:.2}/min │",
            stats.current_throughput
        ),
        format!(
            "│  ├─ Avg Task Time:  {:.2}s                      │",
            stats.average_task_time
        ),
        format!(
            "│  └─ Session Uptime: {}                   │",
            format_uptime(stats.uptime)
        ),
        "│                                                 │".to_string(),
        "╰─────────────────────────────────────────────────╯".to_string(),
    ]
    .join("\n")
}

pub fn status_text(session: Option<&SessionInfo>) -> String {
    match session {
        Some(s) => format!(
            "Session: {} ({})\nTasks: {}/{}\nPhase: {}",
            s.id, s.status, s.completed_tasks, s.total_tasks, s.current_phase
        ),
        None => "No active session".to_string(),
    }
}

pub fn tasks_text(tasks: &[String]) -> String {
    if tasks.is_empty() {
        return "No tasks available. Use \"demo\" to start a session with demo tasks.".to_string();
    }
    let list: Vec<String> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| format!("  {}. {task}", i + 1))
        .collect();
    format!("Available tasks:\n{}", list.join("\n"))
}

/// `[HH:MM:SS] content` in local time.
pub fn format_output_line(output: &ReplOutput) -> String {
    format!(
        "[{}] {}",
        output.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        output.content
    )
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Print streamed outputs until the bus goes away. Command echoes are
/// skipped since the terminal already shows the typed line.
fn spawn_printer(rx: flume::Receiver<EngineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = rx.recv_async().await {
            if let EngineEvent::Streaming(update) = event {
                if let StreamingPayload::Output(output) = update.payload {
                    if output.output_type != ReplOutputType::Command {
                        println!("{}", format_output_line(&output));
                    }
                }
            }
        }
    })
}

fn prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}

/// Run the REPL over stdin until `exit`, `quit` or end of input.
pub async fn run(ctx: AppContext) -> anyhow::Result<()> {
    println!("{WELCOME}\n");
    let printer = spawn_printer(ctx.bus.subscribe());
    let mut repl = Repl::new(ctx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt();
    while let Some(line) = lines.next_line().await? {
        if repl.handle_line(&line).await == Flow::Exit {
            break;
        }
        prompt();
    }

    repl.shutdown().await;
    // Let the printer flush what the shutdown produced.
    tokio::task::yield_now().await;
    printer.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ca_core::config::Config;
    use ca_telemetry::error_log::MemoryErrorLogger;

    use super::*;

    fn repl() -> Repl {
        let mut config = Config::default();
        config.execution.task_step_delay_ms = 0;
        config.execution.inter_task_delay_ms = 0;
        let ctx = AppContext::with_logger(&config, Arc::new(MemoryErrorLogger::new()));
        Repl::new(ctx)
    }

    fn last_output(repl: &Repl) -> ReplOutput {
        repl.ctx.sessions.outputs().pop().unwrap()
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(59), "59s");
        assert_eq!(format_uptime(61), "1m 1s");
        assert_eq!(format_uptime(3600), "1h 0m 0s");
        assert_eq!(format_uptime(3725), "1h 2m 5s");
    }

    #[test]
    fn monitor_bars_scale_to_ten() {
        let stats = ExecutionStats {
            success_rate: 75.0,
            current_throughput: 3.5,
            ..ExecutionStats::default()
        };
        let text = monitor_text(&stats);
        assert!(text.contains("[███████░░░] 75.0%"), "{text}");
        assert!(text.contains("[▸▸▸·······] 3.50/min"), "{text}");

        let maxed = ExecutionStats {
            success_rate: 100.0,
            current_throughput: 42.0,
            ..ExecutionStats::default()
        };
        let text = monitor_text(&maxed);
        assert!(text.contains("[██████████] 100.0%"));
        assert!(text.contains("[▸▸▸▸▸▸▸▸▸▸] 42.00/min"));
    }

    #[test]
    fn tasks_are_numbered() {
        let text = tasks_text(&["a".into(), "b".into()]);
        assert_eq!(text, "Available tasks:\n  1. a\n  2. b");
        assert!(tasks_text(&[]).starts_with("No tasks available."));
    }

    #[test]
    fn status_without_session() {
        assert_eq!(status_text(None), "No active session");
    }

    #[tokio::test]
    async fn exit_and_blank_lines() {
        let mut repl = repl();
        assert_eq!(repl.handle_line("   ").await, Flow::Continue);
        assert!(repl.ctx.sessions.outputs().is_empty());
        assert_eq!(repl.handle_line("quit").await, Flow::Exit);
        assert_eq!(repl.handle_line("EXIT").await, Flow::Exit);
        assert!(repl.ctx.sessions.command_history().is_empty());
    }

    #[tokio::test]
    async fn commands_are_echoed_and_recorded() {
        let mut repl = repl();
        repl.handle_line("status").await;
        let outputs = repl.ctx.sessions.outputs();
        assert_eq!(outputs[0].output_type, ReplOutputType::Command);
        assert_eq!(outputs[0].content, "> status");
        assert_eq!(outputs[1].content, "No active session");
        assert_eq!(repl.ctx.sessions.command_history().len(), 1);
    }

    #[tokio::test]
    async fn start_guards_against_a_second_session() {
        let mut repl = repl();
        repl.handle_line("start s-1").await;
        assert_eq!(repl.ctx.sessions.current_session().unwrap().id, "s-1");
        repl.handle_line("start").await;
        assert_eq!(
            last_output(&repl).content,
            "Session already active. Use \"stop\" to end current session."
        );
        repl.handle_line("demo").await;
        assert!(last_output(&repl).content.starts_with("Demo session already active"));
    }

    #[tokio::test]
    async fn session_commands_need_a_session() {
        let mut repl = repl();
        repl.handle_line("stop").await;
        assert_eq!(last_output(&repl).content, "No active session to stop.");
        repl.handle_line("task build it").await;
        assert_eq!(
            last_output(&repl).content,
            "No active session. Use \"start\" to begin a session."
        );
        repl.handle_line("auto-execute").await;
        assert!(last_output(&repl).content.starts_with("No active session."));
        repl.handle_line("pause").await;
        assert_eq!(
            last_output(&repl).content,
            "No auto-execution is currently running."
        );
        repl.handle_line("resume").await;
        assert_eq!(last_output(&repl).content, "No active session to resume.");
    }

    #[tokio::test]
    async fn unknown_command_is_an_error() {
        let mut repl = repl();
        repl.handle_line("frobnicate").await;
        let out = last_output(&repl);
        assert_eq!(out.output_type, ReplOutputType::Error);
        assert_eq!(
            out.content,
            "Unknown command: frobnicate. Type \"help\" for available commands."
        );
    }

    #[tokio::test]
    async fn execute_joins_task_words() {
        let mut repl = repl();
        repl.handle_line("start").await;
        repl.handle_line("execute Write unit tests").await;
        let events = repl.ctx.sessions.events();
        assert_eq!(events[0].task_name, "Write unit tests");
        repl.handle_line("task").await;
        assert_eq!(repl.ctx.sessions.events().last().unwrap().task_name, "Unnamed Task");
        assert_eq!(repl.ctx.sessions.current_session().unwrap().completed_tasks, 2);
    }

    #[tokio::test]
    async fn demo_then_auto_execute_in_background() {
        let mut repl = repl();
        repl.handle_line("demo").await;
        repl.handle_line("tasks").await;
        assert!(last_output(&repl).content.contains("10. Deploy to production"));

        repl.handle_line("auto-execute").await;
        repl.join_background().await;
        let session = repl.ctx.sessions.current_session().unwrap();
        assert_eq!(session.completed_tasks, 10);

        repl.handle_line("monitor").await;
        assert!(last_output(&repl).content.contains("100.0%"));
        repl.handle_line("clear").await;
        assert!(repl.ctx.sessions.outputs().is_empty());
        repl.shutdown().await;
        assert!(!repl.ctx.sessions.is_auto_executing());
    }

    #[test]
    fn output_lines_carry_a_clock_prefix() {
        let line = format_output_line(&ReplOutput::system("ready"));
        assert_eq!(line.len(), "[00:00:00] ready".len());
        assert!(line.starts_with('['));
        assert!(line.ends_with("] ready"));
    }
}
