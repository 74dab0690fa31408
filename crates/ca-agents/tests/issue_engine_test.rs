use std::sync::Arc;
use std::time::Duration;

use ca_agents::demo::mock_issues;
use ca_agents::events::EngineEvent;
use ca_agents::issue_engine::{IssueEngine, IssueEngineSettings, IssueError};
use ca_core::config::{ErrorSimulationConfig, ErrorSimulationUpdate};
use ca_core::event_bus::EventBus;
use ca_core::notifications::{ToastLevel, ToastQueue};
use ca_core::types::{Issue, IssueStatus};
use ca_harness::error_handlers::{AppError, ErrorCategory, ErrorHandler, ErrorHandlerChain};
use ca_telemetry::error_log::{LogLevel, MemoryErrorLogger};

struct Harness {
    engine: IssueEngine,
    logger: Arc<MemoryErrorLogger>,
    toasts: ToastQueue,
    bus: EventBus<EngineEvent>,
}

fn harness(settings: IssueEngineSettings) -> Harness {
    let logger = Arc::new(MemoryErrorLogger::new());
    let toasts = ToastQueue::new();
    let bus = EventBus::new();
    let engine = IssueEngine::new(
        settings,
        logger.clone(),
        Arc::new(toasts.clone()),
        bus.clone(),
    );
    Harness {
        engine,
        logger,
        toasts,
        bus,
    }
}

fn loaded() -> Harness {
    let h = harness(IssueEngineSettings::immediate());
    h.engine.load_issues(mock_issues());
    h
}

fn always_fail() -> ErrorSimulationConfig {
    ErrorSimulationConfig {
        enabled: true,
        probability: 1.0,
        min_progress_before_error: 0,
    }
}

#[test]
fn loading_recomputes_project_status() {
    let h = loaded();
    let status = h.engine.project_status();
    assert_eq!(status.total_issues, 3);
    assert_eq!(status.completed_issues, 1);
    assert_eq!(status.pending, 1);
    assert_eq!(status.in_progress, 1);
    assert_eq!(status.failed_issues, 0);
    assert!(status.is_consistent());
}

#[tokio::test]
async fn pending_issue_runs_to_completion() {
    let h = loaded();
    h.engine.execute_issue("2").await.unwrap();

    let issue = h.engine.issue("2").unwrap();
    assert_eq!(issue.status, IssueStatus::Completed);
    assert_eq!(
        issue.output,
        Some(vec!["Component Architecture completed successfully".to_string()])
    );
    assert!(issue.error.is_none());

    let exec = h.engine.execution();
    assert!(!exec.is_running);
    assert!(exec.current_issue_id.is_none());
    assert_eq!(exec.progress, 100);
    assert!(exec.end_time.is_some());

    let output = h.engine.output();
    // 0, 20, 40, 60, 80, 100 then the completion line.
    assert_eq!(output.len(), 7);
    assert!(output[0].ends_with("Executing Component Architecture: 0% complete"));
    assert!(output[5].ends_with("Executing Component Architecture: 100% complete"));
    assert!(output[6].ends_with("✅ Component Architecture completed successfully"));

    assert_eq!(h.engine.project_status().completed_issues, 2);
}

#[tokio::test]
async fn completed_issue_is_a_no_op() {
    let h = loaded();
    h.engine.execute_issue("1").await.unwrap();
    assert!(h.engine.output().is_empty());
    assert_eq!(h.engine.issue("1").unwrap().status, IssueStatus::Completed);
}

#[tokio::test]
async fn unknown_issue_is_a_no_op() {
    let h = loaded();
    h.engine.execute_issue("nope").await.unwrap();
    assert!(h.engine.output().is_empty());
    assert!(!h.engine.execution().is_running);
}

#[tokio::test]
async fn injected_fault_fails_the_issue() {
    let h = harness(IssueEngineSettings::immediate());
    h.engine
        .load_issues(vec![Issue::new("e1", "Error Test")]);
    h.engine
        .set_error_simulation(ErrorSimulationUpdate::always_fail(0));

    let err = h.engine.execute_issue("e1").await.unwrap_err();
    match &err {
        IssueError::Failed {
            issue_id,
            progress,
            category,
            message,
        } => {
            assert_eq!(issue_id, "e1");
            assert_eq!(*progress, 0);
            assert_eq!(*category, ErrorCategory::Unclassified);
            assert_eq!(message, "Execution failed at 0% progress");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let issue = h.engine.issue("e1").unwrap();
    assert_eq!(issue.status, IssueStatus::Failed);
    assert!(issue.error.as_deref().unwrap().contains("Execution failed"));
    assert!(issue.output.unwrap()[0].contains("failed"));

    let exec = h.engine.execution();
    assert!(!exec.is_running);
    assert_eq!(exec.error.as_deref(), Some("Execution failed at 0% progress"));
    assert_eq!(h.engine.project_status().failed_issues, 1);

    let errors = h.logger.entries_at(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].context_str("issue_id"), Some("e1"));
}

/// Treats simulated step failures as transient infrastructure faults.
struct SimulatedFaultHandler;

impl ErrorHandler for SimulatedFaultHandler {
    fn category(&self) -> ErrorCategory {
        ErrorCategory::StateCorruption
    }

    fn can_handle(&self, error: &AppError) -> bool {
        error.message.starts_with("Execution failed")
    }

    fn user_message(&self, _error: &AppError) -> String {
        "Simulated fault, safe to retry".to_string()
    }
}

#[tokio::test]
async fn custom_error_chain_classifies_failures() {
    let h = harness(IssueEngineSettings::immediate());
    let chain = ErrorHandlerChain::new(h.logger.clone()).with_handler(SimulatedFaultHandler);
    let engine = h.engine.with_error_chain(chain);
    engine.load_issues(vec![Issue::new("e1", "Error Test")]);
    engine.set_error_simulation(ErrorSimulationUpdate::always_fail(0));

    match engine.execute_issue("e1").await.unwrap_err() {
        IssueError::Failed {
            category, message, ..
        } => {
            assert_eq!(category, ErrorCategory::StateCorruption);
            assert_eq!(message, "Simulated fault, safe to retry");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(
        engine.issue("e1").unwrap().error.as_deref(),
        Some("Simulated fault, safe to retry")
    );

    let entries = h.logger.entries_at(LogLevel::Error);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].context.as_ref().unwrap()["type"], "state_corruption");
}

#[tokio::test]
async fn faults_wait_for_min_progress() {
    let h = harness(IssueEngineSettings::immediate());
    h.engine.load_issues(vec![Issue::new("p", "Progress Test")]);
    h.engine
        .set_error_simulation(ErrorSimulationUpdate::always_fail(30));

    let err = h.engine.execute_issue("p").await.unwrap_err();
    let IssueError::Failed { progress, .. } = err else {
        panic!("expected a failure");
    };
    assert_eq!(progress, 40);
    assert!(h.engine.execution().progress >= 20);
}

#[test]
fn partial_simulation_update_keeps_other_fields() {
    let h = loaded();
    h.engine.set_error_simulation(ErrorSimulationUpdate {
        probability: Some(0.5),
        ..ErrorSimulationUpdate::default()
    });
    let sim = h.engine.error_simulation();
    assert!(!sim.enabled);
    assert_eq!(sim.probability, 0.5);
    assert_eq!(sim.min_progress_before_error, 20);

    h.engine.set_error_simulation(ErrorSimulationUpdate {
        probability: Some(7.0),
        ..ErrorSimulationUpdate::default()
    });
    assert_eq!(h.engine.error_simulation().probability, 1.0);
}

#[tokio::test]
async fn failed_issue_can_be_rerun() {
    let h = harness(IssueEngineSettings::immediate());
    h.engine.load_issues(vec![Issue::new("r", "Rerun")]);
    h.engine.override_error_simulation("r", always_fail());
    assert!(h.engine.execute_issue("r").await.is_err());

    h.engine.clear_error_simulation_override("r");
    h.engine.execute_issue("r").await.unwrap();
    let issue = h.engine.issue("r").unwrap();
    assert_eq!(issue.status, IssueStatus::Completed);
    assert!(issue.error.is_none());
}

#[tokio::test]
async fn execute_all_retries_then_counts_failures() {
    let h = harness(IssueEngineSettings::immediate());
    h.engine.load_issues(vec![
        Issue::new("ok", "Will Pass"),
        Issue::new("bad", "Will Fail"),
    ]);
    h.engine.override_error_simulation("bad", always_fail());

    let summary = h.engine.execute_all().await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);

    let output = h.engine.output();
    let last = output.last().unwrap();
    assert!(last.contains("1 succeeded"), "{last}");
    assert!(last.contains("1 failed"), "{last}");

    // Initial attempt plus two retries.
    let attempts = output
        .iter()
        .filter(|l| l.contains("Executing Will Fail: 0% complete"))
        .count();
    assert_eq!(attempts, 3);

    let warnings = h.logger.entries_at(LogLevel::Warning);
    assert_eq!(warnings.len(), 2);
    assert_eq!(warnings[0].message, "Retry attempt 1 of 2");
    assert_eq!(warnings[1].message, "Retry attempt 2 of 2");

    assert_eq!(h.engine.issue("ok").unwrap().status, IssueStatus::Completed);
    assert_eq!(h.engine.issue("bad").unwrap().status, IssueStatus::Failed);

    let toasts = h.toasts.toasts();
    assert_eq!(toasts.last().unwrap().level, ToastLevel::Warning);
}

#[tokio::test]
async fn execute_all_skips_completed_issues() {
    let h = loaded();
    let summary = h.engine.execute_all().await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert!(h
        .engine
        .output()
        .last()
        .unwrap()
        .ends_with("Execution complete: 2 succeeded, 0 failed"));
    assert!(h
        .engine
        .issues()
        .iter()
        .all(|i| i.status == IssueStatus::Completed));
    assert_eq!(h.toasts.toasts().last().unwrap().level, ToastLevel::Success);
}

#[tokio::test(start_paused = true)]
async fn second_execution_is_rejected_while_busy() {
    let mut settings = IssueEngineSettings::immediate();
    settings.step_delay = Duration::from_millis(100);
    let h = harness(settings);
    h.engine.load_issues(mock_issues());

    let rx = h.bus.subscribe();
    let engine = h.engine.clone();
    let first = tokio::spawn(async move { engine.execute_issue("2").await });

    // The first IssuesChanged after spawning is the start of issue 2.
    loop {
        if rx.recv_async().await.unwrap() == EngineEvent::IssuesChanged {
            break;
        }
    }
    assert!(h.engine.execution().is_running);

    let err = h.engine.execute_issue("3").await.unwrap_err();
    assert_eq!(
        err,
        IssueError::Busy {
            running: "2".into()
        }
    );

    first.await.unwrap().unwrap();
    assert!(!h.engine.execution().is_running);
    assert_eq!(h.engine.issue("3").unwrap().status, IssueStatus::InProgress);
}

#[tokio::test]
async fn output_lines_are_timestamped() {
    let h = loaded();
    h.engine.add_output("hello");
    let line = &h.engine.output()[0];
    let bytes = line.as_bytes();
    assert_eq!(bytes[0], b'[');
    assert_eq!(bytes[3], b':');
    assert_eq!(bytes[6], b':');
    assert_eq!(bytes[9], b']');
    assert_eq!(&line[10..], " hello");

    h.engine.clear_output();
    assert!(h.engine.output().is_empty());
}

#[tokio::test]
async fn output_log_is_bounded() {
    let mut settings = IssueEngineSettings::immediate();
    settings.output_capacity = 4;
    let h = harness(settings);
    for i in 0..10 {
        h.engine.add_output(format!("line {i}"));
    }
    let output = h.engine.output();
    assert_eq!(output.len(), 4);
    assert!(output[0].ends_with("line 6"));
    assert!(output[3].ends_with("line 9"));
}

#[tokio::test]
async fn completion_raises_a_success_toast() {
    let h = loaded();
    h.engine.execute_issue("2").await.unwrap();
    let toasts = h.toasts.toasts();
    assert_eq!(toasts.len(), 1);
    assert_eq!(toasts[0].level, ToastLevel::Success);
    assert_eq!(
        toasts[0].message,
        "Component Architecture completed successfully"
    );
}
