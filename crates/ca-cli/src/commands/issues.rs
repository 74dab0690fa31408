use std::path::Path;

use anyhow::Context;
use ca_agents::demo::mock_issues;
use ca_core::config::ErrorSimulationUpdate;
use ca_core::types::Issue;
use serde_json::json;

use crate::app::AppContext;

/// Load issues from a JSON array file.
pub fn load_issues(path: &Path) -> anyhow::Result<Vec<Issue>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading issues from {}", path.display()))?;
    let issues: Vec<Issue> = serde_json::from_str(&text)
        .with_context(|| format!("parsing issues from {}", path.display()))?;
    Ok(issues)
}

/// Run the `issues` subcommand: execute every open issue and report.
pub async fn run(
    ctx: &AppContext,
    file: Option<&Path>,
    fail_rate: Option<f64>,
    min_progress: Option<u8>,
) -> anyhow::Result<()> {
    let issues = match file {
        Some(path) => load_issues(path)?,
        None => mock_issues(),
    };
    ctx.issues.load_issues(issues);

    if fail_rate.is_some() || min_progress.is_some() {
        ctx.issues.set_error_simulation(ErrorSimulationUpdate {
            enabled: Some(true),
            probability: fail_rate,
            min_progress_before_error: min_progress,
        });
    }

    let summary = ctx.issues.execute_all().await;

    for line in ctx.issues.output() {
        println!("{line}");
    }
    println!();
    for toast in ctx.toasts.drain() {
        println!("{} {}", toast.level.icon(), toast.message);
    }

    let status = ctx.issues.project_status();
    println!();
    println!("Project status  ({})", status.current_phase);
    println!("{}", "-".repeat(40));
    println!("Total issues:   {}", status.total_issues);
    println!("  completed:    {}", status.completed_issues);
    println!("  in progress:  {}", status.in_progress);
    println!("  pending:      {}", status.pending);
    println!("  failed:       {}", status.failed_issues);

    ctx.logger
        .log_info(
            &summary.to_string(),
            json!({ "succeeded": summary.succeeded, "failed": summary.failed }),
        )
        .await;
    Ok(())
}
