use ca_core::types::{generate_id, DemoTask, DemoTaskQueue, DemoTaskStatus, Issue, IssueStatus};
use rand::Rng;

/// Task names seeded into a demo session, in execution order.
pub const DEMO_TASKS: [&str; 10] = [
    "Analyze codebase structure",
    "Setup development environment",
    "Create React components",
    "Implement state management",
    "Add TypeScript definitions",
    "Configure build pipeline",
    "Write unit tests",
    "Implement error handling",
    "Add performance monitoring",
    "Deploy to production",
];

/// Task names counted by a mock session.
pub const MOCK_TASKS: [&str; 9] = [
    "Initialize project structure",
    "Set up development environment",
    "Create authentication system",
    "Implement user interface",
    "Add data persistence layer",
    "Configure deployment pipeline",
    "Run comprehensive tests",
    "Optimize performance",
    "Deploy to production",
];

/// Build a fresh pending queue from [`DEMO_TASKS`] with a random 1-4s
/// estimate per task.
pub fn demo_task_queue() -> DemoTaskQueue {
    let mut rng = rand::thread_rng();
    DEMO_TASKS
        .iter()
        .enumerate()
        .map(|(index, name)| DemoTask {
            id: generate_id(&format!("demo-task-{index}")),
            name: (*name).to_string(),
            status: DemoTaskStatus::Pending,
            description: format!("Demo task: {name}"),
            estimated_time_ms: rng.gen_range(1000..=4000),
        })
        .collect()
}

/// Starter issue set: one completed, one pending, one left in progress.
pub fn mock_issues() -> Vec<Issue> {
    vec![
        Issue::new("1", "Project Setup")
            .with_description("Initialize project with dependencies")
            .with_status(IssueStatus::Completed)
            .with_criteria(["Package.json created", "Dependencies installed"])
            .with_output("Project initialized successfully"),
        Issue::new("2", "Component Architecture")
            .with_description("Build core UI components")
            .with_criteria(["All components created", "TypeScript types defined"])
            .with_dependencies(["1"]),
        Issue::new("3", "State Management")
            .with_description("Implement Zustand stores")
            .with_status(IssueStatus::InProgress)
            .with_criteria(["Stores created", "Actions implemented"])
            .with_dependencies(["1"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_queue_is_pending_and_ordered() {
        let queue = demo_task_queue();
        assert_eq!(queue.len(), DEMO_TASKS.len());
        for (task, name) in queue.iter().zip(DEMO_TASKS) {
            assert_eq!(task.name, name);
            assert_eq!(task.status, DemoTaskStatus::Pending);
            assert!((1000..=4000).contains(&task.estimated_time_ms));
        }
    }

    #[test]
    fn mock_issues_cover_three_states() {
        let issues = mock_issues();
        assert_eq!(issues[0].status, IssueStatus::Completed);
        assert_eq!(issues[1].status, IssueStatus::Pending);
        assert_eq!(issues[2].status, IssueStatus::InProgress);
        assert_eq!(issues[1].dependencies, vec!["1"]);
    }
}
