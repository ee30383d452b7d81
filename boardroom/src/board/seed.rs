//! Fixed demo data loaded at startup.

use chrono::{Days, NaiveDate};

use boardroom_proto::task::{Assignee, Priority, Progress, Task, TaskId};

use super::{Board, BoardError, Column, ColumnRole};

struct SeedTask {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    due_in_days: u64,
    priority: Priority,
    assignee: &'static str,
    comments: u32,
    progress: i64,
}

const SEED_TASKS: &[SeedTask] = &[
    SeedTask {
        id: "task-1",
        title: "Design quarterly report template",
        description: "Layout for the revenue and churn summary pages",
        due_in_days: 5,
        priority: Priority::High,
        assignee: "Alex Kim",
        comments: 3,
        progress: 0,
    },
    SeedTask {
        id: "task-2",
        title: "Connect billing data source",
        description: "Import invoices nightly into the reporting store",
        due_in_days: 9,
        priority: Priority::Medium,
        assignee: "Sam Ortiz",
        comments: 1,
        progress: 0,
    },
    SeedTask {
        id: "task-3",
        title: "Build churn dashboard",
        description: "Cohort retention chart with monthly drill-down",
        due_in_days: 3,
        priority: Priority::High,
        assignee: "Jordan Lee",
        comments: 5,
        progress: 60,
    },
    SeedTask {
        id: "task-4",
        title: "Schedule weekly email digest",
        description: "Send the KPI summary every Monday morning",
        due_in_days: 12,
        priority: Priority::Low,
        assignee: "Alex Kim",
        comments: 0,
        progress: 25,
    },
    SeedTask {
        id: "task-5",
        title: "Set up export to CSV",
        description: "Download any report table as CSV",
        due_in_days: 1,
        priority: Priority::Medium,
        assignee: "Sam Ortiz",
        comments: 2,
        progress: 100,
    },
    SeedTask {
        id: "task-6",
        title: "Write onboarding checklist",
        description: "First-week steps for new workspace admins",
        due_in_days: 2,
        priority: Priority::Low,
        assignee: "Jordan Lee",
        comments: 4,
        progress: 100,
    },
];

impl Board {
    /// The demo board: "To Do" (intake), "In Progress" and "Done".
    ///
    /// Deadlines are relative to `today`.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in data; the `Result` comes from
    /// [`Board::new`].
    pub fn seed(today: NaiveDate) -> Result<Self, BoardError> {
        let tasks = SEED_TASKS
            .iter()
            .map(|t| Task {
                id: TaskId::new(t.id),
                title: t.title.to_string(),
                description: t.description.to_string(),
                deadline: today
                    .checked_add_days(Days::new(t.due_in_days))
                    .unwrap_or(today),
                priority: t.priority,
                assignee: Assignee::named(t.assignee),
                comments: t.comments,
                progress: Progress::clamped(t.progress),
            })
            .collect();

        Self::new(
            vec![
                Column::new("todo", "To Do", ColumnRole::Intake).with_tasks(["task-1", "task-2"]),
                Column::new("in-progress", "In Progress", ColumnRole::Standard)
                    .with_tasks(["task-3", "task-4"]),
                Column::new("done", "Done", ColumnRole::Standard).with_tasks(["task-5", "task-6"]),
            ],
            tasks,
        )
    }
}
