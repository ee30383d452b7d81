// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! A planning session on the demo board, driven through the same command
//! surface the binary uses, checked against the board's projections.

use boardroom::app::{App, AppAction};
use boardroom::board::{Board, NewTask};
use boardroom_proto::task::{Assignee, ColumnId, Priority, Progress, TaskId};
use chrono::NaiveDate;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
}

fn column_ids(board: &Board, column: &str) -> Vec<String> {
    board
        .column(&ColumnId::new(column))
        .unwrap()
        .task_ids()
        .iter()
        .map(|id| id.as_str().to_string())
        .collect()
}

fn placed(board: &Board) -> usize {
    board
        .column_order()
        .iter()
        .map(|id| board.column(id).unwrap().task_ids().len())
        .sum()
}

#[test]
fn planning_session() {
    let mut app = App::new(Board::seed(today()).unwrap());
    assert_eq!(app.board().task_count(), 6);

    // New work lands at the bottom of the intake column.
    let actions = app.handle_line("/add Prepare board review | slides and metrics", today());
    assert!(matches!(actions.as_slice(), [AppAction::Print(_), AppAction::Notify(_)]));
    let todo = column_ids(app.board(), "todo");
    assert_eq!(todo.len(), 3);
    let new_id = TaskId::new(todo[2].clone());
    let added = app.board().task(&new_id).unwrap();
    assert_eq!(added.deadline, NaiveDate::from_ymd_opt(2026, 3, 9).unwrap());
    assert_eq!(added.priority, Priority::Medium);
    assert!(added.assignee.is_unassigned());
    assert_eq!(added.progress, Progress::ZERO);

    // Start it, then finish another.
    app.handle_line(&format!("/move {new_id} in-progress 0"), today());
    assert_eq!(column_ids(app.board(), "in-progress")[0], new_id.as_str());
    app.handle_line("/progress task-3 100", today());
    app.handle_line("/move task-3 done", today());
    assert_eq!(
        column_ids(app.board(), "done"),
        vec!["task-5", "task-6", "task-3"]
    );
    assert_eq!(
        app.board().column_progress(&ColumnId::new("done")),
        Some(Progress::COMPLETE)
    );

    // Drop a task nobody needs.
    app.handle_line("/delete task-4", today());
    assert_eq!(app.board().task_count(), 6);
    assert_eq!(placed(app.board()), app.board().task_count());

    // The timeline covers everything, soonest first.
    let timeline = app.board().timeline();
    assert_eq!(timeline.len(), 6);
    assert!(timeline.windows(2).all(|w| w[0].deadline <= w[1].deadline));

    // Search hits titles and descriptions.
    let hits = app.board().filter("METRICS");
    assert_eq!(hits.len(), 1);
    assert!(hits.contains_key(&new_id));
    assert_eq!(app.board().filter("").len(), 6);
}

#[test]
fn overall_progress_tracks_updates() {
    let mut board = Board::seed(today()).unwrap();
    let before = board.overall_progress();
    assert!(board.update_progress(&TaskId::new("task-1"), 100));
    assert!(board.overall_progress() > before);

    // Same value again changes nothing.
    assert!(!board.update_progress(&TaskId::new("task-1"), 100));
}

#[test]
fn fully_specified_task_keeps_its_fields() {
    let mut board = Board::seed(today()).unwrap().with_default_deadline_days(14);
    let deadline = NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
    let id = board
        .add_task_on(
            NewTask {
                title: "Security review".to_string(),
                description: "Pen test findings".to_string(),
                deadline: Some(deadline),
                priority: Priority::High,
                assignee: Some(Assignee::named("Sam Ortiz")),
            },
            today(),
        )
        .unwrap();
    let task = board.task(&id).unwrap();
    assert_eq!(task.deadline, deadline);
    assert_eq!(task.assignee.name, "Sam Ortiz");

    let defaulted = board.add_task_on(NewTask::titled("Follow-up"), today()).unwrap();
    assert_eq!(
        board.task(&defaulted).unwrap().deadline,
        NaiveDate::from_ymd_opt(2026, 3, 16).unwrap()
    );
}
