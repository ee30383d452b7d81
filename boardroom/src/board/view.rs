//! Read-only projections of a [`Board`] used by the board and timeline
//! views. Nothing here mutates.

use std::collections::HashMap;

use boardroom_proto::task::{ColumnId, Progress, Task, TaskId};

use super::{Board, Column};

/// A column with its tasks resolved, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnView<'a> {
    /// The column.
    pub column: &'a Column,
    /// Its tasks, top to bottom.
    pub tasks: Vec<&'a Task>,
    /// Mean progress of the tasks (zero when empty).
    pub progress: Progress,
}

fn mean_progress<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Progress {
    let (sum, count) = tasks
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), t| {
            (sum + i64::from(t.progress.get()), count + 1)
        });
    if count == 0 {
        return Progress::ZERO;
    }
    Progress::clamped((sum + count / 2) / count)
}

impl Board {
    /// Columns left to right, each with its resolved tasks.
    #[must_use]
    pub fn columns(&self) -> Vec<ColumnView<'_>> {
        self.order
            .iter()
            .filter_map(|id| self.columns.get(id))
            .map(|column| {
                let tasks: Vec<&Task> = column
                    .task_ids
                    .iter()
                    .filter_map(|id| self.tasks.get(id))
                    .collect();
                let progress = mean_progress(tasks.iter().copied());
                ColumnView {
                    column,
                    tasks,
                    progress,
                }
            })
            .collect()
    }

    /// Every task ordered by deadline, ties broken by title.
    #[must_use]
    pub fn timeline(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.values().collect();
        tasks.sort_by(|a, b| {
            a.deadline
                .cmp(&b.deadline)
                .then_with(|| a.title.cmp(&b.title))
                .then_with(|| a.id.cmp(&b.id))
        });
        tasks
    }

    /// Mean progress of one column, or `None` for an unknown column.
    #[must_use]
    pub fn column_progress(&self, column_id: &ColumnId) -> Option<Progress> {
        let column = self.columns.get(column_id)?;
        Some(mean_progress(
            column.task_ids.iter().filter_map(|id| self.tasks.get(id)),
        ))
    }

    /// Mean progress across the whole board.
    #[must_use]
    pub fn overall_progress(&self) -> Progress {
        mean_progress(self.tasks.values())
    }

    /// Tasks whose title or description contains `term`, ignoring case.
    ///
    /// The empty term selects every task. Any other term, surrounding
    /// whitespace included, is matched as given.
    #[must_use]
    pub fn filter(&self, term: &str) -> HashMap<&TaskId, &Task> {
        let needle = term.to_lowercase();
        self.tasks
            .iter()
            .filter(|(_, task)| {
                needle.is_empty()
                    || task.title.to_lowercase().contains(&needle)
                    || task.description.to_lowercase().contains(&needle)
            })
            .collect()
    }
}
