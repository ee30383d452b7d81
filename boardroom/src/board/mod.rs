//! Board State Container.
//!
//! A [`Board`] owns every task record, the columns that order them, and
//! the left-to-right column order. Fields are private: the only way to
//! change a board is through the named operations below, so the
//! structural invariants hold after every call:
//!
//! - the column order is a permutation of the column ids,
//! - every task id in a column has a task record,
//! - every task record sits in exactly one column,
//! - exactly one column carries the [`ColumnRole::Intake`] role.
//!
//! Mutations are total. Malformed input (blank titles, unknown ids, stale
//! indices) turns an operation into a no-op instead of an error, and the
//! return value tells the caller whether anything changed.

mod seed;
pub mod view;

use std::collections::{HashMap, HashSet};

use chrono::{Days, NaiveDate};
use thiserror::Error;

use boardroom_proto::task::{Assignee, ColumnId, Priority, Progress, Task, TaskId};

pub use view::ColumnView;

/// Days added to today when a new task has no deadline.
pub const DEFAULT_DEADLINE_DAYS: u64 = 7;

/// Errors raised while assembling a board from columns and tasks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoardError {
    /// Two columns share an identifier.
    #[error("duplicate column id: {0}")]
    DuplicateColumn(ColumnId),
    /// Two task records share an identifier.
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),
    /// No column is tagged as the intake column.
    #[error("board has no intake column")]
    MissingIntake,
    /// More than one column is tagged as the intake column.
    #[error("columns {0} and {1} are both tagged as intake")]
    MultipleIntake(ColumnId, ColumnId),
    /// A column references a task with no record.
    #[error("column {column} references unknown task {task}")]
    UnknownTask {
        /// Column holding the dangling reference.
        column: ColumnId,
        /// The missing task.
        task: TaskId,
    },
    /// A task appears more than once across the columns.
    #[error("task {0} is placed more than once")]
    DuplicatePlacement(TaskId),
    /// A task record is not placed in any column.
    #[error("task {0} is not placed in any column")]
    UnplacedTask(TaskId),
}

/// Role a column plays on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnRole {
    /// New tasks are appended here.
    Intake,
    /// Any other column.
    #[default]
    Standard,
}

/// A named, ordered bucket of task references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    id: ColumnId,
    title: String,
    role: ColumnRole,
    task_ids: Vec<TaskId>,
}

impl Column {
    /// Creates an empty column.
    pub fn new(id: impl Into<String>, title: impl Into<String>, role: ColumnRole) -> Self {
        Self {
            id: ColumnId::new(id),
            title: title.into(),
            role,
            task_ids: Vec::new(),
        }
    }

    /// Sets the initial task order of this column.
    #[must_use]
    pub fn with_tasks<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.task_ids = ids.into_iter().map(TaskId::new).collect();
        self
    }

    /// Column identifier.
    #[must_use]
    pub const fn id(&self) -> &ColumnId {
        &self.id
    }

    /// Display title.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Column role.
    #[must_use]
    pub const fn role(&self) -> ColumnRole {
        self.role
    }

    /// Task ids in display order.
    #[must_use]
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_ids
    }

    /// Position of a task in this column.
    #[must_use]
    pub fn position(&self, task_id: &TaskId) -> Option<usize> {
        self.task_ids.iter().position(|id| id == task_id)
    }
}

/// Fields for a new task. Everything except the title has a default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    /// Title; blank titles are rejected.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Due date; defaults to a week from today.
    pub deadline: Option<NaiveDate>,
    /// Priority; defaults to medium.
    pub priority: Priority,
    /// Assignee; defaults to the "Unassigned" sentinel.
    pub assignee: Option<Assignee>,
}

impl NewTask {
    /// A new task with only a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// The complete Kanban data set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    tasks: HashMap<TaskId, Task>,
    columns: HashMap<ColumnId, Column>,
    order: Vec<ColumnId>,
    intake: ColumnId,
    default_deadline_days: u64,
}

impl Board {
    /// Assembles a board, checking every structural invariant once.
    ///
    /// `columns` is taken in display order.
    ///
    /// # Errors
    ///
    /// Returns a [`BoardError`] describing the first violated invariant.
    pub fn new(columns: Vec<Column>, tasks: Vec<Task>) -> Result<Self, BoardError> {
        let mut task_map = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if task_map.contains_key(&task.id) {
                return Err(BoardError::DuplicateTask(task.id));
            }
            task_map.insert(task.id.clone(), task);
        }

        let mut intake: Option<ColumnId> = None;
        let mut placed = HashSet::new();
        let mut order = Vec::with_capacity(columns.len());
        let mut column_map = HashMap::with_capacity(columns.len());

        for column in columns {
            if column_map.contains_key(&column.id) {
                return Err(BoardError::DuplicateColumn(column.id));
            }
            if column.role == ColumnRole::Intake {
                if let Some(existing) = &intake {
                    return Err(BoardError::MultipleIntake(existing.clone(), column.id));
                }
                intake = Some(column.id.clone());
            }
            for task_id in &column.task_ids {
                if !task_map.contains_key(task_id) {
                    return Err(BoardError::UnknownTask {
                        column: column.id.clone(),
                        task: task_id.clone(),
                    });
                }
                if !placed.insert(task_id.clone()) {
                    return Err(BoardError::DuplicatePlacement(task_id.clone()));
                }
            }
            order.push(column.id.clone());
            column_map.insert(column.id.clone(), column);
        }

        let intake = intake.ok_or(BoardError::MissingIntake)?;

        if let Some(orphan) = task_map.keys().find(|id| !placed.contains(*id)) {
            return Err(BoardError::UnplacedTask(orphan.clone()));
        }

        Ok(Self {
            tasks: task_map,
            columns: column_map,
            order,
            intake,
            default_deadline_days: DEFAULT_DEADLINE_DAYS,
        })
    }

    /// Overrides how many days ahead a default deadline lands.
    #[must_use]
    pub const fn with_default_deadline_days(mut self, days: u64) -> Self {
        self.default_deadline_days = days;
        self
    }

    /// Moves a task to `dest_index` in `dest`, taking it from
    /// `source_index` in `source`.
    ///
    /// Within one column this is a remove-then-insert reorder. Across
    /// columns the task is relocated in one step, so it is never in zero
    /// or two columns. `dest_index` past the end appends.
    ///
    /// Returns `false` (board untouched) when the drop position equals the
    /// drag position, when either column is unknown, or when
    /// `source_index` does not hold `task_id`.
    pub fn move_task(
        &mut self,
        task_id: &TaskId,
        source: &ColumnId,
        source_index: usize,
        dest: &ColumnId,
        dest_index: usize,
    ) -> bool {
        if source == dest && source_index == dest_index {
            return false;
        }
        let holds_task = self
            .columns
            .get(source)
            .and_then(|c| c.task_ids.get(source_index))
            .is_some_and(|id| id == task_id);
        if !holds_task || !self.columns.contains_key(dest) {
            tracing::debug!(task = %task_id, column = %source, index = source_index, "stale move ignored");
            return false;
        }

        if source == dest {
            let Some(column) = self.columns.get_mut(source) else {
                return false;
            };
            let last = column.task_ids.len() - 1;
            let target = dest_index.min(last);
            if target == source_index {
                return false;
            }
            let id = column.task_ids.remove(source_index);
            column.task_ids.insert(target, id);
        } else {
            let Some(id) = self
                .columns
                .get_mut(source)
                .map(|c| c.task_ids.remove(source_index))
            else {
                return false;
            };
            if let Some(column) = self.columns.get_mut(dest) {
                let target = dest_index.min(column.task_ids.len());
                column.task_ids.insert(target, id);
            }
        }

        tracing::debug!(task = %task_id, from = %source, to = %dest, index = dest_index, "task moved");
        true
    }

    /// Adds a task to the intake column, using the local date for the
    /// default deadline. See [`Board::add_task_on`].
    pub fn add_task(&mut self, fields: NewTask) -> Option<TaskId> {
        self.add_task_on(fields, chrono::Local::now().date_naive())
    }

    /// Adds a task to the end of the intake column.
    ///
    /// Returns `None` (board untouched) if the title is blank. Otherwise
    /// the task gets a fresh id, zero progress and comments, the
    /// "Unassigned" assignee unless one is given, and a deadline of
    /// `today` plus the default deadline span unless one is given.
    pub fn add_task_on(&mut self, fields: NewTask, today: NaiveDate) -> Option<TaskId> {
        let title = fields.title.trim();
        if title.is_empty() {
            return None;
        }

        let mut id = TaskId::generate();
        while self.tasks.contains_key(&id) {
            id = TaskId::generate();
        }

        let deadline = fields.deadline.unwrap_or_else(|| {
            today
                .checked_add_days(Days::new(self.default_deadline_days))
                .unwrap_or(today)
        });

        let task = Task {
            id: id.clone(),
            title: title.to_string(),
            description: fields.description,
            deadline,
            priority: fields.priority,
            assignee: fields.assignee.unwrap_or_default(),
            comments: 0,
            progress: Progress::ZERO,
        };

        let column = self.columns.get_mut(&self.intake)?;
        column.task_ids.push(id.clone());
        self.tasks.insert(id.clone(), task);

        tracing::debug!(task = %id, column = %self.intake, "task added");
        Some(id)
    }

    /// Removes a task from its column and from the task records.
    ///
    /// Unknown ids are ignored. Returns the removed task.
    pub fn delete_task(&mut self, task_id: &TaskId) -> Option<Task> {
        let column = self
            .columns
            .values_mut()
            .find(|c| c.task_ids.contains(task_id))?;
        column.task_ids.retain(|id| id != task_id);
        let removed = self.tasks.remove(task_id);
        tracing::debug!(task = %task_id, "task deleted");
        removed
    }

    /// Sets a task's progress, clamped to `0..=100`.
    ///
    /// Returns `true` if the stored value changed. Unknown ids are ignored.
    pub fn update_progress(&mut self, task_id: &TaskId, progress: i64) -> bool {
        let Some(task) = self.tasks.get_mut(task_id) else {
            return false;
        };
        let progress = Progress::clamped(progress);
        if task.progress == progress {
            return false;
        }
        task.progress = progress;
        tracing::debug!(task = %task_id, %progress, "progress updated");
        true
    }

    /// Looks up a task.
    #[must_use]
    pub fn task(&self, task_id: &TaskId) -> Option<&Task> {
        self.tasks.get(task_id)
    }

    /// All task records, keyed by id.
    #[must_use]
    pub const fn tasks(&self) -> &HashMap<TaskId, Task> {
        &self.tasks
    }

    /// Number of tasks on the board.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Looks up a column.
    #[must_use]
    pub fn column(&self, column_id: &ColumnId) -> Option<&Column> {
        self.columns.get(column_id)
    }

    /// Column ids in display order.
    #[must_use]
    pub fn column_order(&self) -> &[ColumnId] {
        &self.order
    }

    /// The column new tasks are added to.
    #[must_use]
    pub const fn intake(&self) -> &ColumnId {
        &self.intake
    }

    /// The column holding a task and the task's index within it.
    #[must_use]
    pub fn column_of(&self, task_id: &TaskId) -> Option<(&ColumnId, usize)> {
        self.order.iter().find_map(|column_id| {
            let column = self.columns.get(column_id)?;
            column.position(task_id).map(|index| (column_id, index))
        })
    }
}
