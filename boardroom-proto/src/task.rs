//! Task data model shared by the board and the chat wire format.
//!
//! Tasks are plain values. The board container in the `boardroom` crate
//! owns the collection and its ordering; this module only guarantees the
//! per-field invariants (progress range, closed priority set).

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display name used when a task has no assignee.
pub const UNASSIGNED: &str = "Unassigned";

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Wraps an existing identifier (seed data, wire input).
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh time-ordered identifier (UUID v7).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a board column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(String);

impl ColumnId {
    /// Wraps an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task priority. Exactly three levels exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Can wait.
    Low,
    /// Normal work (default for new tasks).
    #[default]
    Medium,
    /// Needs attention first.
    High,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Error returned when parsing an unknown priority name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown priority: {0} (expected low, medium or high)")]
pub struct ParsePriorityError(String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" | "med" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ParsePriorityError(s.to_string())),
        }
    }
}

/// Completion progress, always within `0..=100`.
///
/// Out-of-range inputs are clamped, never rejected, so every value of this
/// type satisfies the range invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Progress(u8);

impl Progress {
    /// No work done.
    pub const ZERO: Self = Self(0);
    /// Finished.
    pub const COMPLETE: Self = Self(100);

    /// Builds a progress value, clamping to `0..=100`.
    #[must_use]
    pub fn clamped(value: i64) -> Self {
        // The clamp guarantees the value fits in a u8.
        Self(u8::try_from(value.clamp(0, 100)).unwrap_or(100))
    }

    /// Returns the percentage.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Whether the task is finished.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.0 == 100
    }
}

impl From<i64> for Progress {
    fn from(value: i64) -> Self {
        Self::clamped(value)
    }
}

impl From<Progress> for u8 {
    fn from(value: Progress) -> Self {
        value.0
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// The person a task is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignee {
    /// Display name.
    pub name: String,
    /// Optional avatar reference (URL or asset key).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl Assignee {
    /// Creates an assignee without an avatar.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            avatar: None,
        }
    }

    /// The "Unassigned" sentinel.
    #[must_use]
    pub fn unassigned() -> Self {
        Self::named(UNASSIGNED)
    }

    /// Whether this is the sentinel assignee.
    #[must_use]
    pub fn is_unassigned(&self) -> bool {
        self.name == UNASSIGNED
    }
}

impl Default for Assignee {
    fn default() -> Self {
        Self::unassigned()
    }
}

/// A unit of work on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier.
    pub id: TaskId,
    /// Short title, never blank.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Calendar due date.
    pub deadline: NaiveDate,
    /// Priority level.
    #[serde(default)]
    pub priority: Priority,
    /// Assigned person.
    #[serde(default)]
    pub assignee: Assignee,
    /// Number of comments on the task.
    #[serde(default)]
    pub comments: u32,
    /// Completion progress.
    #[serde(default)]
    pub progress: Progress,
}

/// Compact task description carried inside chat messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Task title.
    pub title: String,
    /// Task identifier, when the sender knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,
    /// Priority, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Progress, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    /// Deadline, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDate>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            id: Some(task.id.clone()),
            priority: Some(task.priority),
            progress: Some(task.progress),
            deadline: Some(task.deadline),
        }
    }
}

impl fmt::Display for TaskSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title)?;
        if let Some(priority) = self.priority {
            write!(f, " [{priority}]")?;
        }
        if let Some(progress) = self.progress {
            write!(f, " {progress}")?;
        }
        if let Some(deadline) = self.deadline {
            write!(f, " due {deadline}")?;
        }
        Ok(())
    }
}
