//! Line-oriented client state: the board plus command handling.
//!
//! [`App`] is synchronous. It mutates the board directly and returns
//! [`AppAction`]s for everything that involves the chat session, which
//! the binary carries out.

use chrono::NaiveDate;

use boardroom_proto::task::{
    Assignee, ColumnId, ParsePriorityError, Priority, Task, TaskId, TaskSummary,
};

use crate::board::{Board, NewTask};
use crate::chat::ChatMessage;
use crate::transport::UserId;

const HELP: &str = "\
commands:
  /board                          show columns
  /timeline                       tasks by deadline
  /add <title> [| description]    new task in the intake column
       options in the title: !<priority> @<assignee> due:<yyyy-mm-dd>
  /move <task> <column> [index]   move a task
  /progress <task> <0-100>        set progress
  /delete <task>                  remove a task
  /find <term>                    search titles and descriptions
  /user <id>                      switch identity
  /reconnect                      reconnect with a fresh retry budget
  /quit                           exit
anything else is sent to the assistant";

/// Side effects requested by [`App::handle_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    /// Show text to the user.
    Print(String),
    /// Send a chat message.
    Send(String),
    /// Append a locally generated message to the chat log.
    Notify(ChatMessage),
    /// Switch the chat identity.
    SwitchUser(UserId),
    /// Manual reconnect.
    Reconnect,
    /// Exit.
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("no task matches '{0}'")]
    UnknownTask(String),
    #[error("'{0}' matches more than one task")]
    AmbiguousTask(String),
    #[error("no column named '{0}'")]
    UnknownColumn(String),
    #[error(transparent)]
    Priority(#[from] ParsePriorityError),
    #[error("bad deadline '{0}' (expected yyyy-mm-dd)")]
    Deadline(String),
    #[error("unknown command /{0} (try /help)")]
    UnknownCommand(String),
}

/// Client state.
pub struct App {
    board: Board,
}

impl App {
    /// Wrap a board.
    #[must_use]
    pub const fn new(board: Board) -> Self {
        Self { board }
    }

    /// The board.
    #[must_use]
    pub const fn board(&self) -> &Board {
        &self.board
    }

    /// Handle one input line. `today` dates tasks added without a deadline.
    pub fn handle_line(&mut self, line: &str, today: NaiveDate) -> Vec<AppAction> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }
        let Some(command) = line.strip_prefix('/') else {
            return vec![AppAction::Send(line.to_string())];
        };
        let (name, args) = command
            .split_once(char::is_whitespace)
            .map_or((command, ""), |(name, args)| (name, args.trim()));

        self.run_command(name, args, today)
            .unwrap_or_else(|e| vec![AppAction::Print(e.to_string())])
    }

    fn run_command(
        &mut self,
        name: &str,
        args: &str,
        today: NaiveDate,
    ) -> Result<Vec<AppAction>, CommandError> {
        let actions = match name {
            "board" => vec![AppAction::Print(self.render_board())],
            "timeline" => vec![AppAction::Print(self.render_timeline())],
            "add" => self.add(args, today)?,
            "move" => vec![AppAction::Print(self.move_command(args)?)],
            "progress" => vec![AppAction::Print(self.progress(args)?)],
            "delete" => {
                let id = self.resolve_task(args)?;
                let message = self.board.delete_task(&id).map_or_else(
                    || format!("{id} is already gone"),
                    |task| format!("Deleted {id} ({})", task.title),
                );
                vec![AppAction::Print(message)]
            }
            "find" => vec![AppAction::Print(self.find(args))],
            "user" => {
                if args.is_empty() {
                    return Err(CommandError::Usage("/user <id>"));
                }
                vec![AppAction::SwitchUser(UserId::new(args))]
            }
            "reconnect" => vec![AppAction::Reconnect],
            "quit" | "exit" => vec![AppAction::Quit],
            "help" => vec![AppAction::Print(HELP.to_string())],
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };
        Ok(actions)
    }

    fn add(&mut self, args: &str, today: NaiveDate) -> Result<Vec<AppAction>, CommandError> {
        let (head, description) = args
            .split_once('|')
            .map_or((args, ""), |(head, description)| (head, description.trim()));
        let fields = NewTask {
            description: description.to_string(),
            ..parse_new_task(head)?
        };
        let id = self
            .board
            .add_task_on(fields, today)
            .ok_or(CommandError::Usage("/add <title> [| description]"))?;

        let title = self.board.task(&id).map_or("", |task| task.title.as_str());
        let column = self
            .board
            .column(self.board.intake())
            .map_or("the board", |column| column.title());
        Ok(vec![
            AppAction::Print(format!("Added {id}")),
            AppAction::Notify(ChatMessage::assistant(format!(
                "I've added \"{title}\" to {column}."
            ))),
        ])
    }

    fn move_command(&mut self, args: &str) -> Result<String, CommandError> {
        const USAGE: &str = "/move <task> <column> [index]";
        let mut parts = args.split_whitespace();
        let (Some(task), Some(column)) = (parts.next(), parts.next()) else {
            return Err(CommandError::Usage(USAGE));
        };
        let index = parts
            .next()
            .map(str::parse::<usize>)
            .transpose()
            .map_err(|_| CommandError::Usage(USAGE))?;

        let task_id = self.resolve_task(task)?;
        let destination = self.resolve_column(column)?;
        let Some((source, source_index)) = self
            .board
            .column_of(&task_id)
            .map(|(column, index)| (column.clone(), index))
        else {
            return Err(CommandError::UnknownTask(task.to_string()));
        };

        let index = index.unwrap_or_else(|| {
            let len = self
                .board
                .column(&destination)
                .map_or(0, |column| column.task_ids().len());
            if source == destination {
                len.saturating_sub(1)
            } else {
                len
            }
        });

        let title = self
            .board
            .column(&destination)
            .map_or(destination.as_str(), |column| column.title())
            .to_string();
        if self
            .board
            .move_task(&task_id, &source, source_index, &destination, index)
        {
            Ok(format!("Moved {task_id} to {title}"))
        } else {
            Ok(format!("{task_id} is already there"))
        }
    }

    fn progress(&mut self, args: &str) -> Result<String, CommandError> {
        const USAGE: &str = "/progress <task> <0-100>";
        let (task, value) = args
            .split_once(char::is_whitespace)
            .ok_or(CommandError::Usage(USAGE))?;
        let value: i64 = value.trim().parse().map_err(|_| CommandError::Usage(USAGE))?;
        let task_id = self.resolve_task(task)?;

        self.board.update_progress(&task_id, value);
        let progress = self
            .board
            .task(&task_id)
            .map_or(0, |task| task.progress.get());
        Ok(format!("{task_id} is {progress}% done"))
    }

    fn find(&self, term: &str) -> String {
        let mut matches: Vec<&Task> = self.board.filter(term).into_values().collect();
        if matches.is_empty() {
            return format!("nothing matches '{term}'");
        }
        matches.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        matches
            .into_iter()
            .map(|task| format!("  {:<10} {}", task.id.as_str(), TaskSummary::from(task)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Exact id, or a unique id prefix.
    fn resolve_task(&self, query: &str) -> Result<TaskId, CommandError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CommandError::Usage("<task> is a task id or id prefix"));
        }
        let exact = TaskId::new(query);
        if self.board.task(&exact).is_some() {
            return Ok(exact);
        }
        let mut candidates = self
            .board
            .tasks()
            .keys()
            .filter(|id| id.as_str().starts_with(query));
        match (candidates.next(), candidates.next()) {
            (Some(id), None) => Ok(id.clone()),
            (Some(_), Some(_)) => Err(CommandError::AmbiguousTask(query.to_string())),
            (None, _) => Err(CommandError::UnknownTask(query.to_string())),
        }
    }

    /// Column id or title, case-insensitive.
    fn resolve_column(&self, query: &str) -> Result<ColumnId, CommandError> {
        self.board
            .column_order()
            .iter()
            .filter_map(|id| self.board.column(id))
            .find(|column| {
                column.id().as_str().eq_ignore_ascii_case(query)
                    || column.title().eq_ignore_ascii_case(query)
            })
            .map(|column| column.id().clone())
            .ok_or_else(|| CommandError::UnknownColumn(query.to_string()))
    }

    fn render_board(&self) -> String {
        let mut out = format!("Board ({}% done)", self.board.overall_progress().get());
        for view in self.board.columns() {
            out.push_str(&format!(
                "\n{} [{}] {}%",
                view.column.title(),
                view.column.id(),
                view.progress.get()
            ));
            if view.tasks.is_empty() {
                out.push_str("\n  (empty)");
            }
            for task in view.tasks {
                out.push_str(&format!("\n  {:<10} {}", task.id.as_str(), TaskSummary::from(task)));
                if !task.assignee.is_unassigned() {
                    out.push_str(&format!(" @{}", task.assignee.name));
                }
            }
        }
        out
    }

    fn render_timeline(&self) -> String {
        let timeline = self.board.timeline();
        if timeline.is_empty() {
            return "no tasks".to_string();
        }
        timeline
            .into_iter()
            .map(|task| {
                format!(
                    "{}  {:<10} {} [{}] {}%",
                    task.deadline,
                    task.id.as_str(),
                    task.title,
                    task.priority,
                    task.progress.get()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Splits `/add` options out of the title words.
fn parse_new_task(head: &str) -> Result<NewTask, CommandError> {
    let mut fields = NewTask::default();
    let mut title = Vec::new();
    for word in head.split_whitespace() {
        if let Some(priority) = word.strip_prefix('!') {
            fields.priority = priority.parse::<Priority>()?;
        } else if let Some(name) = word.strip_prefix('@').filter(|name| !name.is_empty()) {
            fields.assignee = Some(Assignee::named(name));
        } else if let Some(date) = word.strip_prefix("due:") {
            let deadline = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|_| CommandError::Deadline(date.to_string()))?;
            fields.deadline = Some(deadline);
        } else {
            title.push(word);
        }
    }
    fields.title = title.join(" ");
    Ok(fields)
}
