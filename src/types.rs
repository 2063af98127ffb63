use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDate};
use uuid::Uuid;

pub type ProjectId = Uuid;
pub type TaskId = Uuid;
pub type SessionId = Uuid;

/// The two people sharing the tracker. Closed set on purpose: every timer
/// belongs to exactly one of them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum User {
    A,
    B,
}

impl User {
    pub const ALL: [User; 2] = [User::A, User::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            User::A => "a",
            User::B => "b",
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for User {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(User::A),
            "b" => Ok(User::B),
            other => Err(format!("unknown user '{other}', expected 'a' or 'b'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProjectStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "paused" => Ok(ProjectStatus::Paused),
            "completed" => Ok(ProjectStatus::Completed),
            other => Err(format!("unknown project status '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TaskStatus {
    #[default]
    Active,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Completed => "completed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(TaskStatus::Active),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Project {
    pub id: ProjectId,
    pub name: String,
    pub client: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub budget_hours: Option<f64>,
    pub status: ProjectStatus,
    pub created_at: DateTime<Local>,
}

/// Input for `Ledger::add_project`. A missing id is generated.
#[derive(Clone, Debug, Default)]
pub(crate) struct NewProject {
    pub id: Option<ProjectId>,
    pub name: String,
    pub client: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub budget_hours: Option<f64>,
    pub status: Option<ProjectStatus>,
}

/// Partial project update. The outer `Option` means "leave untouched",
/// an inner `None` clears the field.
#[derive(Clone, Debug, Default)]
pub(crate) struct ProjectPatch {
    pub name: Option<String>,
    pub client: Option<Option<String>>,
    pub deadline: Option<Option<NaiveDate>>,
    pub budget_hours: Option<Option<f64>>,
    pub status: Option<ProjectStatus>,
}

/// Work tracked by one user against one project.
///
/// `accumulated_time` only counts closed sessions and `is_running` mirrors
/// whether the last session is open. Both are derived from `sessions` by
/// [`Task::reconcile`] and never edited directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Task {
    pub id: TaskId,
    pub name: String,
    pub project_id: ProjectId,
    pub user: User,
    pub accumulated_time: u64,
    pub status: TaskStatus,
    pub is_running: bool,
    pub created_at: DateTime<Local>,
    pub completed_at: Option<DateTime<Local>>,
    pub sessions: Vec<Session>,
}

impl Task {
    pub fn open_session(&self) -> Option<&Session> {
        self.sessions.last().filter(|session| session.is_open())
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }

    /// Recomputes the derived fields from the session sequence.
    pub fn reconcile(&mut self) {
        self.accumulated_time = self
            .sessions
            .iter()
            .filter(|session| !session.is_open())
            .map(|session| session.duration)
            .sum();
        self.is_running = self.open_session().is_some();
    }

    /// Closed time plus the in-progress interval up to `now`. Display only.
    pub fn live_elapsed(&self, now: DateTime<Local>) -> u64 {
        let running = self
            .open_session()
            .map(|session| elapsed_seconds(session.start, now))
            .unwrap_or(0);
        self.accumulated_time + running
    }

    pub fn next_seq(&self) -> u32 {
        self.sessions
            .iter()
            .map(|session| session.seq + 1)
            .max()
            .unwrap_or(0)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct NewTask {
    pub name: String,
    pub project_id: ProjectId,
    pub user: User,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct TaskPatch {
    pub name: Option<String>,
    pub project_id: Option<ProjectId>,
    pub user: Option<User>,
}

/// One contiguous interval of work on a task. `end == None` while running.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Session {
    pub id: SessionId,
    pub task_id: TaskId,
    pub seq: u32,
    pub start: DateTime<Local>,
    pub end: Option<DateTime<Local>>,
    pub duration: u64,
}

impl Session {
    pub fn open(task_id: TaskId, seq: u32, start: DateTime<Local>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            seq,
            start,
            end: None,
            duration: 0,
        }
    }

    pub fn closed(task_id: TaskId, seq: u32, start: DateTime<Local>, end: DateTime<Local>) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            seq,
            start,
            end: Some(end),
            duration: elapsed_seconds(start, end),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn close(&mut self, end: DateTime<Local>) {
        self.end = Some(end);
        self.duration = elapsed_seconds(self.start, end);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct SessionEdit {
    pub start: Option<DateTime<Local>>,
    pub end: Option<DateTime<Local>>,
}

/// Flat collections as handed over by a persistence gateway.
#[derive(Clone, Debug, Default)]
pub(crate) struct Records {
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub sessions: Vec<Session>,
}

/// Whole seconds between two instants, rounded half up. Negative spans count as zero.
pub fn elapsed_seconds(start: DateTime<Local>, end: DateTime<Local>) -> u64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    ((millis + 500) / 1000) as u64
}
