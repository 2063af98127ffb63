//! The timer/session ledger: owns every project and task in memory and is the
//! only write path to them.
//!
//! Each operation validates first, stages its effect on clones, commits the
//! resulting [`Change`]s through the gateway and only then swaps the staged
//! entities in. A gateway failure therefore leaves memory untouched.
mod sessions;
mod summary;
mod timer;

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::PersistenceConfig;
use crate::db::{Change, Gateway};
use crate::error::{LedgerError, Result};
use crate::types::{
    NewProject, NewTask, Project, ProjectId, ProjectPatch, Records, Session, Task, TaskId,
    TaskPatch, TaskStatus, User,
};

pub use summary::ProjectSummary;

/// Read-only view handed to the presentation layer.
#[derive(Clone, Copy, Debug)]
pub struct Snapshot<'a> {
    pub projects: &'a [Project],
    pub tasks: &'a [Task],
}

pub struct Ledger {
    projects: Vec<Project>,
    tasks: Vec<Task>,
    gateway: Box<dyn Gateway>,
    clock: Box<dyn Clock>,
    retry: PersistenceConfig,
}

impl Ledger {
    /// Loads everything from the gateway and nests sessions under their tasks.
    pub fn load(
        mut gateway: Box<dyn Gateway>,
        clock: Box<dyn Clock>,
        retry: PersistenceConfig,
    ) -> Result<Self> {
        let records = gateway.load_all()?;
        let (projects, tasks, repairs) = assemble(records);
        let mut ledger = Self {
            projects: Vec::new(),
            tasks: Vec::new(),
            gateway,
            clock,
            retry,
        };
        if !repairs.is_empty() {
            warn!("persisting {} repaired session records", repairs.len());
            ledger.persist(repairs)?;
        }
        ledger.projects = projects;
        ledger.tasks = tasks;
        for problem in ledger.check_invariants() {
            warn!("loaded state violates an invariant: {problem}");
        }
        info!(
            "loaded {} projects and {} tasks",
            ledger.projects.len(),
            ledger.tasks.len()
        );
        Ok(ledger)
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            projects: &self.projects,
            tasks: &self.tasks,
        }
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn project(&self, id: ProjectId) -> Option<&Project> {
        self.projects.iter().find(|project| project.id == id)
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn add_project(&mut self, new: NewProject) -> Result<ProjectId> {
        let name = required_name(&new.name, "project")?;
        validate_budget(new.budget_hours)?;
        let id = new.id.unwrap_or_else(Uuid::new_v4);
        if self.project(id).is_some() {
            return Err(LedgerError::invalid(format!("project id {id} already exists")));
        }

        let project = Project {
            id,
            name,
            client: new.client.filter(|client| !client.trim().is_empty()),
            deadline: new.deadline,
            budget_hours: new.budget_hours,
            status: new.status.unwrap_or_default(),
            created_at: self.clock.now(),
        };
        self.persist(vec![Change::SaveProject(project.clone())])?;
        info!("added project '{}' ({})", project.name, project.id);
        self.projects.push(project);
        Ok(id)
    }

    pub fn update_project(&mut self, id: ProjectId, patch: ProjectPatch) -> Result<()> {
        let index = self.project_index(id)?;
        let mut project = self.projects[index].clone();
        if let Some(name) = patch.name {
            project.name = required_name(&name, "project")?;
        }
        if let Some(client) = patch.client {
            project.client = client.filter(|client| !client.trim().is_empty());
        }
        if let Some(deadline) = patch.deadline {
            project.deadline = deadline;
        }
        if let Some(budget_hours) = patch.budget_hours {
            validate_budget(budget_hours)?;
            project.budget_hours = budget_hours;
        }
        if let Some(status) = patch.status {
            project.status = status;
        }

        self.persist(vec![Change::UpdateProject(project.clone())])?;
        debug!("updated project {id}");
        self.projects[index] = project;
        Ok(())
    }

    /// Removes the project together with its tasks and their sessions.
    pub fn delete_project(&mut self, id: ProjectId) -> Result<()> {
        let index = self.project_index(id)?;
        let mut changes: Vec<Change> = self
            .tasks
            .iter()
            .filter(|task| task.project_id == id)
            .map(|task| Change::DeleteTask(task.id))
            .collect();
        let cascaded = changes.len();
        changes.push(Change::DeleteProject(id));

        self.persist(changes)?;
        let project = self.projects.remove(index);
        self.tasks.retain(|task| task.project_id != id);
        info!(
            "deleted project '{}' and {cascaded} of its tasks",
            project.name
        );
        Ok(())
    }

    pub fn add_task(&mut self, new: NewTask) -> Result<TaskId> {
        let name = required_name(&new.name, "task")?;
        if self.project(new.project_id).is_none() {
            return Err(LedgerError::not_found("project", new.project_id));
        }

        let task = Task {
            id: Uuid::new_v4(),
            name,
            project_id: new.project_id,
            user: new.user,
            accumulated_time: 0,
            status: TaskStatus::Active,
            is_running: false,
            created_at: self.clock.now(),
            completed_at: None,
            sessions: Vec::new(),
        };
        self.persist(vec![Change::SaveTask(task.clone())])?;
        info!("added task '{}' for user {} ({})", task.name, task.user, task.id);
        let id = task.id;
        self.tasks.push(task);
        Ok(id)
    }

    /// Merges descriptive fields. Timer and completion state are only changed
    /// through the timer and session operations.
    pub fn update_task(&mut self, id: TaskId, patch: TaskPatch) -> Result<()> {
        let index = self.task_index(id)?;
        let mut task = self.tasks[index].clone();
        if let Some(name) = patch.name {
            task.name = required_name(&name, "task")?;
        }
        if let Some(project_id) = patch.project_id {
            if self.project(project_id).is_none() {
                return Err(LedgerError::not_found("project", project_id));
            }
            task.project_id = project_id;
        }
        if let Some(user) = patch.user {
            if task.is_running && user != task.user {
                return Err(LedgerError::invalid(
                    "pause the timer before handing the task to the other user",
                ));
            }
            task.user = user;
        }

        self.persist(vec![Change::UpdateTask(task.clone())])?;
        debug!("updated task {id}");
        self.tasks[index] = task;
        Ok(())
    }

    pub fn delete_task(&mut self, id: TaskId) -> Result<()> {
        let index = self.task_index(id)?;
        self.persist(vec![Change::DeleteTask(id)])?;
        let task = self.tasks.remove(index);
        info!("deleted task '{}' ({})", task.name, task.id);
        Ok(())
    }

    /// Moves a completed task back to active.
    pub fn recover_task(&mut self, id: TaskId) -> Result<()> {
        let index = self.task_index(id)?;
        let current = &self.tasks[index];
        if current.status == TaskStatus::Active && current.completed_at.is_none() {
            debug!("task {id} is already active");
            return Ok(());
        }

        let mut task = current.clone();
        task.status = TaskStatus::Active;
        task.completed_at = None;
        self.persist(vec![Change::UpdateTask(task.clone())])?;
        info!("recovered task '{}'", task.name);
        self.tasks[index] = task;
        Ok(())
    }

    /// Describes every invariant violation in the current state.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let mut running_per_user: HashMap<User, usize> = HashMap::new();
        for task in &self.tasks {
            let open = task.sessions.iter().filter(|s| s.is_open()).count();
            if open > 1 {
                problems.push(format!("task {} has {open} open sessions", task.id));
            }
            if open == 1 && task.open_session().is_none() {
                problems.push(format!("task {} has an open session that is not last", task.id));
            }
            if task.is_running != task.open_session().is_some() {
                problems.push(format!("task {} running flag disagrees with sessions", task.id));
            }
            let closed: u64 = task
                .sessions
                .iter()
                .filter(|s| !s.is_open())
                .map(|s| s.duration)
                .sum();
            if closed != task.accumulated_time {
                problems.push(format!(
                    "task {} accumulated {} but sessions sum to {closed}",
                    task.id, task.accumulated_time
                ));
            }
            if task.is_completed() && task.is_running {
                problems.push(format!("task {} is completed but running", task.id));
            }
            if task.is_running {
                *running_per_user.entry(task.user).or_default() += 1;
            }
        }
        for (user, count) in running_per_user {
            if count > 1 {
                problems.push(format!("user {user} has {count} running tasks"));
            }
        }
        problems
    }

    fn project_index(&self, id: ProjectId) -> Result<usize> {
        self.projects
            .iter()
            .position(|project| project.id == id)
            .ok_or_else(|| LedgerError::not_found("project", id))
    }

    fn task_index(&self, id: TaskId) -> Result<usize> {
        self.tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| LedgerError::not_found("task", id))
    }

    /// Swaps staged task copies into the live set.
    fn replace_tasks(&mut self, staged: Vec<Task>) {
        for task in staged {
            if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
                *slot = task;
            }
        }
    }

    /// Commits one operation's writes. Transient failures are retried a
    /// bounded number of times, anything else fails at once.
    fn persist(&mut self, changes: Vec<Change>) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.gateway.commit(&changes) {
                Ok(()) => return Ok(()),
                Err(err) if attempt < attempts && err.is_transient() => {
                    warn!("commit attempt {attempt}/{attempts} failed: {err}");
                    thread::sleep(Duration::from_millis(self.retry.backoff_ms));
                    attempt += 1;
                }
                Err(err) => {
                    error!("commit failed after {attempt} attempt(s), change discarded: {err}");
                    return Err(err.into());
                }
            }
        }
    }
}

/// Nests the flat records and repairs session sequences that break the
/// single-open-session rule. Returns the writes needed to store the repairs.
fn assemble(records: Records) -> (Vec<Project>, Vec<Task>, Vec<Change>) {
    let mut by_task: HashMap<TaskId, Vec<Session>> = HashMap::new();
    for session in records.sessions {
        by_task.entry(session.task_id).or_default().push(session);
    }

    let mut repairs = Vec::new();
    let mut tasks = records.tasks;
    for task in &mut tasks {
        let mut sessions = by_task.remove(&task.id).unwrap_or_default();
        sessions.sort_by_key(|session| session.seq);
        repairs.extend(move_running_session_last(&mut sessions));
        repairs.extend(close_stale_open_sessions(&mut sessions));
        task.sessions = sessions;
        let stored = (task.accumulated_time, task.is_running);
        task.reconcile();
        if stored != (task.accumulated_time, task.is_running) {
            warn!("task {} had stale totals, recomputed from sessions", task.id);
            repairs.push(Change::UpdateTask(task.clone()));
        }
    }
    for (task_id, orphans) in by_task {
        warn!("ignoring {} sessions of unknown task {task_id}", orphans.len());
    }
    (records.projects, tasks, repairs)
}

/// The open session with the highest seq is the running one. If closed
/// sessions follow it, it moves to the end and takes a fresh seq so the
/// stored order matches.
fn move_running_session_last(sessions: &mut Vec<Session>) -> Option<Change> {
    let current = sessions.iter().rposition(|session| session.is_open())?;
    if current + 1 == sessions.len() {
        return None;
    }
    let mut running = sessions.remove(current);
    running.seq = sessions
        .iter()
        .map(|session| session.seq + 1)
        .max()
        .unwrap_or(0);
    warn!("moved running session {} behind later sessions", running.id);
    sessions.push(running.clone());
    Some(Change::UpdateSession(running))
}

/// Every open session before the last one is closed at the earliest later
/// start among the sessions after it, or dropped when none started later.
fn close_stale_open_sessions(sessions: &mut Vec<Session>) -> Vec<Change> {
    let mut changes = Vec::new();
    let mut index = 0;
    while index + 1 < sessions.len() {
        if sessions[index].is_open() {
            let start = sessions[index].start;
            let next_start = sessions[index + 1..]
                .iter()
                .map(|session| session.start)
                .filter(|next| *next > start)
                .min();
            if let Some(next_start) = next_start {
                sessions[index].close(next_start);
                warn!("closed stale open session {}", sessions[index].id);
                changes.push(Change::UpdateSession(sessions[index].clone()));
            } else {
                let dropped = sessions.remove(index);
                warn!("dropped stale open session {}", dropped.id);
                changes.push(Change::DeleteSession(dropped.id));
                continue;
            }
        }
        index += 1;
    }
    changes
}

fn required_name(raw: &str, kind: &str) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid(format!("{kind} name must not be empty")));
    }
    Ok(name.to_string())
}

fn validate_budget(budget_hours: Option<f64>) -> Result<()> {
    match budget_hours {
        Some(hours) if !(hours.is_finite() && hours > 0.0) => Err(LedgerError::invalid(format!(
            "budget must be a positive number of hours, got {hours}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::clock::ManualClock;
    use crate::db::MemoryGateway;

    pub struct Harness {
        pub ledger: Ledger,
        pub clock: ManualClock,
        pub store: MemoryGateway,
    }

    pub fn harness() -> Harness {
        let clock = ManualClock::new(Local.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap());
        let store = MemoryGateway::new();
        let ledger = Ledger::load(
            Box::new(store.clone()),
            Box::new(clock.clone()),
            PersistenceConfig {
                attempts: 2,
                backoff_ms: 0,
            },
        )
        .unwrap();
        Harness {
            ledger,
            clock,
            store,
        }
    }

    impl Harness {
        pub fn project(&mut self, name: &str) -> ProjectId {
            self.ledger
                .add_project(NewProject {
                    name: name.to_string(),
                    ..NewProject::default()
                })
                .unwrap()
        }

        pub fn task(&mut self, project_id: ProjectId, name: &str, user: User) -> TaskId {
            self.ledger
                .add_task(NewTask {
                    name: name.to_string(),
                    project_id,
                    user,
                })
                .unwrap()
        }

        pub fn get(&self, id: TaskId) -> &Task {
            self.ledger.task(id).unwrap()
        }

        /// Asserts the invariants hold and that storage agrees with memory.
        pub fn assert_consistent(&self) {
            assert_eq!(self.ledger.check_invariants(), Vec::<String>::new());
            let reloaded = Ledger::load(
                Box::new(self.store.clone()),
                Box::new(self.clock.clone()),
                PersistenceConfig::default(),
            )
            .unwrap();
            assert_eq!(reloaded.projects(), self.ledger.projects());
            assert_eq!(reloaded.tasks(), self.ledger.tasks());
        }
    }
}
