/// Start / pause / stop transitions.
use chrono::{DateTime, Local};
use log::{debug, info};

use super::Ledger;
use crate::db::Change;
use crate::error::{LedgerError, Result};
use crate::types::{Session, Task, TaskId, TaskStatus};

impl Ledger {
    /// Opens a new session on the task, pausing whatever else the same user
    /// had running first.
    pub fn start_timer(&mut self, task_id: TaskId) -> Result<()> {
        let index = self.task_index(task_id)?;
        let target = &self.tasks[index];
        if target.is_completed() {
            return Err(LedgerError::invalid(format!(
                "task '{}' is completed, recover it before starting the timer",
                target.name
            )));
        }
        if target.open_session().is_some() {
            debug!("task {task_id} is already running");
            return Ok(());
        }

        let now = self.clock.now();
        let user = target.user;
        let mut changes = Vec::new();
        let mut staged = Vec::new();
        for other in self
            .tasks
            .iter()
            .filter(|t| t.id != task_id && t.user == user && t.is_running)
        {
            let mut paused = other.clone();
            pause_changes(&mut paused, now, &mut changes);
            staged.push(paused);
        }

        let mut started = self.tasks[index].clone();
        let session = Session::open(started.id, started.next_seq(), now);
        started.sessions.push(session.clone());
        started.reconcile();
        changes.push(Change::SaveSession(session));
        changes.push(Change::UpdateTask(started.clone()));

        self.persist(changes)?;
        for paused in &staged {
            info!("paused '{}' for user {} to start another task", paused.name, user);
        }
        info!("started '{}' for user {user}", started.name);
        staged.push(started);
        self.replace_tasks(staged);
        Ok(())
    }

    /// Closes the open session. A task that isn't running is left alone.
    pub fn pause_timer(&mut self, task_id: TaskId) -> Result<()> {
        let index = self.task_index(task_id)?;
        if !self.tasks[index].is_running && self.tasks[index].open_session().is_none() {
            debug!("task {task_id} is not running, nothing to pause");
            return Ok(());
        }

        let now = self.clock.now();
        let mut task = self.tasks[index].clone();
        let mut changes = Vec::new();
        pause_changes(&mut task, now, &mut changes);

        self.persist(changes)?;
        info!(
            "paused '{}', {}s accumulated",
            task.name, task.accumulated_time
        );
        self.tasks[index] = task;
        Ok(())
    }

    /// Pauses if needed, then marks the task completed.
    pub fn stop_task(&mut self, task_id: TaskId) -> Result<()> {
        let index = self.task_index(task_id)?;
        let current = &self.tasks[index];
        if current.is_completed() && !current.is_running {
            debug!("task {task_id} is already completed");
            return Ok(());
        }

        let now = self.clock.now();
        let mut task = current.clone();
        let mut changes = Vec::new();
        if let Some(closed) = pause_transition(&mut task, now) {
            changes.push(Change::UpdateSession(closed));
        }
        task.status = TaskStatus::Completed;
        task.completed_at = Some(now);
        changes.push(Change::UpdateTask(task.clone()));

        self.persist(changes)?;
        info!(
            "completed '{}' with {}s tracked",
            task.name, task.accumulated_time
        );
        self.tasks[index] = task;
        Ok(())
    }
}

/// The pause transition: closes the open session at `now` and re-derives the
/// task totals. Returns the session it closed.
fn pause_transition(task: &mut Task, now: DateTime<Local>) -> Option<Session> {
    let closed = match task.sessions.last_mut() {
        Some(session) if session.is_open() => {
            session.close(now);
            Some(session.clone())
        }
        _ => None,
    };
    task.reconcile();
    closed
}

fn pause_changes(task: &mut Task, now: DateTime<Local>, changes: &mut Vec<Change>) {
    if let Some(closed) = pause_transition(task, now) {
        changes.push(Change::UpdateSession(closed));
    }
    changes.push(Change::UpdateTask(task.clone()));
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use crate::clock::Clock;
    use crate::error::LedgerError;
    use crate::ledger::testing::harness;
    use crate::types::{TaskStatus, User};

    #[test]
    fn start_then_pause_accumulates_elapsed_seconds() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);

        h.ledger.start_timer(id).unwrap();
        h.clock.advance_secs(95);
        h.ledger.pause_timer(id).unwrap();

        let task = h.get(id);
        assert!(!task.is_running);
        assert_eq!(task.accumulated_time, 95);
        assert_eq!(task.sessions.len(), 1);
        assert_eq!(task.sessions[0].duration, 95);
        assert!(!task.sessions[0].is_open());
        h.assert_consistent();
    }

    #[test]
    fn second_round_adds_to_previous_total() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);
        for secs in [40, 20] {
            h.ledger.start_timer(id).unwrap();
            h.clock.advance_secs(secs);
            h.ledger.pause_timer(id).unwrap();
            h.clock.advance_secs(600);
        }
        assert_eq!(h.get(id).accumulated_time, 60);
        assert_eq!(h.get(id).sessions.len(), 2);
    }

    #[test]
    fn pause_rounds_to_nearest_second() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);
        h.ledger.start_timer(id).unwrap();
        h.clock.advance(Duration::milliseconds(2_600));
        h.ledger.pause_timer(id).unwrap();
        assert_eq!(h.get(id).accumulated_time, 3);
    }

    #[test]
    fn starting_second_task_pauses_first_for_same_user() {
        let mut h = harness();
        let project = h.project("Website");
        let first = h.task(project, "nav bar", User::A);
        let second = h.task(project, "footer", User::A);

        h.ledger.start_timer(first).unwrap();
        h.clock.advance_secs(120);
        h.ledger.start_timer(second).unwrap();

        let paused = h.get(first);
        assert!(!paused.is_running);
        assert_eq!(paused.accumulated_time, 120);
        let closed_at = paused.sessions[0].end.unwrap();

        let running = h.get(second);
        assert!(running.is_running);
        assert_eq!(running.sessions.len(), 1);
        assert!(running.sessions[0].is_open());
        assert_eq!(running.sessions[0].start, closed_at);
        h.assert_consistent();
    }

    #[test]
    fn other_users_timer_keeps_running() {
        let mut h = harness();
        let project = h.project("Website");
        let mine = h.task(project, "nav bar", User::A);
        let theirs = h.task(project, "footer", User::B);

        h.ledger.start_timer(mine).unwrap();
        h.clock.advance_secs(10);
        h.ledger.start_timer(theirs).unwrap();

        assert!(h.get(mine).is_running);
        assert!(h.get(theirs).is_running);
        assert_eq!(h.ledger.running_task(User::A).map(|t| t.id), Some(mine));
        assert_eq!(h.ledger.running_task(User::B).map(|t| t.id), Some(theirs));
        h.assert_consistent();
    }

    #[test]
    fn starting_running_task_is_a_noop() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);
        h.ledger.start_timer(id).unwrap();
        h.clock.advance_secs(5);
        h.ledger.start_timer(id).unwrap();

        let task = h.get(id);
        assert_eq!(task.sessions.len(), 1);
        assert!(task.sessions[0].is_open());
        assert_eq!(h.store.records().sessions.len(), 1);
    }

    #[test]
    fn pause_on_paused_task_changes_nothing() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);
        h.ledger.start_timer(id).unwrap();
        h.clock.advance_secs(30);
        h.ledger.pause_timer(id).unwrap();
        let before = h.get(id).clone();

        h.clock.advance_secs(30);
        h.ledger.pause_timer(id).unwrap();

        assert_eq!(h.get(id), &before);
    }

    #[test]
    fn pause_unknown_task_is_not_found() {
        let mut h = harness();
        let result = h.ledger.pause_timer(uuid::Uuid::new_v4());
        assert!(matches!(result, Err(LedgerError::NotFound { kind: "task", .. })));
    }

    #[test]
    fn stop_running_task_closes_session_and_completes() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);
        h.ledger.start_timer(id).unwrap();
        h.clock.advance_secs(300);
        let stop_at = h.clock.now();
        h.ledger.stop_task(id).unwrap();

        let task = h.get(id);
        assert!(!task.is_running);
        assert_eq!(task.accumulated_time, 300);
        assert_eq!(task.sessions[0].end, Some(stop_at));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.completed_at, Some(stop_at));
        h.assert_consistent();
    }

    #[test]
    fn stop_paused_task_only_sets_completion() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);
        h.ledger.start_timer(id).unwrap();
        h.clock.advance_secs(50);
        h.ledger.pause_timer(id).unwrap();
        let sessions = h.get(id).sessions.clone();

        h.clock.advance_secs(50);
        h.ledger.stop_task(id).unwrap();

        let task = h.get(id);
        assert_eq!(task.sessions, sessions);
        assert_eq!(task.accumulated_time, 50);
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[test]
    fn completed_task_cannot_start_until_recovered() {
        let mut h = harness();
        let project = h.project("Website");
        let id = h.task(project, "nav bar", User::A);
        h.ledger.stop_task(id).unwrap();

        assert!(matches!(
            h.ledger.start_timer(id),
            Err(LedgerError::ValidationFailed(_))
        ));
        assert!(h.get(id).sessions.is_empty());

        h.ledger.recover_task(id).unwrap();
        h.ledger.start_timer(id).unwrap();
        assert!(h.get(id).is_running);
        h.assert_consistent();
    }
}
