/// Manual session editing. Every change re-derives the task totals from the
/// session list instead of patching them incrementally.
use chrono::{DateTime, Local};
use log::info;

use super::Ledger;
use crate::db::Change;
use crate::error::{LedgerError, Result};
use crate::types::{Session, SessionEdit, TaskId};

impl Ledger {
    /// Overwrites start and/or end of the session at `index`.
    ///
    /// The running session may only be edited by giving it an end, which
    /// closes it and stops the timer.
    pub fn update_task_session(
        &mut self,
        task_id: TaskId,
        index: usize,
        edit: SessionEdit,
    ) -> Result<()> {
        let task_index = self.task_index(task_id)?;
        let mut task = self.tasks[task_index].clone();
        let Some(session) = task.sessions.get_mut(index) else {
            return Err(session_not_found(task_id, index));
        };
        if session.is_open() && edit.end.is_none() {
            return Err(LedgerError::invalid(
                "the running session can only be edited by giving it an end",
            ));
        }

        let start = edit.start.unwrap_or(session.start);
        let end = edit.end.or(session.end);
        if let Some(end) = end {
            ensure_range(start, end)?;
        }
        session.start = start;
        if let Some(end) = end {
            session.close(end);
        }
        let updated = session.clone();
        task.reconcile();

        self.persist(vec![
            Change::UpdateSession(updated),
            Change::UpdateTask(task.clone()),
        ])?;
        info!(
            "edited session {index} of '{}', {}s accumulated",
            task.name, task.accumulated_time
        );
        self.tasks[task_index] = task;
        Ok(())
    }

    /// Records a finished interval after the fact. When the task is running
    /// the new session goes just before the open one.
    pub fn add_manual_session(
        &mut self,
        task_id: TaskId,
        start: DateTime<Local>,
        end: DateTime<Local>,
    ) -> Result<()> {
        let task_index = self.task_index(task_id)?;
        ensure_range(start, end)?;

        let mut task = self.tasks[task_index].clone();
        let next_seq = task.next_seq();
        let mut session = Session::closed(task.id, next_seq, start, end);
        let mut changes = Vec::new();
        let position = match task.sessions.last_mut() {
            Some(open) if open.is_open() => {
                // seq follows list order, so the open session moves up one
                session.seq = open.seq;
                open.seq = next_seq;
                changes.push(Change::UpdateSession(open.clone()));
                task.sessions.len() - 1
            }
            _ => task.sessions.len(),
        };
        task.sessions.insert(position, session.clone());
        task.reconcile();

        changes.push(Change::SaveSession(session.clone()));
        changes.push(Change::UpdateTask(task.clone()));
        self.persist(changes)?;
        info!(
            "added {}s manual session to '{}'",
            session.duration, task.name
        );
        self.tasks[task_index] = task;
        Ok(())
    }

    /// Removes the session at `index`. Removing the open session stops the timer.
    pub fn delete_task_session(&mut self, task_id: TaskId, index: usize) -> Result<()> {
        let task_index = self.task_index(task_id)?;
        let mut task = self.tasks[task_index].clone();
        if index >= task.sessions.len() {
            return Err(session_not_found(task_id, index));
        }
        let removed = task.sessions.remove(index);
        task.reconcile();

        self.persist(vec![
            Change::DeleteSession(removed.id),
            Change::UpdateTask(task.clone()),
        ])?;
        info!(
            "deleted session {index} of '{}', {}s accumulated",
            task.name, task.accumulated_time
        );
        self.tasks[task_index] = task;
        Ok(())
    }
}

fn ensure_range(start: DateTime<Local>, end: DateTime<Local>) -> Result<()> {
    if end <= start {
        return Err(LedgerError::InvalidRange { start, end });
    }
    Ok(())
}

fn session_not_found(task_id: TaskId, index: usize) -> LedgerError {
    LedgerError::not_found("session", format!("{task_id}#{index}"))
}
