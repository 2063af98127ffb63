use std::cell::RefCell;
use std::rc::Rc;

use super::{Change, Gateway};
use crate::error::GatewayError;
use crate::types::{Project, ProjectId, Records, Session, SessionId, Task, TaskId};

#[derive(Clone, Debug, Default)]
struct Store {
    projects: Vec<Project>,
    tasks: Vec<Task>,
    sessions: Vec<Session>,
}

/// Volatile gateway. Clones share one store, which lets callers inspect what
/// was written and switch the store offline to simulate outages.
#[derive(Clone, Debug, Default)]
pub struct MemoryGateway {
    store: Rc<RefCell<Store>>,
    offline: Rc<RefCell<bool>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `GatewayError::Unavailable`.
    #[cfg(test)]
    pub fn set_offline(&self, offline: bool) {
        *self.offline.borrow_mut() = offline;
    }

    #[cfg(test)]
    pub fn records(&self) -> Records {
        let store = self.store.borrow();
        Records {
            projects: store.projects.clone(),
            tasks: store.tasks.clone(),
            sessions: store.sessions.clone(),
        }
    }

    fn check_online(&self) -> Result<(), GatewayError> {
        if *self.offline.borrow() {
            return Err(GatewayError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }
}

impl Store {
    fn apply(&mut self, change: &Change) -> Result<(), GatewayError> {
        match change {
            Change::SaveProject(project) => self.projects.push(project.clone()),
            Change::UpdateProject(project) => {
                let slot = find(&mut self.projects, |p| p.id == project.id, "project", project.id)?;
                *slot = project.clone();
            }
            Change::DeleteProject(id) => {
                let task_ids: Vec<TaskId> = self
                    .tasks
                    .iter()
                    .filter(|t| t.project_id == *id)
                    .map(|t| t.id)
                    .collect();
                for task_id in task_ids {
                    self.remove_task(task_id);
                }
                self.projects.retain(|p| p.id != *id);
            }
            Change::SaveTask(task) => self.tasks.push(without_sessions(task)),
            Change::UpdateTask(task) => {
                let slot = find(&mut self.tasks, |t| t.id == task.id, "task", task.id)?;
                *slot = without_sessions(task);
            }
            Change::DeleteTask(id) => self.remove_task(*id),
            Change::SaveSession(session) => self.sessions.push(session.clone()),
            Change::UpdateSession(session) => {
                let slot = find(&mut self.sessions, |s| s.id == session.id, "session", session.id)?;
                *slot = session.clone();
            }
            Change::DeleteSession(id) => self.sessions.retain(|s| s.id != *id),
        }
        Ok(())
    }

    fn remove_task(&mut self, id: TaskId) {
        self.sessions.retain(|s| s.task_id != id);
        self.tasks.retain(|t| t.id != id);
    }
}

impl Gateway for MemoryGateway {
    fn save_project(&mut self, project: &Project) -> Result<(), GatewayError> {
        self.apply(&Change::SaveProject(project.clone()))
    }

    fn update_project(&mut self, project: &Project) -> Result<(), GatewayError> {
        self.apply(&Change::UpdateProject(project.clone()))
    }

    fn delete_project(&mut self, id: ProjectId) -> Result<(), GatewayError> {
        self.apply(&Change::DeleteProject(id))
    }

    fn save_task(&mut self, task: &Task) -> Result<(), GatewayError> {
        self.apply(&Change::SaveTask(task.clone()))
    }

    fn update_task(&mut self, task: &Task) -> Result<(), GatewayError> {
        self.apply(&Change::UpdateTask(task.clone()))
    }

    fn delete_task(&mut self, id: TaskId) -> Result<(), GatewayError> {
        self.apply(&Change::DeleteTask(id))
    }

    fn save_session(&mut self, session: &Session) -> Result<(), GatewayError> {
        self.apply(&Change::SaveSession(session.clone()))
    }

    fn update_session(&mut self, session: &Session) -> Result<(), GatewayError> {
        self.apply(&Change::UpdateSession(session.clone()))
    }

    fn delete_session(&mut self, id: SessionId) -> Result<(), GatewayError> {
        self.apply(&Change::DeleteSession(id))
    }

    fn load_all(&mut self) -> Result<Records, GatewayError> {
        self.check_online()?;
        let store = self.store.borrow();
        Ok(Records {
            projects: store.projects.clone(),
            tasks: store.tasks.clone(),
            sessions: store.sessions.clone(),
        })
    }

    fn apply(&mut self, change: &Change) -> Result<(), GatewayError> {
        self.commit(std::slice::from_ref(change))
    }

    /// Applies the batch to a copy and swaps it in only if every change succeeded.
    fn commit(&mut self, changes: &[Change]) -> Result<(), GatewayError> {
        self.check_online()?;
        let mut staged = self.store.borrow().clone();
        for change in changes {
            staged.apply(change)?;
        }
        *self.store.borrow_mut() = staged;
        Ok(())
    }
}

fn find<'a, T>(
    items: &'a mut [T],
    matches: impl Fn(&T) -> bool,
    kind: &'static str,
    id: impl ToString,
) -> Result<&'a mut T, GatewayError> {
    items
        .iter_mut()
        .find(|item| matches(&**item))
        .ok_or_else(|| GatewayError::Missing {
            kind,
            id: id.to_string(),
        })
}

fn without_sessions(task: &Task) -> Task {
    Task {
        sessions: Vec::new(),
        ..task.clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Local;
    use uuid::Uuid;

    use super::*;
    use crate::types::ProjectStatus;

    fn project(name: &str) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            client: None,
            deadline: None,
            budget_hours: None,
            status: ProjectStatus::Active,
            created_at: Local::now(),
        }
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let mut gateway = MemoryGateway::new();
        let result = gateway.commit(&[
            Change::SaveProject(project("kept out")),
            Change::UpdateProject(project("never saved")),
        ]);
        assert!(result.is_err());
        assert!(gateway.records().projects.is_empty());
    }

    #[test]
    fn offline_store_rejects_writes() {
        let mut gateway = MemoryGateway::new();
        gateway.set_offline(true);
        assert!(matches!(
            gateway.save_project(&project("docs")),
            Err(GatewayError::Unavailable(_))
        ));
        gateway.set_offline(false);
        gateway.save_project(&project("docs")).unwrap();
        assert_eq!(gateway.records().projects.len(), 1);
    }
}
