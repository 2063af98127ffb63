/// Persistence gateways: the trait the ledger writes through, plus the SQLite
/// and in-memory strategies behind it.
mod memory;
mod migrations;
mod project;
mod row;
mod session;
mod sqlite;
mod task;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use log::info;

use crate::config::{Backend, StorageConfig};
use crate::error::GatewayError;
use crate::types::{Project, ProjectId, Records, Session, SessionId, Task, TaskId};

pub use memory::MemoryGateway;
pub use sqlite::SqliteGateway;

/// A single write the ledger wants persisted.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    SaveProject(Project),
    UpdateProject(Project),
    DeleteProject(ProjectId),
    SaveTask(Task),
    UpdateTask(Task),
    DeleteTask(TaskId),
    SaveSession(Session),
    UpdateSession(Session),
    DeleteSession(SessionId),
}

/// Durable storage for projects, tasks and sessions.
///
/// Tasks are written without their sessions; sessions are separate rows keyed
/// by `task_id`. Deleting a task also deletes its sessions.
pub trait Gateway {
    fn save_project(&mut self, project: &Project) -> Result<(), GatewayError>;
    fn update_project(&mut self, project: &Project) -> Result<(), GatewayError>;
    fn delete_project(&mut self, id: ProjectId) -> Result<(), GatewayError>;

    fn save_task(&mut self, task: &Task) -> Result<(), GatewayError>;
    fn update_task(&mut self, task: &Task) -> Result<(), GatewayError>;
    fn delete_task(&mut self, id: TaskId) -> Result<(), GatewayError>;

    fn save_session(&mut self, session: &Session) -> Result<(), GatewayError>;
    fn update_session(&mut self, session: &Session) -> Result<(), GatewayError>;
    fn delete_session(&mut self, id: SessionId) -> Result<(), GatewayError>;

    fn load_all(&mut self) -> Result<Records, GatewayError>;

    /// Writes one ledger operation. Implementations that can should make the
    /// whole batch atomic.
    fn commit(&mut self, changes: &[Change]) -> Result<(), GatewayError> {
        for change in changes {
            self.apply(change)?;
        }
        Ok(())
    }

    fn apply(&mut self, change: &Change) -> Result<(), GatewayError> {
        match change {
            Change::SaveProject(project) => self.save_project(project),
            Change::UpdateProject(project) => self.update_project(project),
            Change::DeleteProject(id) => self.delete_project(*id),
            Change::SaveTask(task) => self.save_task(task),
            Change::UpdateTask(task) => self.update_task(task),
            Change::DeleteTask(id) => self.delete_task(*id),
            Change::SaveSession(session) => self.save_session(session),
            Change::UpdateSession(session) => self.update_session(session),
            Change::DeleteSession(id) => self.delete_session(*id),
        }
    }
}

/// Opens the gateway selected by the storage configuration.
pub fn open(config: &StorageConfig) -> Result<Box<dyn Gateway>> {
    match config.backend {
        Backend::Sqlite => {
            let path = config.path.clone().unwrap_or_else(default_db_path);
            info!("opening sqlite store at {}", path.display());
            let gateway =
                SqliteGateway::open(&path, Duration::from_millis(config.busy_timeout_ms))?;
            Ok(Box::new(gateway))
        }
        Backend::Memory => {
            info!("using volatile in-memory store");
            Ok(Box::new(MemoryGateway::new()))
        }
    }
}

/// Returns the default database path inside the user's data directory.
/// Falls back to `./duotrack.db` when no data dir is found.
pub fn default_db_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_local_dir() {
        let app_dir = data_dir.join("duotrack");
        std::fs::create_dir_all(&app_dir).ok();
        app_dir.join("duotrack.db")
    } else {
        PathBuf::from("duotrack.db")
    }
}
