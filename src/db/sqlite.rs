use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use super::{Change, Gateway, migrations, project, session, task};
use crate::error::GatewayError;
use crate::types::{Project, ProjectId, Records, Session, SessionId, Task, TaskId};

/// Durable gateway backed by a SQLite file.
pub struct SqliteGateway {
    conn: Connection,
}

impl SqliteGateway {
    /// Opens (or creates) the database and runs migrations.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, GatewayError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, GatewayError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, GatewayError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }
}

impl Gateway for SqliteGateway {
    fn save_project(&mut self, project: &Project) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::SaveProject(project.clone()))
    }

    fn update_project(&mut self, project: &Project) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::UpdateProject(project.clone()))
    }

    fn delete_project(&mut self, id: ProjectId) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::DeleteProject(id))
    }

    fn save_task(&mut self, task: &Task) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::SaveTask(task.clone()))
    }

    fn update_task(&mut self, task: &Task) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::UpdateTask(task.clone()))
    }

    fn delete_task(&mut self, id: TaskId) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::DeleteTask(id))
    }

    fn save_session(&mut self, session: &Session) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::SaveSession(session.clone()))
    }

    fn update_session(&mut self, session: &Session) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::UpdateSession(session.clone()))
    }

    fn delete_session(&mut self, id: SessionId) -> Result<(), GatewayError> {
        apply_to(&self.conn, &Change::DeleteSession(id))
    }

    fn load_all(&mut self) -> Result<Records, GatewayError> {
        Ok(Records {
            projects: project::query_projects(&self.conn)?,
            tasks: task::query_tasks(&self.conn)?,
            sessions: session::query_sessions(&self.conn)?,
        })
    }

    /// Runs the whole batch in one transaction; a failed change rolls back the rest.
    fn commit(&mut self, changes: &[Change]) -> Result<(), GatewayError> {
        let tx = self.conn.transaction()?;
        for change in changes {
            apply_to(&tx, change)?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn apply_to(conn: &Connection, change: &Change) -> Result<(), GatewayError> {
    match change {
        Change::SaveProject(p) => project::insert_project(p, conn)?,
        Change::UpdateProject(p) => {
            expect_row(project::update_project(p, conn)?, "project", p.id)?
        }
        Change::DeleteProject(id) => project::delete_project(*id, conn)?,
        Change::SaveTask(t) => task::insert_task(t, conn)?,
        Change::UpdateTask(t) => expect_row(task::update_task(t, conn)?, "task", t.id)?,
        Change::DeleteTask(id) => task::delete_task(*id, conn)?,
        Change::SaveSession(s) => session::insert_session(s, conn)?,
        Change::UpdateSession(s) => {
            expect_row(session::update_session(s, conn)?, "session", s.id)?
        }
        Change::DeleteSession(id) => session::delete_session(*id, conn)?,
    }
    Ok(())
}

fn expect_row(touched: usize, kind: &'static str, id: impl ToString) -> Result<(), GatewayError> {
    if touched == 0 {
        return Err(GatewayError::Missing {
            kind,
            id: id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{Local, NaiveDate, TimeZone};
    use uuid::Uuid;

    use super::*;
    use crate::types::{ProjectStatus, TaskStatus, User};

    fn sample_project() -> Project {
        Project {
            id: Uuid::new_v4(),
            name: "Website".to_string(),
            client: Some("Acme".to_string()),
            deadline: NaiveDate::from_ymd_opt(2026, 12, 1),
            budget_hours: Some(12.5),
            status: ProjectStatus::Active,
            created_at: Local.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap(),
        }
    }

    fn sample_task(project_id: ProjectId) -> Task {
        Task {
            id: Uuid::new_v4(),
            name: "Landing page".to_string(),
            project_id,
            user: User::B,
            accumulated_time: 0,
            status: TaskStatus::Active,
            is_running: false,
            created_at: Local.with_ymd_and_hms(2026, 10, 1, 9, 5, 0).unwrap(),
            completed_at: None,
            sessions: Vec::new(),
        }
    }

    #[test]
    fn save_and_load_all() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let project = sample_project();
        let task = sample_task(project.id);
        let start = Local.with_ymd_and_hms(2026, 10, 1, 10, 0, 0).unwrap();
        let closed = Session::closed(task.id, 0, start, start + chrono::Duration::minutes(30));
        let open = Session::open(task.id, 1, start + chrono::Duration::hours(1));

        gateway
            .commit(&[
                Change::SaveProject(project.clone()),
                Change::SaveTask(task.clone()),
                Change::SaveSession(closed.clone()),
                Change::SaveSession(open.clone()),
            ])
            .unwrap();

        let records = gateway.load_all().unwrap();
        assert_eq!(records.projects, vec![project]);
        assert_eq!(records.tasks, vec![task]);
        assert_eq!(records.sessions, vec![closed, open]);
    }

    #[test]
    fn failed_commit_rolls_back_whole_batch() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let project = sample_project();
        let mut missing = sample_project();
        missing.id = Uuid::new_v4();

        let result = gateway.commit(&[
            Change::SaveProject(project),
            Change::UpdateProject(missing),
        ]);

        assert!(matches!(result, Err(GatewayError::Missing { kind: "project", .. })));
        assert!(gateway.load_all().unwrap().projects.is_empty());
    }

    #[test]
    fn deleting_task_removes_its_sessions() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let project = sample_project();
        let task = sample_task(project.id);
        let start = Local.with_ymd_and_hms(2026, 10, 2, 8, 0, 0).unwrap();
        gateway.save_project(&project).unwrap();
        gateway.save_task(&task).unwrap();
        gateway
            .save_session(&Session::closed(task.id, 0, start, start + chrono::Duration::minutes(5)))
            .unwrap();

        gateway.delete_task(task.id).unwrap();

        let records = gateway.load_all().unwrap();
        assert!(records.tasks.is_empty());
        assert!(records.sessions.is_empty());
    }

    #[test]
    fn session_update_rewrites_seq() {
        let mut gateway = SqliteGateway::open_in_memory().unwrap();
        let project = sample_project();
        let task = sample_task(project.id);
        let start = Local.with_ymd_and_hms(2026, 10, 3, 8, 0, 0).unwrap();
        let mut open = Session::open(task.id, 0, start);
        let manual = Session::closed(
            task.id,
            0,
            start - chrono::Duration::hours(2),
            start - chrono::Duration::hours(1),
        );
        gateway.save_project(&project).unwrap();
        gateway.save_task(&task).unwrap();
        gateway.save_session(&open).unwrap();
        open.seq = 1;
        gateway
            .commit(&[
                Change::UpdateSession(open.clone()),
                Change::SaveSession(manual.clone()),
            ])
            .unwrap();

        assert_eq!(gateway.load_all().unwrap().sessions, vec![manual, open]);
    }

    #[test]
    fn reopening_file_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duotrack.db");
        let project = sample_project();
        {
            let mut gateway = SqliteGateway::open(&path, Duration::from_millis(100)).unwrap();
            gateway.save_project(&project).unwrap();
        }
        let mut gateway = SqliteGateway::open(&path, Duration::from_millis(100)).unwrap();
        assert_eq!(gateway.load_all().unwrap().projects, vec![project]);
    }
}
