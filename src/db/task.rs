/// Task database queries. Sessions live in their own table, see `session.rs`.
use rusqlite::{Connection, Row, params};

use super::row::{datetime_at, optional_datetime_at, parsed_at, seconds_at, uuid_at};
use crate::types::{Task, TaskId};

pub fn insert_task(task: &Task, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tasks (id, name, project_id, user, accumulated_time, status,
                            is_running, created_at, completed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            task.id.to_string(),
            task.name,
            task.project_id.to_string(),
            task.user.as_str(),
            task.accumulated_time as i64,
            task.status.as_str(),
            task.is_running,
            task.created_at.to_rfc3339(),
            task.completed_at.map(|dt| dt.to_rfc3339()),
        ],
    )?;
    Ok(())
}

pub fn update_task(task: &Task, conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE tasks
         SET name = ?2, project_id = ?3, user = ?4, accumulated_time = ?5, status = ?6,
             is_running = ?7, completed_at = ?8
         WHERE id = ?1",
        params![
            task.id.to_string(),
            task.name,
            task.project_id.to_string(),
            task.user.as_str(),
            task.accumulated_time as i64,
            task.status.as_str(),
            task.is_running,
            task.completed_at.map(|dt| dt.to_rfc3339()),
        ],
    )
}

pub fn delete_task(id: TaskId, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE task_id = ?1", [id.to_string()])?;
    conn.execute("DELETE FROM tasks WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

/// Loads every task without sessions; the ledger nests them afterwards.
pub fn query_tasks(conn: &Connection) -> rusqlite::Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, project_id, user, accumulated_time, status, is_running,
                created_at, completed_at
         FROM tasks ORDER BY created_at, rowid",
    )?;
    let rows = stmt.query_map([], task_from_row)?;
    let mut tasks = Vec::new();
    for row in rows {
        tasks.push(row?);
    }
    Ok(tasks)
}

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        project_id: uuid_at(row, 2)?,
        user: parsed_at(row, 3)?,
        accumulated_time: seconds_at(row, 4)?,
        status: parsed_at(row, 5)?,
        is_running: row.get(6)?,
        created_at: datetime_at(row, 7)?,
        completed_at: optional_datetime_at(row, 8)?,
        sessions: Vec::new(),
    })
}
