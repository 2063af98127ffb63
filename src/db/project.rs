/// Project-related database queries.
use rusqlite::{Connection, Row, params};

use super::row::{DATE_FORMAT, datetime_at, optional_date_at, parsed_at, uuid_at};
use crate::types::{Project, ProjectId};

const PROJECT_COLUMNS: &str = "id, name, client, deadline, budget_hours, status, created_at";

pub fn insert_project(project: &Project, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO projects (id, name, client, deadline, budget_hours, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            project.id.to_string(),
            project.name,
            project.client,
            project.deadline.map(|d| d.format(DATE_FORMAT).to_string()),
            project.budget_hours,
            project.status.as_str(),
            project.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Returns the number of rows touched so the gateway can detect a missing project.
pub fn update_project(project: &Project, conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE projects
         SET name = ?2, client = ?3, deadline = ?4, budget_hours = ?5, status = ?6
         WHERE id = ?1",
        params![
            project.id.to_string(),
            project.name,
            project.client,
            project.deadline.map(|d| d.format(DATE_FORMAT).to_string()),
            project.budget_hours,
            project.status.as_str(),
        ],
    )
}

pub fn delete_project(id: ProjectId, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM projects WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

pub fn query_projects(conn: &Connection) -> rusqlite::Result<Vec<Project>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY created_at, rowid"
    ))?;
    let rows = stmt.query_map([], project_from_row)?;
    let mut projects = Vec::new();
    for row in rows {
        projects.push(row?);
    }
    Ok(projects)
}

fn project_from_row(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: uuid_at(row, 0)?,
        name: row.get(1)?,
        client: row.get(2)?,
        deadline: optional_date_at(row, 3)?,
        budget_hours: row.get(4)?,
        status: parsed_at(row, 5)?,
        created_at: datetime_at(row, 6)?,
    })
}
