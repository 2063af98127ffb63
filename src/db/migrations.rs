/// Database migrations and schema management.
use rusqlite::Connection;

/// Creates the schema if it doesn't exist yet and upgrades older layouts.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS projects (
            id           TEXT    PRIMARY KEY,
            name         TEXT    NOT NULL,
            status       TEXT    NOT NULL DEFAULT 'active',
            created_at   TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id               TEXT    PRIMARY KEY,
            name             TEXT    NOT NULL,
            project_id       TEXT    NOT NULL,
            user             TEXT    NOT NULL,
            accumulated_time INTEGER NOT NULL DEFAULT 0,
            status           TEXT    NOT NULL DEFAULT 'active',
            is_running       INTEGER NOT NULL DEFAULT 0,
            created_at       TEXT    NOT NULL,
            completed_at     TEXT,
            FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id         TEXT    PRIMARY KEY,
            task_id    TEXT    NOT NULL,
            seq        INTEGER NOT NULL,
            start_time TEXT    NOT NULL,
            end_time   TEXT,
            duration   INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_task ON sessions(task_id, seq);
        ",
    )?;
    migrate_projects_add_planning(conn)?;
    Ok(())
}

/// Client, deadline and budget arrived after the first schema.
fn migrate_projects_add_planning(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("PRAGMA table_info(projects)")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = Vec::new();
    for row in rows {
        columns.push(row?);
    }

    for (column, sql_type) in [
        ("client", "TEXT"),
        ("deadline", "TEXT"),
        ("budget_hours", "REAL"),
    ] {
        if !columns.iter().any(|existing| existing == column) {
            conn.execute(
                &format!("ALTER TABLE projects ADD COLUMN {column} {sql_type}"),
                [],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_columns(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("PRAGMA table_info(projects)").unwrap();
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(|row| row.unwrap())
            .collect();
        columns
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();
        let columns = project_columns(&conn);
        assert_eq!(
            columns.iter().filter(|c| c.as_str() == "budget_hours").count(),
            1
        );
    }

    #[test]
    fn old_project_table_gains_planning_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE projects (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL
            );",
        )
        .unwrap();
        run_migrations(&conn).unwrap();
        let columns = project_columns(&conn);
        for expected in ["client", "deadline", "budget_hours"] {
            assert!(columns.iter().any(|c| c == expected), "missing {expected}");
        }
    }
}
