use rusqlite::{Connection, Row, params};

use super::row::{datetime_at, optional_datetime_at, seconds_at, uuid_at};
use crate::types::{Session, SessionId};

pub fn insert_session(session: &Session, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, task_id, seq, start_time, end_time, duration)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id.to_string(),
            session.task_id.to_string(),
            session.seq,
            session.start.to_rfc3339(),
            session.end.map(|dt| dt.to_rfc3339()),
            session.duration as i64,
        ],
    )?;
    Ok(())
}

pub fn update_session(session: &Session, conn: &Connection) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE sessions SET seq = ?2, start_time = ?3, end_time = ?4, duration = ?5
         WHERE id = ?1",
        params![
            session.id.to_string(),
            session.seq,
            session.start.to_rfc3339(),
            session.end.map(|dt| dt.to_rfc3339()),
            session.duration as i64,
        ],
    )
}

pub fn delete_session(id: SessionId, conn: &Connection) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM sessions WHERE id = ?1", [id.to_string()])?;
    Ok(())
}

pub fn query_sessions(conn: &Connection) -> rusqlite::Result<Vec<Session>> {
    let mut stmt = conn.prepare(
        "SELECT id, task_id, seq, start_time, end_time, duration
         FROM sessions ORDER BY task_id, seq",
    )?;
    let rows = stmt.query_map([], session_from_row)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: uuid_at(row, 0)?,
        task_id: uuid_at(row, 1)?,
        seq: row.get(2)?,
        start: datetime_at(row, 3)?,
        end: optional_datetime_at(row, 4)?,
        duration: seconds_at(row, 5)?,
    })
}
