pub mod models;

use models::ChatTurn;
use rusqlite::{params, Connection, Result, Row};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Per-document chat history for the lifetime of one session.
///
/// Backed by an in-memory SQLite database: nothing survives a restart, and
/// turns are only ever appended.
pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS turns (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                document TEXT NOT NULL,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_turns_document ON turns(document, seq);
            ",
        )?;
        Ok(())
    }

    fn turn_from_row(row: &Row<'_>) -> Result<ChatTurn> {
        Ok(ChatTurn {
            id: row.get(0)?,
            document: row.get(1)?,
            query: row.get(2)?,
            response: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    pub fn append_turn(&self, document: &str, query: &str, response: &str) -> Result<ChatTurn> {
        let conn = self.lock();
        let id = uuid::Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO turns (id, document, query, response) VALUES (?1, ?2, ?3, ?4)",
            params![id, document, query, response],
        )?;
        conn.query_row(
            "SELECT id, document, query, response, created_at FROM turns WHERE id = ?1",
            params![id],
            Self::turn_from_row,
        )
    }

    /// Full history for a document, oldest first.
    pub fn history(&self, document: &str) -> Result<Vec<ChatTurn>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document, query, response, created_at FROM turns WHERE document = ?1 ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![document], Self::turn_from_row)?;
        rows.collect()
    }

    /// The last `limit` turns for a document, oldest first.
    pub fn recent(&self, document: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document, query, response, created_at FROM turns WHERE document = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![document, limit], Self::turn_from_row)?;
        let mut turns = rows.collect::<Result<Vec<_>>>()?;
        turns.reverse();
        Ok(turns)
    }

    pub fn turn_count(&self, document: &str) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM turns WHERE document = ?1",
            params![document],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
