use crate::error::StorageError;
use crate::utils::ensure_dir;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const REQUIRED_COLUMNS: [&str; 4] = ["id", "date", "user_input", "gpt_response"];

/// One stored question/answer exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRecord {
    pub id: i64,
    pub timestamp: String,
    pub user_input: String,
    pub response: Option<String>,
}

/// Append-only chat log backed by the `chats` table.
///
/// The handle owns one connection for its lifetime; every write runs inside
/// its own transaction so a failed append leaves nothing behind.
pub struct ChatStore {
    conn: Connection,
    path: PathBuf,
}

impl ChatStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent).map_err(|source| StorageError::Directory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&path).map_err(|source| StorageError::Open {
            path: path.clone(),
            source,
        })?;

        Ok(ChatStore { conn, path })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Ok(ChatStore {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// Creates the `chats` table if missing and checks an existing one has
    /// the expected columns. Safe to call on every startup.
    pub fn initialize(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT,
                user_input TEXT,
                gpt_response TEXT
            );",
        )?;

        let mut stmt = self.conn.prepare("PRAGMA table_info(chats)")?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        for column in REQUIRED_COLUMNS {
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                return Err(StorageError::MalformedSchema { column });
            }
        }

        info!(path = %self.path.display(), "chat store initialized");
        Ok(())
    }

    pub fn append(
        &mut self,
        timestamp: &str,
        user_input: &str,
        response: &str,
    ) -> Result<i64, StorageError> {
        if user_input.is_empty() {
            return Err(StorageError::EmptyInput);
        }

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO chats (date, user_input, gpt_response) VALUES (?1, ?2, ?3)",
            params![timestamp, user_input, response],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        debug!(id, "appended chat");
        Ok(id)
    }

    /// Every record in ascending id order.
    pub fn scan_all(&self) -> Result<Vec<ChatRecord>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, date, user_input, gpt_response FROM chats ORDER BY id ASC")?;

        let records = stmt
            .query_map([], |row| {
                Ok(ChatRecord {
                    id: row.get(0)?,
                    timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    user_input: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    response: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chats", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn close(self) -> Result<(), StorageError> {
        self.conn.close().map_err(|(_, e)| StorageError::Sql(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_scan_in_order() -> Result<()> {
        let mut store = ChatStore::open_in_memory()?;
        store.initialize()?;

        let a = store.append("2024-01-01 10:00:00", "first", "one")?;
        let b = store.append("2024-01-01 10:00:01", "second", "two")?;
        let c = store.append("2024-01-01 10:00:02", "third", "three")?;
        assert!(a < b && b < c);

        let records = store.scan_all()?;
        let inputs: Vec<&str> = records.iter().map(|r| r.user_input.as_str()).collect();
        assert_eq!(inputs, vec!["first", "second", "third"]);
        assert_eq!(records[1].response.as_deref(), Some("two"));
        assert_eq!(records[2].timestamp, "2024-01-01 10:00:02");
        assert_eq!(store.count()?, 3);
        Ok(())
    }

    #[test]
    fn test_initialize_is_idempotent_and_persists() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("chat_history.db");

        let mut store = ChatStore::open(&path)?;
        store.initialize()?;
        store.initialize()?;
        store.append("t1", "hello", "world")?;
        store.close()?;

        let store = ChatStore::open(&path)?;
        store.initialize()?;
        let records = store.scan_all()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].user_input, "hello");
        Ok(())
    }

    #[test]
    fn test_ids_not_reused() -> Result<()> {
        let mut store = ChatStore::open_in_memory()?;
        store.initialize()?;
        let first = store.append("t", "a", "b")?;
        store.conn.execute("DELETE FROM chats", [])?;
        let second = store.append("t", "c", "d")?;
        assert!(second > first);
        Ok(())
    }

    #[test]
    fn test_empty_input_rejected() -> Result<()> {
        let mut store = ChatStore::open_in_memory()?;
        store.initialize()?;
        assert!(matches!(
            store.append("t", "", "r"),
            Err(StorageError::EmptyInput)
        ));
        assert_eq!(store.count()?, 0);
        Ok(())
    }

    #[test]
    fn test_malformed_schema_detected() -> Result<()> {
        let store = ChatStore::open_in_memory()?;
        store
            .conn
            .execute_batch("CREATE TABLE chats (id INTEGER PRIMARY KEY, body TEXT);")?;
        assert!(matches!(
            store.initialize(),
            Err(StorageError::MalformedSchema { column: "date" })
        ));
        Ok(())
    }

    #[test]
    fn test_null_columns_read_back() -> Result<()> {
        let store = ChatStore::open_in_memory()?;
        store.initialize()?;
        store
            .conn
            .execute("INSERT INTO chats (user_input) VALUES ('legacy')", [])?;
        let records = store.scan_all()?;
        assert_eq!(records[0].timestamp, "");
        assert_eq!(records[0].response, None);
        Ok(())
    }

    #[test]
    fn test_scan_without_table_fails() -> Result<()> {
        let store = ChatStore::open_in_memory()?;
        assert!(matches!(store.scan_all(), Err(StorageError::Sql(_))));
        Ok(())
    }
}
