//! SQLite storage layer for chatline.
//!
//! One database holds users, sessions and messages. All methods are
//! synchronous; async callers go through [`Db::run`], which moves the work
//! onto the blocking pool so no async task stalls on disk I/O.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// User row stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: String,
    pub full_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: u64,
}

/// Session token row. `expires_at` of `None` means the token never expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub token: String,
    pub user_id: String,
    pub created_at: u64,
    pub expires_at: Option<u64>,
}

/// Message fields supplied by the caller; id and timestamp are assigned on insert.
#[derive(Debug, Clone)]
pub struct NewMessageRow {
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_ref: Option<String>,
    pub audio_ref: Option<String>,
}

/// Message row stored in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: Option<String>,
    pub image_ref: Option<String>,
    pub audio_ref: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    Forbidden,
}

/// Key identifying the unordered pair of participants.
pub fn conversation_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}\u{1f}{b}")
    } else {
        format!("{b}\u{1f}{a}")
    }
}

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, text, image_ref, audio_ref, created_at";

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image_ref: row.get(4)?,
        audio_ref: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user_id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        avatar_url: row.get(3)?,
        created_at: row.get::<_, i64>(4)? as u64,
    })
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self { conn };
        storage.create_schema()?;
        Ok(storage)
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id     TEXT PRIMARY KEY,
                full_name   TEXT NOT NULL,
                email       TEXT UNIQUE,
                avatar_url  TEXT,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                token       TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
                created_at  INTEGER NOT NULL,
                expires_at  INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id                INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_key  TEXT NOT NULL,
                sender_id         TEXT NOT NULL,
                receiver_id       TEXT NOT NULL,
                text              TEXT,
                image_ref         TEXT,
                audio_ref         TEXT,
                created_at        INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_key, created_at, id);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn insert_user(&self, row: &UserRow) -> Result<(), StorageError> {
        let affected = self.conn.execute(
            "INSERT OR IGNORE INTO users (user_id, full_name, email, avatar_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.user_id,
                row.full_name,
                row.email,
                row.avatar_url,
                row.created_at as i64,
            ],
        )?;
        if affected == 0 {
            return Err(StorageError::AlreadyExists(format!("user {}", row.user_id)));
        }
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> Result<Option<UserRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, full_name, email, avatar_url, created_at
                 FROM users WHERE user_id = ?1",
                params![user_id],
                user_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// All users except `excluded`, ordered by name then id.
    pub fn list_users_except(&self, excluded: &str) -> Result<Vec<UserRow>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, full_name, email, avatar_url, created_at
             FROM users WHERE user_id != ?1
             ORDER BY full_name ASC, user_id ASC",
        )?;
        let rows = stmt.query_map(params![excluded], user_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn update_avatar(
        &self,
        user_id: &str,
        avatar_url: &str,
    ) -> Result<Option<UserRow>, StorageError> {
        let affected = self.conn.execute(
            "UPDATE users SET avatar_url = ?1 WHERE user_id = ?2",
            params![avatar_url, user_id],
        )?;
        if affected == 0 {
            return Ok(None);
        }
        self.get_user(user_id)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn insert_session(&self, row: &SessionRow) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.token,
                row.user_id,
                row.created_at as i64,
                row.expires_at.map(|t| t as i64),
            ],
        )?;
        Ok(())
    }

    /// Resolve a token to its user if the session is still valid at `now`.
    pub fn user_for_token(&self, token: &str, now: u64) -> Result<Option<String>, StorageError> {
        let user = self
            .conn
            .query_row(
                "SELECT user_id FROM sessions
                 WHERE token = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![token, now as i64],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Append a message and return the stored row.
    ///
    /// `created_at` never goes backwards within a conversation, so messages
    /// appended one after another keep their order even across clock steps.
    /// Once `deadline` has passed the transaction is rolled back instead of
    /// committed.
    pub fn insert_message(
        &self,
        row: &NewMessageRow,
        now: u64,
        deadline: Option<Instant>,
    ) -> Result<MessageRow, StorageError> {
        check_deadline(deadline)?;
        let key = conversation_key(&row.sender_id, &row.receiver_id);
        let tx = self.conn.unchecked_transaction()?;

        let last: Option<i64> = tx.query_row(
            "SELECT MAX(created_at) FROM messages WHERE conversation_key = ?1",
            params![key],
            |r| r.get(0),
        )?;
        let created_at = last.map_or(now, |l| now.max(l as u64));

        tx.execute(
            "INSERT INTO messages
             (conversation_key, sender_id, receiver_id, text, image_ref, audio_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                key,
                row.sender_id,
                row.receiver_id,
                row.text,
                row.image_ref,
                row.audio_ref,
                created_at as i64,
            ],
        )?;
        let id = tx.last_insert_rowid();
        check_deadline(deadline)?;
        tx.commit()?;

        Ok(MessageRow {
            id,
            sender_id: row.sender_id.clone(),
            receiver_id: row.receiver_id.clone(),
            text: row.text.clone(),
            image_ref: row.image_ref.clone(),
            audio_ref: row.audio_ref.clone(),
            created_at,
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>, StorageError> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
        let row = self
            .conn
            .query_row(&sql, params![id], message_from_row)
            .optional()?;
        Ok(row)
    }

    /// All messages between two users, oldest first, ties broken by id.
    pub fn list_conversation_messages(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<MessageRow>, StorageError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_key = ?1
             ORDER BY created_at ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![conversation_key(user_a, user_b)], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Delete a message if `requester` sent it. Check and delete run in one
    /// transaction.
    pub fn delete_own_message(
        &self,
        id: i64,
        requester: &str,
    ) -> Result<DeleteOutcome, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let sender: Option<String> = tx
            .query_row(
                "SELECT sender_id FROM messages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match sender {
            None => DeleteOutcome::NotFound,
            Some(sender) if sender != requester => DeleteOutcome::Forbidden,
            Some(_) => {
                tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
                DeleteOutcome::Deleted
            }
        };
        tx.commit()?;
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Shared handle
// ---------------------------------------------------------------------------

/// Cloneable handle to a [`Storage`] shared by the async services.
#[derive(Clone)]
pub struct Db {
    inner: Arc<Mutex<Storage>>,
}

impl Db {
    pub fn new(storage: Storage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Run `f` against the storage on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Storage) -> Result<T, StorageError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let storage = inner.lock().unwrap_or_else(PoisonError::into_inner);
            f(&storage)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?
    }

    /// Synchronous access for start-up and CLI paths.
    pub fn with<T>(&self, f: impl FnOnce(&Storage) -> T) -> T {
        let storage = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&storage)
    }
}

fn check_deadline(deadline: Option<Instant>) -> Result<(), StorageError> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(StorageError::Unavailable(
            "deadline passed before commit".to_string(),
        )),
        _ => Ok(()),
    }
}

pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("chatline.sqlite3")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
