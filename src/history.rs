//! Chat session persistence.
//!
//! Sessions are append-only sequences of (question, answer, cited
//! chunk ids) turns. A session belongs to exactly one requester; turns
//! are applied strictly in the order received within a session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::core::errors::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: i64,
    pub session_id: String,
    pub question: String,
    pub answer: String,
    pub cited_chunk_ids: Vec<String>,
    pub created_at: String,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn open(db_path: PathBuf) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(CoreError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                requester_id TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&pool)
        .await
        .map_err(CoreError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                cited_chunk_ids TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY(session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
        )
        .execute(&pool)
        .await
        .map_err(CoreError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id)")
            .execute(&pool)
            .await
            .map_err(CoreError::internal)?;

        Ok(Self { pool })
    }

    /// Append a turn, creating the session on first use. Appending to
    /// another requester's session is rejected.
    pub async fn append_turn(
        &self,
        session_id: &str,
        requester_id: &str,
        question: &str,
        answer: &str,
        cited_chunk_ids: &[String],
    ) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        let citations = serde_json::to_string(cited_chunk_ids).map_err(CoreError::internal)?;

        let mut tx = self.pool.begin().await.map_err(CoreError::internal)?;

        let owner: Option<String> =
            sqlx::query_scalar("SELECT requester_id FROM sessions WHERE id = ?1")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(CoreError::internal)?;

        match owner {
            Some(owner) if owner != requester_id => {
                return Err(CoreError::Validation(format!(
                    "session {} belongs to another requester",
                    session_id
                )));
            }
            Some(_) => {
                sqlx::query("UPDATE sessions SET updated_at = ?1 WHERE id = ?2")
                    .bind(&now)
                    .bind(session_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(CoreError::internal)?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO sessions (id, requester_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?3)",
                )
                .bind(session_id)
                .bind(requester_id)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .map_err(CoreError::internal)?;
            }
        }

        let result = sqlx::query(
            "INSERT INTO turns (session_id, question, answer, cited_chunk_ids, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(session_id)
        .bind(question)
        .bind(answer)
        .bind(&citations)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(CoreError::internal)?;

        tx.commit().await.map_err(CoreError::internal)?;
        Ok(result.last_insert_rowid())
    }

    /// The most recent `limit` turns, oldest first.
    pub async fn recent_turns(&self, session_id: &str, limit: usize) -> Result<Vec<ChatTurn>> {
        let rows = sqlx::query(
            "SELECT * FROM (
                 SELECT id, session_id, question, answer, cited_chunk_ids, created_at
                 FROM turns WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
             ) ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(limit.max(1) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(CoreError::internal)?;

        let mut turns = Vec::with_capacity(rows.len());
        for row in rows {
            let citations_raw: String = row.get("cited_chunk_ids");
            turns.push(ChatTurn {
                id: row.get("id"),
                session_id: row.get("session_id"),
                question: row.get("question"),
                answer: row.get("answer"),
                cited_chunk_ids: serde_json::from_str(&citations_raw).unwrap_or_default(),
                created_at: row.get("created_at"),
            });
        }
        Ok(turns)
    }
}
