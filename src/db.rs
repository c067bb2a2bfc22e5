//! Database module
//!
//! SQLite persistence for thread checkpoints and the feedback corpus.

mod schema;

pub use schema::*;

use crate::feedback::{FeedbackRecord, FeedbackType};
use crate::state_machine::{ConversationState, Node};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt row in {table}: {reason}")]
    Corrupt { table: &'static str, reason: String },
    #[error("Database lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn conn(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Checkpoint Operations ====================

    /// Insert or replace the checkpoint for a thread
    pub fn save_checkpoint(
        &self,
        thread_id: &str,
        node: &Node,
        state: &ConversationState,
    ) -> DbResult<()> {
        let node_json = serde_json::to_string(node)?;
        let state_json = serde_json::to_string(state)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO checkpoints (thread_id, node, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(thread_id) DO UPDATE SET
                node = excluded.node,
                state = excluded.state,
                updated_at = excluded.updated_at",
            params![thread_id, node_json, state_json, now],
        )?;
        Ok(())
    }

    /// Get the checkpoint for a thread, if one was ever saved
    pub fn load_checkpoint(&self, thread_id: &str) -> DbResult<Option<Checkpoint>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT thread_id, node, state, created_at, updated_at
                 FROM checkpoints WHERE thread_id = ?1",
                params![thread_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((thread_id, node_json, state_json, created_at, updated_at)) = row else {
            return Ok(None);
        };

        let node: Node = serde_json::from_str(&node_json).map_err(|e| DbError::Corrupt {
            table: "checkpoints",
            reason: format!("node: {e}"),
        })?;
        let state: ConversationState =
            serde_json::from_str(&state_json).map_err(|e| DbError::Corrupt {
                table: "checkpoints",
                reason: format!("state: {e}"),
            })?;

        Ok(Some(Checkpoint {
            thread_id,
            node,
            state,
            created_at: parse_datetime(&created_at),
            updated_at: parse_datetime(&updated_at),
        }))
    }

    // ==================== Feedback Operations ====================

    /// Append one feedback record with its embedding
    pub fn insert_feedback(&self, record: &FeedbackRecord, embedding: &[f32]) -> DbResult<()> {
        let embedding_json = serde_json::to_string(embedding)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO feedback (id, content, feedback_type, timestamp, recipe_context, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id,
                record.text,
                record.feedback_type.as_str(),
                record.timestamp.to_rfc3339(),
                record.recipe_context,
                embedding_json,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All feedback records in insertion order, with their embeddings
    pub fn list_feedback(&self) -> DbResult<Vec<(FeedbackRecord, Vec<f32>)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, feedback_type, timestamp, recipe_context, embedding
             FROM feedback ORDER BY rowid ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, text, feedback_type, timestamp, recipe_context, embedding) = row?;
            let feedback_type = FeedbackType::parse(&feedback_type).ok_or_else(|| {
                DbError::Corrupt {
                    table: "feedback",
                    reason: format!("unknown type {feedback_type:?}"),
                }
            })?;
            let embedding: Vec<f32> =
                serde_json::from_str(&embedding).map_err(|e| DbError::Corrupt {
                    table: "feedback",
                    reason: format!("embedding: {e}"),
                })?;
            records.push((
                FeedbackRecord {
                    id,
                    text,
                    feedback_type,
                    timestamp: parse_datetime(&timestamp),
                    recipe_context,
                },
                embedding,
            ));
        }
        Ok(records)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
