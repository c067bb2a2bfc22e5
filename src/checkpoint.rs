//! Session checkpointing
//!
//! Saves the current node and conversation state per thread so a dialogue
//! can resume exactly where it stopped.

use crate::db::{Checkpoint, Database, DbError};
use crate::state_machine::{ConversationState, Node};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Checkpoint lock poisoned")]
    Poisoned,
}

/// Persistence boundary keyed by thread id
#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn save(
        &self,
        thread_id: &str,
        node: &Node,
        state: &ConversationState,
    ) -> Result<(), CheckpointError>;
}

#[async_trait]
impl<T: Checkpointer + ?Sized> Checkpointer for Arc<T> {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        (**self).load(thread_id).await
    }

    async fn save(
        &self,
        thread_id: &str,
        node: &Node,
        state: &ConversationState,
    ) -> Result<(), CheckpointError> {
        (**self).save(thread_id, node, state).await
    }
}

/// Process-local checkpoints
#[derive(Default)]
pub struct MemoryCheckpointer {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for MemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let checkpoints = self.checkpoints.lock().map_err(|_| CheckpointError::Poisoned)?;
        Ok(checkpoints.get(thread_id).cloned())
    }

    async fn save(
        &self,
        thread_id: &str,
        node: &Node,
        state: &ConversationState,
    ) -> Result<(), CheckpointError> {
        let now = Utc::now();
        let mut checkpoints = self.checkpoints.lock().map_err(|_| CheckpointError::Poisoned)?;
        checkpoints
            .entry(thread_id.to_string())
            .and_modify(|cp| {
                cp.node = node.clone();
                cp.state = state.clone();
                cp.updated_at = now;
            })
            .or_insert_with(|| Checkpoint {
                thread_id: thread_id.to_string(),
                node: node.clone(),
                state: state.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }
}

/// Durable checkpoints in the SQLite `checkpoints` table
pub struct SqliteCheckpointer {
    db: Database,
}

impl SqliteCheckpointer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn load(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.db.load_checkpoint(thread_id)?)
    }

    async fn save(
        &self,
        thread_id: &str,
        node: &Node,
        state: &ConversationState,
    ) -> Result<(), CheckpointError> {
        self.db.save_checkpoint(thread_id, node, state)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::Message;

    fn state_with_feedback() -> ConversationState {
        ConversationState {
            messages: vec![
                Message::user("sourdough with rye flour"),
                Message::assistant("Here's a sourdough recipe: rye"),
                Message::user("yes"),
            ],
            retrieved_feedback: "too chewy".to_string(),
        }
    }

    async fn assert_round_trip(checkpointer: &dyn Checkpointer) {
        assert!(checkpointer.load("thread-1").await.unwrap().is_none());

        checkpointer
            .save("thread-1", &Node::ProvideFeedback, &state_with_feedback())
            .await
            .unwrap();
        let loaded = checkpointer.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.node, Node::ProvideFeedback);
        assert_eq!(loaded.state, state_with_feedback());

        let failed = Node::Failed {
            message: "Failed after 3 attempts: Server error".to_string(),
        };
        checkpointer
            .save("thread-1", &failed, &ConversationState::default())
            .await
            .unwrap();
        let loaded = checkpointer.load("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.node, failed);
        assert!(loaded.state.messages.is_empty());

        assert!(checkpointer.load("thread-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        assert_round_trip(&MemoryCheckpointer::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_round_trip() {
        let db = Database::open_in_memory().unwrap();
        assert_round_trip(&SqliteCheckpointer::new(db)).await;
    }

    #[tokio::test]
    async fn test_memory_keeps_created_at() {
        let checkpointer = MemoryCheckpointer::new();
        checkpointer
            .save("t", &Node::GetUserInput, &ConversationState::default())
            .await
            .unwrap();
        let first = checkpointer.load("t").await.unwrap().unwrap();
        checkpointer
            .save("t", &Node::End, &ConversationState::default())
            .await
            .unwrap();
        let second = checkpointer.load("t").await.unwrap().unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.node, Node::End);
    }
}
