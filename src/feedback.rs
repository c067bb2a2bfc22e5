//! Long-term feedback memory
//!
//! A flat vector index of past user feedback. Retrieval embeds the query and
//! returns the nearest record by L2 distance; persistence embeds the feedback
//! text and appends it. In production the index is mirrored to SQLite and
//! rebuilt from it on startup.

mod record;

pub use record::{FeedbackRecord, FeedbackType};

use crate::db::{Database, DbError};
use crate::llm::{EmbeddingService, LlmError};
use crate::state_machine::{Message, NO_FEEDBACK_FOUND};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedbackStoreError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("Storage failed: {0}")]
    Storage(#[from] DbError),
    #[error("Embedding has {got} dimensions, index uses {expected}")]
    DimensionMismatch { expected: usize, got: usize },
    #[error("Feedback store timed out after {0:?}")]
    TimedOut(Duration),
    #[error("Feedback index lock poisoned")]
    Poisoned,
}

/// Storage boundary for feedback records
#[async_trait]
pub trait FeedbackStore: Send + Sync {
    /// Up to `k` records nearest to `query`, closest first
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<FeedbackRecord>, FeedbackStoreError>;

    async fn add(&self, record: FeedbackRecord) -> Result<(), FeedbackStoreError>;
}

#[async_trait]
impl<T: FeedbackStore + ?Sized> FeedbackStore for Arc<T> {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<FeedbackRecord>, FeedbackStoreError> {
        (**self).similarity_search(query, k).await
    }

    async fn add(&self, record: FeedbackRecord) -> Result<(), FeedbackStoreError> {
        (**self).add(record).await
    }
}

struct IndexEntry {
    embedding: Vec<f32>,
    record: FeedbackRecord,
}

/// Flat L2 index over embedded feedback, optionally mirrored to SQLite
pub struct VectorFeedbackStore {
    embedder: Arc<dyn EmbeddingService>,
    index: Mutex<Vec<IndexEntry>>,
    db: Option<Database>,
}

impl VectorFeedbackStore {
    /// Process-local store; contents are lost on exit
    pub fn in_memory(embedder: Arc<dyn EmbeddingService>) -> Self {
        Self {
            embedder,
            index: Mutex::new(Vec::new()),
            db: None,
        }
    }

    /// Durable store; the in-memory index is rebuilt from the stored rows.
    ///
    /// The first row fixes the index dimension. Rows embedded with a
    /// different dimension stay in the table but are left out of the index.
    pub fn durable(
        embedder: Arc<dyn EmbeddingService>,
        db: Database,
    ) -> Result<Self, FeedbackStoreError> {
        let rows = db.list_feedback()?;
        let dimension = rows.first().map(|(_, embedding)| embedding.len());
        let mut index = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for (record, embedding) in rows {
            if Some(embedding.len()) == dimension {
                index.push(IndexEntry { embedding, record });
            } else {
                tracing::warn!(
                    feedback_id = %record.id,
                    dimensions = embedding.len(),
                    expected = ?dimension,
                    "Skipping stored feedback with mismatched embedding"
                );
                skipped += 1;
            }
        }
        tracing::info!(records = index.len(), skipped, "Feedback index rebuilt from database");
        Ok(Self {
            embedder,
            index: Mutex::new(index),
            db: Some(db),
        })
    }

    pub fn len(&self) -> usize {
        self.index.lock().map_or(0, |index| index.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl FeedbackStore for VectorFeedbackStore {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<FeedbackRecord>, FeedbackStoreError> {
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let index = self.index.lock().map_err(|_| FeedbackStoreError::Poisoned)?;
        let mut scored: Vec<(f32, &FeedbackRecord)> = Vec::with_capacity(index.len());
        let mut skipped = 0usize;
        for entry in index.iter() {
            if entry.embedding.len() == query_embedding.len() {
                scored.push((l2_distance(&query_embedding, &entry.embedding), &entry.record));
            } else {
                skipped += 1;
            }
        }
        if skipped > 0 {
            tracing::warn!(
                skipped,
                dimensions = query_embedding.len(),
                embedding_model = self.embedder.model(),
                "Query embedding dimension differs from indexed feedback"
            );
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn add(&self, record: FeedbackRecord) -> Result<(), FeedbackStoreError> {
        let embedding = self.embedder.embed(&record.text).await?;

        // Held across the insert so the dimension check and the write agree
        let mut index = self.index.lock().map_err(|_| FeedbackStoreError::Poisoned)?;
        if let Some(first) = index.first() {
            if first.embedding.len() != embedding.len() {
                return Err(FeedbackStoreError::DimensionMismatch {
                    expected: first.embedding.len(),
                    got: embedding.len(),
                });
            }
        }
        if let Some(db) = &self.db {
            db.insert_feedback(&record, &embedding)?;
        }
        tracing::debug!(
            embedding_model = self.embedder.model(),
            metadata = %record.metadata(),
            "Feedback indexed"
        );
        index.push(IndexEntry { embedding, record });
        Ok(())
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Retrieval and persistence policy on top of a [`FeedbackStore`].
///
/// Neither operation fails the conversation: retrieval falls back to the
/// "no feedback" sentinel and persistence failures are returned for the
/// caller to log.
#[derive(Clone)]
pub struct FeedbackMemory {
    store: Arc<dyn FeedbackStore>,
    timeout: Duration,
}

impl FeedbackMemory {
    pub fn new(store: Arc<dyn FeedbackStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Text of the single closest stored feedback, or the sentinel
    pub async fn retrieve(&self, query: &str) -> String {
        let search = self.store.similarity_search(query, 1);
        let result = match tokio::time::timeout(self.timeout, search).await {
            Ok(result) => result,
            Err(_) => Err(FeedbackStoreError::TimedOut(self.timeout)),
        };

        match result {
            Ok(records) => match records.into_iter().next() {
                Some(record) => {
                    tracing::debug!(feedback_id = %record.id, "Retrieved feedback");
                    record.text
                }
                None => {
                    tracing::debug!("No stored feedback matched");
                    NO_FEEDBACK_FOUND.to_string()
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Feedback retrieval failed, continuing without it");
                NO_FEEDBACK_FOUND.to_string()
            }
        }
    }

    /// Store `feedback`, tagging it with an excerpt of the rated recipe
    pub async fn persist(
        &self,
        feedback: &str,
        preceding: Option<&Message>,
    ) -> Result<FeedbackRecord, FeedbackStoreError> {
        let record = FeedbackRecord::new(feedback, preceding);
        let add = self.store.add(record.clone());
        match tokio::time::timeout(self.timeout, add).await {
            Ok(result) => result?,
            Err(_) => return Err(FeedbackStoreError::TimedOut(self.timeout)),
        }
        tracing::info!(
            feedback_id = %record.id,
            has_recipe_context = record.recipe_context.is_some(),
            "Feedback persisted"
        );
        Ok(record)
    }
}
