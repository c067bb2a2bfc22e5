//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::UserIo;
use crate::checkpoint::{CheckpointError, Checkpointer};
use crate::db::Checkpoint;
use crate::feedback::{FeedbackRecord, FeedbackStore, FeedbackStoreError};
use crate::generator::ResponseGenerator;
use crate::llm::{EmbeddingService, LlmError, LlmRequest, LlmResponse, LlmService};
use crate::state_machine::{ConversationState, Message, Node, Prompt};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock LLM Service
// ============================================================================

/// Mock LLM service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
    delay: Duration,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Sleep before answering, for timeout tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Mock Response Generator
// ============================================================================

/// One recorded call to [`MockGenerator`]
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub history: Vec<Message>,
    pub retrieved_feedback: String,
}

/// Generator returning queued replies and recording what it was shown
pub struct MockGenerator {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    calls: Mutex<Vec<GenerateCall>>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn queue_reply(&self, text: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Ok(Message::assistant(text)));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseGenerator for MockGenerator {
    async fn generate(
        &self,
        history: &[Message],
        retrieved_feedback: &str,
    ) -> Result<Message, LlmError> {
        self.calls.lock().unwrap().push(GenerateCall {
            history: history.to_vec(),
            retrieved_feedback: retrieved_feedback.to_string(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::invalid_request("No mock reply queued")))
    }
}

// ============================================================================
// Scripted User I/O
// ============================================================================

/// Feeds canned lines to the runtime and records everything shown
pub struct ScriptedIo {
    lines: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<Prompt>>,
    transitions: Mutex<Vec<(String, String)>>,
    errors: Mutex<Vec<String>>,
}

impl ScriptedIo {
    /// Input closes once `lines` is exhausted
    pub fn new<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            lines: Mutex::new(lines.into_iter().map(str::to_string).collect()),
            prompts: Mutex::new(Vec::new()),
            transitions: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Prompts that were answered or hit end of input, in order
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn transitions(&self) -> Vec<(String, String)> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserIo for ScriptedIo {
    async fn read_line(&self, prompt: Prompt) -> Option<String> {
        self.prompts.lock().unwrap().push(prompt);
        self.lines.lock().unwrap().pop_front()
    }

    fn show_transition(&self, label: &str, content: &str) {
        self.transitions
            .lock()
            .unwrap()
            .push((label.to_string(), content.to_string()));
    }

    fn report_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}

// ============================================================================
// Feedback Store Doubles
// ============================================================================

const HASH_DIMENSIONS: usize = 64;

/// Deterministic embedding: a histogram of characters folded into 64
/// buckets. Identical texts get identical vectors.
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingService for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut vector = vec![0.0f32; HASH_DIMENSIONS];
        for c in text.chars() {
            vector[c as usize % HASH_DIMENSIONS] += 1.0;
        }
        Ok(vector)
    }

    fn model(&self) -> &str {
        "hash"
    }
}

/// Store whose every call fails, as if the embedding API were down
pub struct FailingFeedbackStore;

#[async_trait]
impl FeedbackStore for FailingFeedbackStore {
    async fn similarity_search(
        &self,
        _query: &str,
        _k: usize,
    ) -> Result<Vec<FeedbackRecord>, FeedbackStoreError> {
        Err(LlmError::network("Connection failed: store offline").into())
    }

    async fn add(&self, _record: FeedbackRecord) -> Result<(), FeedbackStoreError> {
        Err(LlmError::network("Connection failed: store offline").into())
    }
}

// ============================================================================
// Checkpointer Doubles
// ============================================================================

/// Checkpointer that has nothing to load and fails every save
pub struct FailingCheckpointer;

#[async_trait]
impl Checkpointer for FailingCheckpointer {
    async fn load(&self, _thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(None)
    }

    async fn save(
        &self,
        _thread_id: &str,
        _node: &Node,
        _state: &ConversationState,
    ) -> Result<(), CheckpointError> {
        Err(CheckpointError::Poisoned)
    }
}
