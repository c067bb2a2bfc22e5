//! Recipe response generation
//!
//! Turns the conversation history plus retrieved feedback into the next
//! assistant message.

use crate::llm::{LlmError, LlmMessage, LlmRequest, LlmService, SystemContent};
use crate::prompt::build_system_prompt;
use crate::state_machine::Message;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TEMPERATURE: f32 = 0.7;

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(
        &self,
        history: &[Message],
        retrieved_feedback: &str,
    ) -> Result<Message, LlmError>;
}

#[async_trait]
impl<T: ResponseGenerator + ?Sized> ResponseGenerator for Arc<T> {
    async fn generate(
        &self,
        history: &[Message],
        retrieved_feedback: &str,
    ) -> Result<Message, LlmError> {
        (**self).generate(history, retrieved_feedback).await
    }
}

/// Generator backed by an [`LlmService`] with a per-request deadline
pub struct LlmResponseGenerator {
    llm: Arc<dyn LlmService>,
    request_timeout: Duration,
}

impl LlmResponseGenerator {
    pub fn new(llm: Arc<dyn LlmService>, request_timeout: Duration) -> Self {
        Self {
            llm,
            request_timeout,
        }
    }

    fn build_request(history: &[Message], retrieved_feedback: &str) -> LlmRequest {
        LlmRequest {
            system: vec![SystemContent::new(build_system_prompt(retrieved_feedback))],
            messages: history.iter().map(LlmMessage::from).collect(),
            max_tokens: None,
            temperature: Some(TEMPERATURE),
        }
    }
}

#[async_trait]
impl ResponseGenerator for LlmResponseGenerator {
    async fn generate(
        &self,
        history: &[Message],
        retrieved_feedback: &str,
    ) -> Result<Message, LlmError> {
        if history.is_empty() {
            return Err(LlmError::invalid_request(
                "Cannot generate a reply without any messages",
            ));
        }

        let request = Self::build_request(history, retrieved_feedback);
        let response = match timeout(self.request_timeout, self.llm.complete(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(LlmError::timed_out(self.request_timeout)),
        };

        Ok(Message::assistant(response.text))
    }
}
