//! Events that can occur in a conversation

use crate::llm::LlmErrorKind;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    // User events
    /// One line typed by the user, already stripped of its line ending
    UserInput { text: String },

    // Feedback memory events
    FeedbackRetrieved { text: String },

    // Model events
    ModelResponse { text: String },
    ModelError {
        message: String,
        kind: LlmErrorKind,
    },
    RetryTimeout { attempt: u32 },
}

impl Event {
    pub fn user_input(text: impl Into<String>) -> Self {
        Event::UserInput { text: text.into() }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserInput { .. } => "user_input",
            Event::FeedbackRetrieved { .. } => "feedback_retrieved",
            Event::ModelResponse { .. } => "model_response",
            Event::ModelError { .. } => "model_error",
            Event::RetryTimeout { .. } => "retry_timeout",
        }
    }
}
