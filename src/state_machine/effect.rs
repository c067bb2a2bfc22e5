//! Effects produced by state transitions

use super::state::{Message, Prompt};
use std::time::Duration;

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Save the checkpoint for this thread
    PersistState,

    /// Ask the user for a line of input
    PromptUser(Prompt),

    /// Look up the stored feedback closest to `query`
    RetrieveFeedback { query: String },

    /// Call the response generator with the current history
    RequestModel,

    /// Write a feedback record to long-term memory
    PersistFeedback {
        feedback: String,
        preceding: Option<Message>,
    },

    /// Schedule a retry of the model call
    ScheduleRetry { delay: Duration, attempt: u32 },

    /// Show a failure to the user
    ReportError { message: String },
}

impl Effect {
    pub fn prompt(prompt: Prompt) -> Self {
        Effect::PromptUser(prompt)
    }

    pub fn retrieve_feedback(query: impl Into<String>) -> Self {
        Effect::RetrieveFeedback {
            query: query.into(),
        }
    }
}
