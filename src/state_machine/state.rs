//! Conversation state types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text returned by retrieval when the store has nothing relevant
pub const NO_FEEDBACK_FOUND: &str = "No relevant feedback found.";

// ============================================================================
// Messages
// ============================================================================

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// A single entry in the conversation history.
///
/// Position in [`ConversationState::messages`] is the ordering; messages are
/// never edited after they are appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// The record threaded through the dialogue graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Append-only history, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Last feedback text pulled from the feedback store
    #[serde(default)]
    pub retrieved_feedback: String,
}

impl ConversationState {
    /// Merge a transition's delta: messages append, feedback replaces.
    pub fn apply(&mut self, delta: StateDelta) {
        self.messages.extend(delta.messages);
        if let Some(feedback) = delta.retrieved_feedback {
            self.retrieved_feedback = feedback;
        }
    }

    /// Most recent user message, used as the retrieval query
    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.is_user())
    }

    /// Latest assistant reply, the recipe a piece of feedback is about
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }
}

/// Changes produced by a single transition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDelta {
    pub messages: Vec<Message>,
    pub retrieved_feedback: Option<String>,
}

impl StateDelta {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn message(message: Message) -> Self {
        Self {
            messages: vec![message],
            retrieved_feedback: None,
        }
    }

    pub fn retrieved_feedback(feedback: impl Into<String>) -> Self {
        Self {
            messages: vec![],
            retrieved_feedback: Some(feedback.into()),
        }
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.retrieved_feedback.is_none()
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// Position of a thread in the dialogue graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    /// Waiting for a recipe request
    #[default]
    GetUserInput,

    /// Retrieving feedback and generating a reply, with retry tracking
    CallModel { attempt: u32 },

    /// Waiting for the yes/no answer to "do you want to give feedback?"
    AskForFeedback,

    /// Waiting for free-text feedback on the last reply
    ProvideFeedback,

    /// Model call gave up; the next input starts a new turn
    Failed { message: String },

    /// Conversation finished
    End,
}

impl Node {
    /// Label shown to the user and used in logs
    pub fn label(&self) -> &'static str {
        match self {
            Node::GetUserInput => "get_user_input",
            Node::CallModel { .. } => "call_model",
            Node::AskForFeedback => "ask_user_for_feedback",
            Node::ProvideFeedback => "provide_feedback",
            Node::Failed { .. } => "failed",
            Node::End => "end",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::End)
    }

    pub fn call_model() -> Self {
        Node::CallModel { attempt: 1 }
    }
}

/// What the user is asked for when the machine needs input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prompt {
    RecipeRequest,
    FeedbackDecision,
    FeedbackText,
}

impl Prompt {
    pub fn text(self) -> &'static str {
        match self {
            Prompt::RecipeRequest => "Please provide your sourdough recipe request: ",
            Prompt::FeedbackDecision => "Do you want to provide feedback on the recipe? (yes/no): ",
            Prompt::FeedbackText => "Please provide your feedback on the recipe: ",
        }
    }

    /// Prompt to show for a node waiting on input
    pub fn for_node(node: &Node) -> Option<Self> {
        match node {
            Node::GetUserInput | Node::Failed { .. } => Some(Prompt::RecipeRequest),
            Node::AskForFeedback => Some(Prompt::FeedbackDecision),
            Node::ProvideFeedback => Some(Prompt::FeedbackText),
            Node::CallModel { .. } | Node::End => None,
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Default number of model attempts per turn
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Immutable per-thread configuration read by transitions
#[derive(Debug, Clone)]
pub struct DialogueContext {
    pub thread_id: String,
    pub max_attempts: u32,
    /// First retry delay; later retries double it
    pub retry_base_delay: Duration,
}

impl DialogueContext {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Backoff before `attempt`: base, 2x base, 4x base, ...
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        self.retry_base_delay * (1u32 << exponent)
    }
}
