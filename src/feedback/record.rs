//! Feedback records and the recipe-context policy

use crate::state_machine::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How much of the rated reply is kept alongside the feedback
pub const RECIPE_CONTEXT_CHARS: usize = 200;

/// Metadata type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    UserFeedback,
}

impl FeedbackType {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackType::UserFeedback => "user_feedback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user_feedback" => Some(FeedbackType::UserFeedback),
            _ => None,
        }
    }
}

/// A unit of user feedback kept in long-term memory. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub text: String,
    #[serde(rename = "type")]
    pub feedback_type: FeedbackType,
    pub timestamp: DateTime<Utc>,
    pub recipe_context: Option<String>,
}

impl FeedbackRecord {
    /// Build a record stamped with the current time
    pub fn new(text: impl Into<String>, preceding: Option<&Message>) -> Self {
        Self::at(text, preceding, Utc::now())
    }

    pub fn at(text: impl Into<String>, preceding: Option<&Message>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            feedback_type: FeedbackType::UserFeedback,
            timestamp,
            recipe_context: recipe_context(preceding),
        }
    }

    /// Metadata as exposed at the store boundary: type, ISO-8601 timestamp, context
    pub fn metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.feedback_type.as_str(),
            "timestamp": self.timestamp.to_rfc3339(),
            "recipe_context": self.recipe_context,
        })
    }
}

/// Excerpt of the rated message, kept only when it looks like a recipe.
pub fn recipe_context(preceding: Option<&Message>) -> Option<String> {
    let message = preceding?;
    if !message.content.to_lowercase().contains("recipe") {
        return None;
    }
    let excerpt: String = message.content.chars().take(RECIPE_CONTEXT_CHARS).collect();
    tracing::debug!(
        excerpt = %excerpt.chars().take(30).collect::<String>(),
        "Recipe context extracted"
    );
    Some(excerpt)
}
