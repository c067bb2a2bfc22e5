//! Routing decisions evaluated between nodes
//!
//! Both decisions are total: any input, including a missing message, maps to
//! a decision, with "continue" as the fallback.

use super::state::Message;

/// Inputs that end the conversation. Matched case-sensitively.
pub const END_COMMANDS: [&str; 4] = ["quit", "exit", "end", "no"];

/// Replies that opt in to giving feedback, after normalization
const FEEDBACK_ACCEPT: [&str; 2] = ["yes", "y"];

/// Outcome of `CheckEndCondition`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDecision {
    End,
    Continue,
}

impl EndDecision {
    pub fn label(self) -> &'static str {
        match self {
            EndDecision::End => "end",
            EndDecision::Continue => "continue",
        }
    }
}

/// Outcome of `CheckFeedbackDecision`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackDecision {
    Feedback,
    Continue,
}

impl FeedbackDecision {
    pub fn label(self) -> &'static str {
        match self {
            FeedbackDecision::Feedback => "feedback",
            FeedbackDecision::Continue => "continue",
        }
    }
}

/// Decide whether the just-appended message ends the conversation.
pub fn check_end_condition(last: Option<&Message>) -> EndDecision {
    let Some(message) = last.filter(|m| m.is_user()) else {
        tracing::warn!("No user message to check for end condition, defaulting to 'continue'");
        return EndDecision::Continue;
    };

    let decision = if END_COMMANDS.contains(&message.content.as_str()) {
        EndDecision::End
    } else {
        EndDecision::Continue
    };
    tracing::info!(
        input = %message.content,
        decision = decision.label(),
        "check_end_condition"
    );
    decision
}

/// Trim and lowercase a yes/no reply
pub fn normalize_reply(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Decide whether the user wants to give feedback on the last reply.
pub fn check_feedback_decision(reply: Option<&Message>) -> FeedbackDecision {
    let accepted = reply
        .filter(|m| m.is_user())
        .is_some_and(|m| FEEDBACK_ACCEPT.contains(&normalize_reply(&m.content).as_str()));

    let decision = if accepted {
        FeedbackDecision::Feedback
    } else {
        FeedbackDecision::Continue
    };
    tracing::info!(decision = decision.label(), "check_feedback_decision");
    decision
}
