//! Pure state transition function
//!
//! Given the node a thread is parked on, its conversation state and an event,
//! produce the next node, the state delta to merge, and the effects the
//! runtime must execute. No I/O happens here.

use super::routing::{
    check_end_condition, check_feedback_decision, normalize_reply, EndDecision, FeedbackDecision,
};
use super::state::{ConversationState, DialogueContext, Message, Node, Prompt, StateDelta};
use super::{Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub next: Node,
    pub delta: StateDelta,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(next: Node) -> Self {
        Self {
            next,
            delta: StateDelta::none(),
            effects: vec![],
        }
    }

    pub fn with_delta(mut self, delta: StateDelta) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("Conversation has ended")]
    Ended,
    #[error("Not waiting for user input while in {0}")]
    NotAwaitingInput(&'static str),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
pub fn transition(
    node: &Node,
    state: &ConversationState,
    context: &DialogueContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (node, event) {
        // ============================================================
        // Terminal
        // ============================================================
        (Node::End, _) => Err(TransitionError::Ended),

        // ============================================================
        // Recipe request -> CheckEndCondition
        // ============================================================

        // Failed behaves like GetUserInput: the next request starts a new turn
        (Node::GetUserInput | Node::Failed { .. }, Event::UserInput { text }) => {
            let message = Message::user(text);
            match check_end_condition(Some(&message)) {
                EndDecision::End => Ok(TransitionResult::new(Node::End)
                    .with_delta(StateDelta::message(message))
                    .with_effect(Effect::PersistState)),
                EndDecision::Continue => {
                    let query = message.content.clone();
                    Ok(TransitionResult::new(Node::call_model())
                        .with_delta(StateDelta::message(message))
                        .with_effect(Effect::PersistState)
                        .with_effect(Effect::retrieve_feedback(query)))
                }
            }
        }

        // ============================================================
        // CallModel
        // ============================================================
        (Node::CallModel { attempt }, Event::FeedbackRetrieved { text }) => {
            Ok(TransitionResult::new(Node::CallModel { attempt: *attempt })
                .with_delta(StateDelta::retrieved_feedback(text))
                .with_effect(Effect::PersistState)
                .with_effect(Effect::RequestModel))
        }

        (Node::CallModel { .. }, Event::ModelResponse { text }) => {
            Ok(TransitionResult::new(Node::AskForFeedback)
                .with_delta(StateDelta::message(Message::assistant(text)))
                .with_effect(Effect::PersistState)
                .with_effect(Effect::prompt(Prompt::FeedbackDecision)))
        }

        // Retryable failure with attempts left -> back off and try again
        (Node::CallModel { attempt }, Event::ModelError { kind, .. })
            if kind.is_retryable() && *attempt < context.max_attempts =>
        {
            let next_attempt = attempt + 1;
            Ok(TransitionResult::new(Node::CallModel {
                attempt: next_attempt,
            })
            .with_effect(Effect::PersistState)
            .with_effect(Effect::ScheduleRetry {
                delay: context.retry_delay(next_attempt),
                attempt: next_attempt,
            }))
        }

        // Non-retryable or exhausted -> Failed, surface to the user
        (Node::CallModel { attempt }, Event::ModelError { message, kind }) => {
            let message = if kind.is_retryable() {
                format!("Failed after {attempt} attempts: {message}")
            } else {
                message
            };
            Ok(TransitionResult::new(Node::Failed {
                message: message.clone(),
            })
            .with_effect(Effect::PersistState)
            .with_effect(Effect::ReportError { message })
            .with_effect(Effect::prompt(Prompt::RecipeRequest)))
        }

        (Node::CallModel { attempt }, Event::RetryTimeout { attempt: retry_attempt })
            if *attempt == retry_attempt =>
        {
            Ok(TransitionResult::new(Node::CallModel { attempt: *attempt })
                .with_effect(Effect::RequestModel))
        }

        (Node::CallModel { .. }, Event::UserInput { .. }) => {
            Err(TransitionError::NotAwaitingInput(node.label()))
        }

        // ============================================================
        // AskForFeedback -> CheckFeedbackDecision
        // ============================================================
        (Node::AskForFeedback, Event::UserInput { text }) => {
            let reply = Message::user(normalize_reply(&text));
            match check_feedback_decision(Some(&reply)) {
                FeedbackDecision::Feedback => Ok(TransitionResult::new(Node::ProvideFeedback)
                    .with_delta(StateDelta::message(reply))
                    .with_effect(Effect::PersistState)
                    .with_effect(Effect::prompt(Prompt::FeedbackText))),
                FeedbackDecision::Continue => Ok(TransitionResult::new(Node::GetUserInput)
                    .with_delta(StateDelta::message(reply))
                    .with_effect(Effect::PersistState)
                    .with_effect(Effect::prompt(Prompt::RecipeRequest))),
            }
        }

        // ============================================================
        // ProvideFeedback -> CallModel
        // ============================================================

        // Persist before retrieving so the fresh feedback is the nearest match.
        // The yes/no reply sits between the recipe and the feedback, so the
        // context is the latest assistant message rather than the previous one.
        (Node::ProvideFeedback, Event::UserInput { text }) => {
            let preceding = state.last_assistant_message().cloned();
            Ok(TransitionResult::new(Node::call_model())
                .with_delta(StateDelta::message(Message::user(text.clone())))
                .with_effect(Effect::PersistState)
                .with_effect(Effect::PersistFeedback {
                    feedback: text.clone(),
                    preceding,
                })
                .with_effect(Effect::retrieve_feedback(text)))
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (node, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {} with event {}",
            node.label(),
            event.name()
        ))),
    }
}

/// Effects needed to (re)enter `node` when a runtime starts or resumes.
pub fn entry_effects(node: &Node, state: &ConversationState) -> Vec<Effect> {
    match node {
        Node::End => vec![],
        // Resuming mid-call: redo retrieval for the latest request
        Node::CallModel { .. } => {
            let query = state
                .last_user_message()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            vec![Effect::retrieve_feedback(query)]
        }
        other => Prompt::for_node(other)
            .map(Effect::prompt)
            .into_iter()
            .collect(),
    }
}
