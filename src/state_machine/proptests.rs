//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::routing::*;
use super::state::*;
use super::transition::*;
use super::*;
use crate::llm::LlmErrorKind;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> DialogueContext {
    DialogueContext::new("test-thread")
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_message() -> impl Strategy<Value = Message> {
    (any::<bool>(), "[a-zA-Z ]{0,40}").prop_map(|(user, text)| {
        if user {
            Message::user(text)
        } else {
            Message::assistant(text)
        }
    })
}

fn arb_conversation() -> impl Strategy<Value = ConversationState> {
    (
        proptest::collection::vec(arb_message(), 0..8),
        "[a-z ]{0,20}",
    )
        .prop_map(|(messages, retrieved_feedback)| ConversationState {
            messages,
            retrieved_feedback,
        })
}

fn arb_error_kind() -> impl Strategy<Value = LlmErrorKind> {
    prop_oneof![
        Just(LlmErrorKind::Network),
        Just(LlmErrorKind::RateLimit),
        Just(LlmErrorKind::ServerError),
        Just(LlmErrorKind::Auth),
        Just(LlmErrorKind::InvalidRequest),
        Just(LlmErrorKind::Unknown),
    ]
}

fn arb_node() -> impl Strategy<Value = Node> {
    prop_oneof![
        Just(Node::GetUserInput),
        (1u32..5).prop_map(|attempt| Node::CallModel { attempt }),
        Just(Node::AskForFeedback),
        Just(Node::ProvideFeedback),
        "[a-z ]{1,20}".prop_map(|message| Node::Failed { message }),
        Just(Node::End),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        ".{0,30}".prop_map(|text| Event::UserInput { text }),
        "[a-z ]{0,30}".prop_map(|text| Event::FeedbackRetrieved { text }),
        "[a-zA-Z ]{0,30}".prop_map(|text| Event::ModelResponse { text }),
        ("[a-z ]{0,20}", arb_error_kind())
            .prop_map(|(message, kind)| Event::ModelError { message, kind }),
        (1u32..5).prop_map(|attempt| Event::RetryTimeout { attempt }),
    ]
}

/// Anything but the exact end commands
fn arb_non_end_input() -> impl Strategy<Value = String> {
    ".{0,20}".prop_filter("must not be an end command", |s| {
        !END_COMMANDS.contains(&s.as_str())
    })
}

// ============================================================================
// Routing properties
// ============================================================================

proptest! {
    #[test]
    fn prop_non_end_input_continues(text in arb_non_end_input()) {
        prop_assert_eq!(
            check_end_condition(Some(&Message::user(text))),
            EndDecision::Continue
        );
    }

    #[test]
    fn prop_end_command_case_variants_continue(
        idx in 0usize..END_COMMANDS.len(),
        upper in proptest::collection::vec(any::<bool>(), 4),
    ) {
        let cmd = END_COMMANDS[idx];
        let variant: String = cmd
            .chars()
            .zip(upper.iter().cycle())
            .map(|(c, up)| if *up { c.to_ascii_uppercase() } else { c })
            .collect();
        let expected = if variant == cmd { EndDecision::End } else { EndDecision::Continue };
        prop_assert_eq!(check_end_condition(Some(&Message::user(variant))), expected);
    }

    #[test]
    fn prop_feedback_decision_matches_normalized_yes(text in ".{0,12}") {
        let normalized = text.trim().to_lowercase();
        let expected = if normalized == "yes" || normalized == "y" {
            FeedbackDecision::Feedback
        } else {
            FeedbackDecision::Continue
        };
        prop_assert_eq!(check_feedback_decision(Some(&Message::user(text))), expected);
    }

    #[test]
    fn prop_padded_yes_requests_feedback(
        word in prop_oneof![Just("yes"), Just("y"), Just("YES"), Just("Y"), Just("yEs")],
        left in "[ \t]{0,3}",
        right in "[ \t]{0,3}",
    ) {
        let reply = format!("{left}{word}{right}");
        prop_assert_eq!(
            check_feedback_decision(Some(&Message::user(reply))),
            FeedbackDecision::Feedback
        );
    }
}

// ============================================================================
// Transition properties
// ============================================================================

proptest! {
    /// The transition function is total: it returns, never panics
    #[test]
    fn prop_transition_never_panics(
        node in arb_node(),
        state in arb_conversation(),
        event in arb_event(),
    ) {
        let _ = transition(&node, &state, &test_context(), event);
    }

    /// Deltas only ever append, and at most one message per transition
    #[test]
    fn prop_deltas_append_at_most_one_message(
        node in arb_node(),
        state in arb_conversation(),
        event in arb_event(),
    ) {
        if let Ok(result) = transition(&node, &state, &test_context(), event) {
            prop_assert!(result.delta.messages.len() <= 1);
            let mut merged = state.clone();
            merged.apply(result.delta);
            prop_assert!(merged.messages.starts_with(&state.messages));
        }
    }

    /// Every transition that changes the state asks for a checkpoint first
    #[test]
    fn prop_state_changes_are_persisted(
        node in arb_node(),
        state in arb_conversation(),
        event in arb_event(),
    ) {
        if let Ok(result) = transition(&node, &state, &test_context(), event) {
            if !result.delta.is_empty() || result.next != node {
                prop_assert_eq!(result.effects.first(), Some(&Effect::PersistState));
            }
        }
    }

    /// End is absorbing
    #[test]
    fn prop_end_rejects_all_events(state in arb_conversation(), event in arb_event()) {
        prop_assert_eq!(
            transition(&Node::End, &state, &test_context(), event).unwrap_err(),
            TransitionError::Ended
        );
    }

    /// Retries never exceed the attempt budget
    #[test]
    fn prop_retry_attempts_bounded(
        attempt in 1u32..6,
        kind in arb_error_kind(),
        message in "[a-z]{0,10}",
    ) {
        let ctx = test_context();
        let result = transition(
            &Node::CallModel { attempt },
            &ConversationState::default(),
            &ctx,
            Event::ModelError { message, kind },
        ).unwrap();
        match result.next {
            Node::CallModel { attempt: next } => {
                prop_assert!(kind.is_retryable());
                prop_assert!(next <= ctx.max_attempts);
                prop_assert_eq!(next, attempt + 1);
            }
            Node::Failed { .. } => {
                prop_assert!(!kind.is_retryable() || attempt >= ctx.max_attempts);
            }
            other => prop_assert!(false, "unexpected node {:?}", other),
        }
    }

    /// Any non-end request from an input node moves to CallModel with a retrieval
    #[test]
    fn prop_request_triggers_retrieval(text in arb_non_end_input()) {
        let result = transition(
            &Node::GetUserInput,
            &ConversationState::default(),
            &test_context(),
            Event::UserInput { text: text.clone() },
        ).unwrap();
        prop_assert_eq!(result.next, Node::call_model());
        prop_assert!(result.effects.contains(&Effect::retrieve_feedback(text)));
    }
}
