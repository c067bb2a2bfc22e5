//! Dialogue state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions:
//! `transition` maps (node, state, event) to a new node, a state delta and a
//! list of effects, and the runtime performs the effects.

mod effect;
pub mod event;
pub mod routing;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{
    ConversationState, DialogueContext, Message, Node, Prompt, Role, NO_FEEDBACK_FOUND,
};
pub use transition::{entry_effects, transition};
