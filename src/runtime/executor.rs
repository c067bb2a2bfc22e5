//! Dialogue runtime executor

use super::traits::UserIo;
use super::{RunOutcome, RuntimeError};

use crate::checkpoint::Checkpointer;
use crate::feedback::FeedbackMemory;
use crate::generator::ResponseGenerator;
use crate::state_machine::{
    entry_effects, transition, ConversationState, DialogueContext, Effect, Event, Node,
};
use std::collections::VecDeque;
use std::time::Instant;

/// Runs one thread: resume from its checkpoint, then loop until the thread
/// ends or input closes.
pub struct DialogueRuntime<C, G, U>
where
    C: Checkpointer,
    G: ResponseGenerator,
    U: UserIo,
{
    context: DialogueContext,
    node: Node,
    state: ConversationState,
    checkpointer: C,
    generator: G,
    feedback: FeedbackMemory,
    io: U,
}

impl<C, G, U> DialogueRuntime<C, G, U>
where
    C: Checkpointer,
    G: ResponseGenerator,
    U: UserIo,
{
    pub fn new(
        context: DialogueContext,
        checkpointer: C,
        generator: G,
        feedback: FeedbackMemory,
        io: U,
    ) -> Self {
        Self {
            context,
            node: Node::default(),
            state: ConversationState::default(),
            checkpointer,
            generator,
            feedback,
            io,
        }
    }

    #[cfg(test)]
    pub fn node(&self) -> &Node {
        &self.node
    }

    #[cfg(test)]
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub async fn run(&mut self) -> Result<RunOutcome, RuntimeError> {
        let thread_id = self.context.thread_id.clone();

        match self.checkpointer.load(&thread_id).await? {
            Some(checkpoint) => {
                tracing::info!(
                    thread_id = %thread_id,
                    node = checkpoint.node.label(),
                    messages = checkpoint.state.messages.len(),
                    "Resuming thread from checkpoint"
                );
                self.node = checkpoint.node;
                self.state = checkpoint.state;
            }
            None => {
                tracing::info!(thread_id = %thread_id, "Starting new thread");
            }
        }

        if self.node.is_terminal() {
            tracing::info!(thread_id = %thread_id, "Thread already ended");
            return Ok(RunOutcome::Ended);
        }

        // FIFO so effects run in the order transitions list them
        let mut events = VecDeque::new();
        for effect in entry_effects(&self.node, &self.state) {
            if let Some(event) = self.execute_effect(effect).await {
                events.push_back(event);
            }
        }

        while let Some(event) = events.pop_front() {
            events.extend(self.process_event(event).await);
        }

        let outcome = if self.node.is_terminal() {
            RunOutcome::Ended
        } else {
            RunOutcome::InputClosed
        };
        tracing::info!(
            thread_id = %thread_id,
            node = self.node.label(),
            outcome = ?outcome,
            "Dialogue runtime stopped"
        );
        Ok(outcome)
    }

    async fn process_event(&mut self, event: Event) -> Vec<Event> {
        let event_name = event.name();

        // Pure state transition
        let result = match transition(&self.node, &self.state, &self.context, event) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    thread_id = %self.context.thread_id,
                    node = self.node.label(),
                    event = event_name,
                    error = %e,
                    "Dropping event"
                );
                return Vec::new();
            }
        };

        let executed = self.node.label();
        let shown = result.delta.messages.last().map(|m| m.content.clone());

        self.state.apply(result.delta);
        if self.node != result.next {
            tracing::debug!(
                thread_id = %self.context.thread_id,
                from = executed,
                to = result.next.label(),
                event = event_name,
                "Transition"
            );
        }
        self.node = result.next;

        if let Some(content) = shown {
            self.io.show_transition(executed, &content);
        }

        let mut generated = Vec::new();
        for effect in result.effects {
            if let Some(event) = self.execute_effect(effect).await {
                generated.push(event);
            }
        }
        generated
    }

    #[allow(clippy::too_many_lines)] // One arm per effect
    async fn execute_effect(&self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::PersistState => {
                if let Err(e) = self
                    .checkpointer
                    .save(&self.context.thread_id, &self.node, &self.state)
                    .await
                {
                    tracing::warn!(
                        thread_id = %self.context.thread_id,
                        error = %e,
                        "Failed to save checkpoint"
                    );
                }
                None
            }

            Effect::PromptUser(prompt) => match self.io.read_line(prompt).await {
                Some(text) => Some(Event::user_input(text)),
                None => {
                    tracing::info!(thread_id = %self.context.thread_id, "Input closed");
                    None
                }
            },

            Effect::RetrieveFeedback { query } => {
                let text = self.feedback.retrieve(&query).await;
                Some(Event::FeedbackRetrieved { text })
            }

            Effect::RequestModel => {
                let start = Instant::now();
                let result = self
                    .generator
                    .generate(&self.state.messages, &self.state.retrieved_feedback)
                    .await;
                let duration_ms = start.elapsed().as_millis();
                match result {
                    Ok(message) => {
                        tracing::debug!(
                            thread_id = %self.context.thread_id,
                            duration_ms = %duration_ms,
                            "Model replied"
                        );
                        Some(Event::ModelResponse {
                            text: message.content,
                        })
                    }
                    Err(e) => {
                        tracing::warn!(
                            thread_id = %self.context.thread_id,
                            duration_ms = %duration_ms,
                            error = %e.message,
                            retryable = e.kind.is_retryable(),
                            "Model call failed"
                        );
                        Some(Event::ModelError {
                            message: e.message,
                            kind: e.kind,
                        })
                    }
                }
            }

            Effect::PersistFeedback {
                feedback,
                preceding,
            } => {
                if let Err(e) = self.feedback.persist(&feedback, preceding.as_ref()).await {
                    tracing::warn!(
                        thread_id = %self.context.thread_id,
                        error = %e,
                        "Failed to persist feedback, continuing"
                    );
                }
                None
            }

            Effect::ScheduleRetry { delay, attempt } => {
                tracing::info!(
                    thread_id = %self.context.thread_id,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    "Retrying model call"
                );
                tokio::time::sleep(delay).await;
                Some(Event::RetryTimeout { attempt })
            }

            Effect::ReportError { message } => {
                tracing::error!(thread_id = %self.context.thread_id, error = %message, "Turn failed");
                self.io.report_error(&message);
                None
            }
        }
    }
}
