//! Trait abstractions for runtime I/O
//!
//! The runtime talks to the terminal only through [`UserIo`], so the whole
//! dialogue can be driven by a script in tests.

use crate::state_machine::Prompt;
use async_trait::async_trait;
use std::sync::Arc;

/// Line-oriented conversation with the person at the keyboard
#[async_trait]
pub trait UserIo: Send + Sync {
    /// Show `prompt` and read one line without its line ending.
    /// `None` means input is closed.
    async fn read_line(&self, prompt: Prompt) -> Option<String>;

    /// Announce that a node ran and what it produced
    fn show_transition(&self, label: &str, content: &str);

    fn report_error(&self, message: &str);
}

#[async_trait]
impl<T: UserIo + ?Sized> UserIo for Arc<T> {
    async fn read_line(&self, prompt: Prompt) -> Option<String> {
        (**self).read_line(prompt).await
    }

    fn show_transition(&self, label: &str, content: &str) {
        (**self).show_transition(label, content);
    }

    fn report_error(&self, message: &str) {
        (**self).report_error(message);
    }
}
