//! Terminal front end
//!
//! Prompts go to stdout, answers come from stdin one line at a time.

use crate::runtime::UserIo;
use crate::state_machine::Prompt;
use async_trait::async_trait;
use clap::Parser;
use std::io::Write;
use tokio::io::{stdin, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

#[derive(Debug, Parser)]
#[command(name = "recipe_assistant")]
#[command(about = "Sourdough recipes that learn from your feedback", long_about = None)]
pub struct Args {
    /// Conversation thread to start or resume [default: $RECIPE_THREAD_ID]
    pub thread_id: Option<String>,
}

pub struct StdioUserIo {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdioUserIo {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(stdin()).lines()),
        }
    }
}

impl Default for StdioUserIo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserIo for StdioUserIo {
    async fn read_line(&self, prompt: Prompt) -> Option<String> {
        {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "{}", prompt.text());
            let _ = stdout.flush();
        }

        // next_line strips both "\n" and "\r\n"
        match self.lines.lock().await.next_line().await {
            Ok(Some(line)) => Some(line),
            Ok(None) => {
                println!();
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read from stdin");
                None
            }
        }
    }

    fn show_transition(&self, label: &str, content: &str) {
        println!("{}", format_transition(label, content));
    }

    fn report_error(&self, message: &str) {
        println!("\nError: {message}");
    }
}

fn format_transition(label: &str, content: &str) -> String {
    format!("\nNode '{label}' executed:\n  Content: {content}")
}
