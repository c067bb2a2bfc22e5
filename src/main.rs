//! Recipe assistant - sourdough recipes that learn from your feedback
//!
//! An interactive terminal dialogue driven by a pure state machine. Feedback
//! given on a recipe is embedded and stored, then retrieved to personalize
//! later replies.

mod checkpoint;
mod cli;
mod config;
mod db;
mod feedback;
mod generator;
mod llm;
mod prompt;
mod runtime;
mod state_machine;

use clap::Parser;
use cli::{Args, StdioUserIo};
use config::{AppConfig, LogFormat};
use db::Database;
use feedback::{FeedbackMemory, FeedbackStore, VectorFeedbackStore};
use generator::LlmResponseGenerator;
use llm::{EmbeddingService, GeminiEmbeddingService, GeminiService, LoggingService};
use runtime::{select_checkpointer, DialogueRuntime, ProductionRuntime, RunOutcome};
use state_machine::DialogueContext;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env();
    let log_format = config
        .as_ref()
        .map_or(LogFormat::Text, |config| config.log_format);

    // Initialize logging; stdout belongs to the dialogue
    let (json, text) = match log_format {
        LogFormat::Json => (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            ),
            None,
        ),
        LogFormat::Text => (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        ),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recipe_assistant=info".into()),
        )
        .with(json)
        .with(text)
        .init();

    let mut config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    if let Some(thread_id) = args.thread_id {
        config = config.with_thread_id(thread_id);
    }

    tracing::info!(
        thread_id = %config.thread_id,
        environment = ?config.environment,
        model = %config.genai.model,
        "Starting application"
    );

    // Durable storage only in production
    let db = if config.environment.is_durable() {
        tracing::info!(path = %config.db_path.display(), "Opening database");
        Some(Database::open(&config.db_path)?)
    } else {
        None
    };

    let llm = Arc::new(LoggingService::new(Arc::new(GeminiService::new(
        &config.genai,
        config.request_timeout,
    )?)));
    let embedder: Arc<dyn EmbeddingService> = Arc::new(GeminiEmbeddingService::new(
        &config.genai,
        config.store_timeout,
    )?);

    let store: Arc<dyn FeedbackStore> = match &db {
        Some(db) => Arc::new(VectorFeedbackStore::durable(embedder, db.clone())?),
        None => Arc::new(VectorFeedbackStore::in_memory(embedder)),
    };

    let mut runtime: ProductionRuntime = DialogueRuntime::new(
        DialogueContext::new(config.thread_id.clone()),
        select_checkpointer(config.environment, db),
        LlmResponseGenerator::new(llm, config.request_timeout),
        FeedbackMemory::new(store, config.store_timeout),
        StdioUserIo::new(),
    );

    println!("Starting chat with Google Generative AI...");

    match runtime.run().await? {
        RunOutcome::Ended => tracing::info!("Conversation ended"),
        RunOutcome::InputClosed => {
            tracing::info!(thread_id = %config.thread_id, "Input closed, thread can be resumed");
        }
    }

    Ok(())
}
