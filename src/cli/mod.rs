//! `promptsmith` binary entrypoint: a local/manual driver over the
//! orchestrator, not the HTTP edge service spec §1 names out of scope.
//!
//! Grounded on the teacher's `clap`-derived `Cli`/`Commands` shape in
//! `src/cli/commands.rs`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::cache::InProcessCacheClient;
use crate::classifier::IntentClassifier;
use crate::config::Config;
use crate::errors::PromptsmithResult;
use crate::inference::{CircuitBreakerClient, HttpInferenceClient, InferenceClient, RetryingClient};
use crate::orchestrator::{BatchRequest, EnhanceRequest, Orchestrator};
use crate::persistence::SqliteHistoryStore;
use crate::techniques::{all_techniques, TechniqueRegistry};

#[derive(Parser, Debug)]
#[command(name = "promptsmith", version, about = "Prompt-enhancement dispatch core")]
pub struct Cli {
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a single prompt through the enhancement pipeline.
    Enhance {
        #[arg(long)]
        text: String,
        #[arg(long = "technique")]
        techniques: Vec<String>,
        #[arg(long)]
        target_model: Option<String>,
        #[arg(long)]
        max_tokens: Option<usize>,
    },
    /// Run a batch of requests loaded from a JSON file.
    Batch {
        #[arg(long)]
        file: PathBuf,
    },
}

pub async fn run() -> PromptsmithResult<()> {
    let cli = Cli::parse();
    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    let orchestrator = build_orchestrator(&config).await?;
    orchestrator.init();

    let output = match cli.command {
        Commands::Enhance { text, techniques, target_model, max_tokens } => {
            let request = EnhanceRequest {
                text,
                intent: None,
                complexity: None,
                techniques,
                context: Default::default(),
                parameters: Default::default(),
                target_model,
                max_tokens,
                temperature: None,
            };
            let response = orchestrator.enhance(request, &CancellationToken::new()).await?;
            serde_json::to_string_pretty(&response)
        }
        Commands::Batch { file } => {
            let text = fs::read_to_string(&file)
                .map_err(|e| crate::errors::PromptsmithError::Validation(format!("cannot read {}: {e}", file.display())))?;
            let batch: BatchRequest = serde_json::from_str(&text)
                .map_err(|e| crate::errors::PromptsmithError::Validation(format!("invalid batch file: {e}")))?;
            let responses = orchestrator.enhance_batch(batch, &CancellationToken::new()).await?;
            serde_json::to_string_pretty(&responses.into_iter().map(|r| r.map_err(|e| e.to_string())).collect::<Vec<_>>())
        }
    }
    .map_err(|e| crate::errors::PromptsmithError::Internal(anyhow::anyhow!("cannot encode response: {e}")))?;

    println!("{output}");
    orchestrator.shutdown().await;
    Ok(())
}

async fn build_orchestrator(config: &Config) -> PromptsmithResult<Arc<Orchestrator>> {
    let cache: Arc<dyn crate::cache::CacheClient> = Arc::new(InProcessCacheClient::new(&config.cache));

    let inference: Option<Arc<dyn InferenceClient>> = if config.inference.base_url.is_empty() {
        None
    } else {
        let http = HttpInferenceClient::new(&config.inference)?;
        let retrying = RetryingClient::new(http, &config.inference);
        let breaker = CircuitBreakerClient::new(retrying, &config.inference);
        Some(Arc::new(breaker))
    };

    let classifier = Arc::new(IntentClassifier::new(config.classifier.clone(), cache.clone(), inference));

    let registry = Arc::new(TechniqueRegistry::new());
    for technique in all_techniques() {
        registry.register(technique).ok();
    }

    let history_store = SqliteHistoryStore::open(&config.persistence)?;
    history_store.migrate().await?;
    let history: Arc<dyn crate::persistence::HistoryStore> = Arc::new(history_store);

    Ok(Arc::new(Orchestrator::new(
        cache,
        classifier,
        registry,
        history,
        config.orchestrator.clone(),
        config.engine.default_max_tokens,
        config.engine.max_tokens_ceiling,
    )))
}
