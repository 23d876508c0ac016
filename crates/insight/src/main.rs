//! Insight CLI - ask a business question against the artifact registry.

use anyhow::Result;
use clap::Parser;
use insight::{output, InsightConfig, OllamaService, Pipeline};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "insight")]
#[command(about = "Answer business questions from precomputed analytics artifacts", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: /etc/insight/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Registry directory containing registry.toml
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// The question
    #[arg(required = true)]
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => InsightConfig::load_from(path)?,
        None => InsightConfig::load(),
    };
    if let Some(registry) = cli.registry {
        config.registry.path = registry;
    }

    info!("Insight v{} starting", insight_shared::VERSION);
    let endpoint = config.inference.endpoint.clone();
    let pipeline = Pipeline::from_config(config)?;

    if !endpoint.trim().is_empty() && !OllamaService::new(endpoint.as_str())?.is_available().await {
        warn!("Inference endpoint {} is not answering", endpoint);
    }

    let question = cli.question.join(" ");
    let result = pipeline.ask(&question).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        output::display(&result);
    }

    Ok(())
}
