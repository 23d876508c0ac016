//! Configuration management for insight.
//!
//! Loads settings from /etc/insight/config.toml, falls back to
//! /var/lib/insight/config.toml, else uses defaults. Every field has a
//! default so partial files are valid; out-of-range values are clamped.

use anyhow::Result;
use insight_shared::alignment::DetailPolicy;
use insight_shared::retrieval::RetrievalOptions;
use insight_shared::PromptTemplates;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/insight/config.toml";

/// Fallback config file path
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/insight/config.toml";

/// Default registry directory
pub const DEFAULT_REGISTRY_PATH: &str = "/var/lib/insight/registry";

/// Upper bound for generate/evaluate rounds
pub const MAX_ATTEMPTS_CEILING: u32 = 10;

/// Inference service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Ollama-compatible base URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model generating candidate answers
    #[serde(default = "default_generator_model")]
    pub generator_model: String,

    /// Model judging candidates; a different model reduces correlated failure
    #[serde(default = "default_judge_model")]
    pub judge_model: String,

    /// Per-call generation timeout in milliseconds
    #[serde(default = "default_generator_timeout")]
    pub generator_timeout_ms: u64,

    /// Per-call judge timeout in milliseconds
    #[serde(default = "default_judge_timeout")]
    pub judge_timeout_ms: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_generator_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_judge_model() -> String {
    "qwen2.5:3b-instruct".to_string()
}

fn default_generator_timeout() -> u64 {
    30_000
}

fn default_judge_timeout() -> u64 {
    15_000
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            generator_model: default_generator_model(),
            judge_model: default_judge_model(),
            generator_timeout_ms: default_generator_timeout(),
            judge_timeout_ms: default_judge_timeout(),
        }
    }
}

impl InferenceConfig {
    pub fn generator_timeout(&self) -> Duration {
        Duration::from_millis(self.generator_timeout_ms)
    }

    pub fn judge_timeout(&self) -> Duration {
        Duration::from_millis(self.judge_timeout_ms)
    }
}

/// Retrieval, aggregation and retry limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Generate/evaluate rounds before clarifying (>= 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Artifacts retrieved per sub-question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Aggregated context budget in characters
    #[serde(default = "default_context_budget")]
    pub context_budget_chars: usize,

    /// Table rows kept for a non-rank extraction
    #[serde(default = "default_max_table_rows")]
    pub max_table_rows: usize,

    /// Document sections kept per artifact
    #[serde(default = "default_max_sections")]
    pub max_sections: usize,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_top_k() -> usize {
    2
}

fn default_context_budget() -> usize {
    6_000
}

fn default_max_table_rows() -> usize {
    60
}

fn default_max_sections() -> usize {
    1
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            top_k: default_top_k(),
            context_budget_chars: default_context_budget(),
            max_table_rows: default_max_table_rows(),
            max_sections: default_max_sections(),
        }
    }
}

impl PipelineConfig {
    pub fn retrieval_options(&self) -> RetrievalOptions {
        RetrievalOptions {
            top_k: self.top_k,
            max_table_rows: self.max_table_rows,
            max_sections: self.max_sections,
        }
    }
}

/// Alignment evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Ask the judge model; deterministic checks always run
    #[serde(default = "default_judge_enabled")]
    pub judge_enabled: bool,

    /// SIMPLE answers must not exceed this many words
    #[serde(default = "default_simple_max_words")]
    pub simple_max_words: usize,

    /// COMPLEX answers must reach this many words
    #[serde(default = "default_complex_min_words")]
    pub complex_min_words: usize,
}

fn default_judge_enabled() -> bool {
    true
}

fn default_simple_max_words() -> usize {
    40
}

fn default_complex_min_words() -> usize {
    20
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            judge_enabled: default_judge_enabled(),
            simple_max_words: default_simple_max_words(),
            complex_min_words: default_complex_min_words(),
        }
    }
}

impl EvaluationConfig {
    pub fn detail_policy(&self) -> DetailPolicy {
        DetailPolicy {
            simple_max_words: self.simple_max_words,
            complex_min_words: self.complex_min_words,
        }
    }
}

/// Registry location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

fn default_registry_path() -> PathBuf {
    PathBuf::from(DEFAULT_REGISTRY_PATH)
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub prompts: PromptTemplates,

    #[serde(default)]
    pub registry: RegistryConfig,
}

impl InsightConfig {
    /// Load config from the standard paths, or return defaults.
    pub fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH))
            .or_else(|_| Self::load_from(Path::new(DEFAULT_CONFIG_PATH)))
            .unwrap_or_else(|e| {
                warn!("Config not found, using defaults: {}", e);
                InsightConfig::default()
            })
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse and sanitize TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: InsightConfig = toml::from_str(content)?;
        config.sanitize();
        Ok(config)
    }

    /// Clamp out-of-range values.
    pub fn sanitize(&mut self) {
        let p = &mut self.pipeline;
        if p.max_attempts == 0 || p.max_attempts > MAX_ATTEMPTS_CEILING {
            let clamped = p.max_attempts.clamp(1, MAX_ATTEMPTS_CEILING);
            warn!("pipeline.max_attempts={} out of range, using {}", p.max_attempts, clamped);
            p.max_attempts = clamped;
        }
        if p.top_k == 0 {
            warn!("pipeline.top_k=0, using 1");
            p.top_k = 1;
        }
        if p.max_table_rows == 0 {
            warn!("pipeline.max_table_rows=0, using {}", default_max_table_rows());
            p.max_table_rows = default_max_table_rows();
        }
        if p.max_sections == 0 {
            warn!("pipeline.max_sections=0, using 1");
            p.max_sections = 1;
        }
        if p.context_budget_chars < insight_shared::aggregate::MIN_TRUNCATED_CHARS {
            warn!(
                "pipeline.context_budget_chars={} too small, using {}",
                p.context_budget_chars,
                default_context_budget()
            );
            p.context_budget_chars = default_context_budget();
        }

        let i = &mut self.inference;
        if i.generator_timeout_ms == 0 {
            warn!("inference.generator_timeout_ms=0, using {}", default_generator_timeout());
            i.generator_timeout_ms = default_generator_timeout();
        }
        if i.judge_timeout_ms == 0 {
            warn!("inference.judge_timeout_ms=0, using {}", default_judge_timeout());
            i.judge_timeout_ms = default_judge_timeout();
        }

        let e = &mut self.evaluation;
        if e.simple_max_words == 0 {
            warn!("evaluation.simple_max_words=0, using {}", default_simple_max_words());
            e.simple_max_words = default_simple_max_words();
        }
    }
}
