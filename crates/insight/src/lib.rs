//! Insight - validated business-question answering.
//!
//! Async half of the pipeline: configuration, the inference service,
//! candidate generation, alignment evaluation and the `ask` loop. The
//! deterministic stages live in `insight_shared`.

pub mod config;
pub mod evaluator;
pub mod generator;
pub mod inference;
pub mod output;
pub mod pipeline;

pub use config::InsightConfig;
pub use inference::{FakeInferenceService, InferenceError, InferenceService, OllamaService};
pub use pipeline::Pipeline;
