//! Shared types and deterministic pipeline stages for Insight.
//!
//! Everything here is synchronous and side-effect free apart from registry
//! loading: classification, decomposition, retrieval, aggregation, claim
//! tracing, alignment checks and the decision gate.

pub mod aggregate;
pub mod alignment;
pub mod answer;
pub mod candidate;
pub mod claims;
pub mod clarify;
pub mod classifier;
pub mod decompose;
pub mod error;
pub mod gate;
pub mod prompt;
pub mod question;
pub mod registry;
pub mod retrieval;
pub mod text;
pub mod topic;

pub use aggregate::{aggregate, AggregatedContext, ContextFragment};
pub use alignment::{AlignmentScore, Criterion, DetailPolicy, JudgeOutcome};
pub use answer::{AnswerResult, ProvenanceSummary};
pub use candidate::{Candidate, Strategy};
pub use clarify::{ClarificationRequest, ClarifyCode, ClarifyReason};
pub use classifier::{classify, Classification};
pub use decompose::{decompose, Decomposition};
pub use error::{InsightError, Result};
pub use gate::{decide, GateDecision, PipelineState, RetryFeedback, Stage};
pub use prompt::PromptTemplates;
pub use question::{ComplexityVerdict, Question, RetrievalFocus, SubQuestion};
pub use registry::{Artifact, ArtifactContent, DataSourceRegistry};
pub use retrieval::{retrieve, RetrievalOptions, RetrievedContext};
pub use topic::{TopicDefinition, TopicTag, TopicVocabulary};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
