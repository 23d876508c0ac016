//! Decision Gate: explicit, bounded state machine.
//!
//! ```text
//! CLASSIFY -> DECOMPOSE -> RETRIEVE_AND_GENERATE -> EVALUATE -> { ACCEPT, RETRY, CLARIFY }
//!                                   ^                              |
//!                                   +------------ RETRY -----------+
//! ```
//!
//! `decide` is pure: it looks at one round's scores and the attempt counter
//! and never loops itself. The caller owns the loop; the counter guarantees
//! it ends in ACCEPT or CLARIFY after at most `max_attempts` rounds.

use crate::alignment::{AlignmentScore, Criterion, JudgeOutcome};
use crate::candidate::Strategy;
use crate::question::ComplexityVerdict;
use crate::topic::{TopicTag, TopicVocabulary};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classify,
    Decompose,
    RetrieveAndGenerate,
    Evaluate,
    Retry,
    Accept,
    Clarify,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accept | Self::Clarify)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Classify => "CLASSIFY",
            Self::Decompose => "DECOMPOSE",
            Self::RetrieveAndGenerate => "RETRIEVE_AND_GENERATE",
            Self::Evaluate => "EVALUATE",
            Self::Retry => "RETRY",
            Self::Accept => "ACCEPT",
            Self::Clarify => "CLARIFY",
        };
        write!(f, "{}", s)
    }
}

/// One generate/evaluate round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based round number
    pub attempt: u32,
    /// Strategies whose generation call failed or timed out
    pub failed_strategies: Vec<Strategy>,
    pub scores: Vec<AlignmentScore>,
    /// Context was narrowed to the expected entity for this round
    pub narrowed: bool,
}

impl AttemptRecord {
    /// No candidate came back, or a judge call for a candidate that passed
    /// every deterministic check did not complete.
    pub fn service_failure(&self) -> bool {
        self.scores.is_empty()
            || self
                .scores
                .iter()
                .any(|s| matches!(s.judge, JudgeOutcome::Unavailable))
    }

    /// Failing criteria across every candidate, in criterion order
    pub fn failing(&self) -> Vec<Criterion> {
        Criterion::ALL
            .iter()
            .copied()
            .filter(|c| self.scores.iter().any(|s| s.fails(*c)))
            .collect()
    }
}

/// Request-scoped state; never shared between requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub request_id: String,
    pub verdict: ComplexityVerdict,
    /// Rounds started so far
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub stage: Stage,
    pub history: Vec<AttemptRecord>,
}

impl PipelineState {
    pub fn new(request_id: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            request_id: request_id.into(),
            verdict: ComplexityVerdict::Ambiguous,
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
            stage: Stage::Classify,
            history: Vec::new(),
        }
    }

    pub fn transition(&mut self, stage: Stage) {
        if self.stage.is_terminal() {
            tracing::warn!("[{}] leaving terminal stage {}", self.request_id, self.stage);
        }
        tracing::debug!("[{}] {} -> {}", self.request_id, self.stage, stage);
        self.stage = stage;
    }

    /// Start a round; returns its 1-based number.
    pub fn begin_attempt(&mut self) -> u32 {
        self.attempt_count += 1;
        self.transition(Stage::RetrieveAndGenerate);
        self.attempt_count
    }

    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    pub fn record(&mut self, record: AttemptRecord) {
        self.history.push(record);
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.history.last()
    }
}

/// Feedback injected into the next round's prompts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryFeedback {
    pub failing: Vec<Criterion>,
    pub service_failure: bool,
    /// Entity topics the context is narrowed to (entity-type failure only)
    pub expected_entities: Vec<TopicTag>,
}

impl RetryFeedback {
    pub fn is_empty(&self) -> bool {
        self.failing.is_empty() && !self.service_failure
    }

    /// Prompt text for the `{feedback}` placeholder; empty on the first round.
    pub fn render(&self, vocab: &TopicVocabulary) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut lines = vec!["Previous answers were rejected:".to_string()];
        if self.service_failure {
            lines.push("- the previous attempt did not complete".to_string());
        }
        for criterion in &self.failing {
            lines.push(format!("- {}", criterion.description()));
        }
        if !self.expected_entities.is_empty() {
            let labels: Vec<String> = self.expected_entities.iter().map(|t| vocab.label(t)).collect();
            lines.push(format!("Answer about {} only.", labels.join(" or ")));
        }
        if self.failing.contains(&Criterion::NoUnverifiableClaims) {
            lines.push("Use only figures and identifiers that appear in the data.".to_string());
        }
        format!("\n{}\n", lines.join("\n"))
    }
}

/// Why the gate gave up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum ClarifyCause {
    Unverified { failing: Vec<Criterion> },
    ServiceUnavailable,
}

/// Gate output for one evaluated round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Index into the round's scores
    Accept { index: usize },
    Retry(RetryFeedback),
    Clarify(ClarifyCause),
}

/// Pick the preferred passing candidate, else retry or clarify.
pub fn decide(
    state: &PipelineState,
    record: &AttemptRecord,
    expected_entities: &[TopicTag],
) -> GateDecision {
    for strategy in Strategy::preference_for(state.verdict) {
        if let Some(index) = record
            .scores
            .iter()
            .position(|s| s.strategy == strategy && s.pass)
        {
            return GateDecision::Accept { index };
        }
    }

    let failing = record.failing();
    let service_failure = record.service_failure();

    if state.can_retry() {
        let expected_entities = if failing.contains(&Criterion::CorrectEntityType) {
            expected_entities.to_vec()
        } else {
            Vec::new()
        };
        return GateDecision::Retry(RetryFeedback {
            failing,
            service_failure,
            expected_entities,
        });
    }

    if service_failure {
        GateDecision::Clarify(ClarifyCause::ServiceUnavailable)
    } else {
        GateDecision::Clarify(ClarifyCause::Unverified { failing })
    }
}
