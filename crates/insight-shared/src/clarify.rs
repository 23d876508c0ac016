//! Clarification requests.
//!
//! A clarification is the only non-answer the pipeline returns: a reason code,
//! human-readable reasons and 2-4 rephrasing suggestions drawn from what the
//! registry can actually answer.

use crate::alignment::Criterion;
use crate::classifier::Classification;
use crate::registry::{Artifact, ArtifactKind, DataSourceRegistry};
use crate::topic::TopicTag;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_SUGGESTIONS: usize = 2;
pub const MAX_SUGGESTIONS: usize = 4;

/// Why the pipeline is asking instead of answering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyCode {
    /// No resolvable entity or metric in the question
    AmbiguousQuestion,
    /// Every attempt produced only failing candidates
    UnverifiableAnswer,
    /// Inference service failed or timed out on the final attempt
    ServiceUnavailable,
}

impl ClarifyCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AmbiguousQuestion => "ambiguous_question",
            Self::UnverifiableAnswer => "unverifiable_answer",
            Self::ServiceUnavailable => "service_unavailable",
        }
    }
}

impl fmt::Display for ClarifyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reason behind a clarification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyReason {
    /// Criterion key, `missing_information` or `service_unavailable`
    pub kind: String,
    pub message: String,
}

impl ClarifyReason {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    fn for_criterion(criterion: Criterion, entity_labels: &[String]) -> Self {
        let message = match criterion {
            Criterion::CorrectEntityType if !entity_labels.is_empty() => format!(
                "entity type mismatch: answers were not about {}",
                entity_labels.join(" or ")
            ),
            Criterion::CorrectEntityType => "entity type mismatch".to_string(),
            other => other.description().to_string(),
        };
        Self::new(criterion.key(), message)
    }
}

/// Structured non-answer returned to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub code: ClarifyCode,
    /// The question as asked
    pub question: String,
    pub reasons: Vec<ClarifyReason>,
    /// 2-4 answerable rephrasings
    pub suggestions: Vec<String>,
}

impl ClarificationRequest {
    /// Question had nothing to route on.
    pub fn ambiguous(question: &str, missing: &[String], registry: &DataSourceRegistry) -> Self {
        let mut reasons: Vec<ClarifyReason> = missing
            .iter()
            .map(|m| ClarifyReason::new("missing_information", m.clone()))
            .collect();
        if reasons.is_empty() {
            reasons.push(ClarifyReason::new(
                "missing_information",
                "The question does not name an entity or metric the data covers.",
            ));
        }
        Self {
            code: ClarifyCode::AmbiguousQuestion,
            question: question.to_string(),
            reasons,
            suggestions: suggestions(registry, &[]),
        }
    }

    /// Attempts exhausted with failing candidates.
    pub fn unverified(
        question: &str,
        failing: &[Criterion],
        classification: &Classification,
        registry: &DataSourceRegistry,
    ) -> Self {
        let vocab = registry.vocabulary();
        let labels: Vec<String> = classification
            .entities
            .iter()
            .map(|e| vocab.label(e))
            .collect();
        let mut reasons: Vec<ClarifyReason> = Criterion::ALL
            .iter()
            .filter(|c| failing.contains(c))
            .map(|c| ClarifyReason::for_criterion(*c, &labels))
            .collect();
        if reasons.is_empty() {
            reasons.push(ClarifyReason::new(
                "unverifiable_answer",
                "no candidate answer could be verified against the data",
            ));
        }
        Self {
            code: ClarifyCode::UnverifiableAnswer,
            question: question.to_string(),
            reasons,
            suggestions: suggestions(registry, &classification.topics()),
        }
    }

    /// Inference service failed on the final attempt.
    pub fn service_unavailable(
        question: &str,
        attempts: u32,
        classification: &Classification,
        registry: &DataSourceRegistry,
    ) -> Self {
        Self {
            code: ClarifyCode::ServiceUnavailable,
            question: question.to_string(),
            reasons: vec![ClarifyReason::new(
                "service_unavailable",
                format!(
                    "the inference service did not respond after {} attempt{}",
                    attempts,
                    if attempts == 1 { "" } else { "s" }
                ),
            )],
            suggestions: suggestions(registry, &classification.topics()),
        }
    }
}

fn artifact_suggestion(artifact: &Artifact, registry: &DataSourceRegistry) -> String {
    if let Some(q) = &artifact.sample_question {
        return q.clone();
    }
    let title = artifact.title.to_lowercase();
    match (artifact.kind(), artifact.metric_column(&[])) {
        (ArtifactKind::Records, Some((metric, _))) => format!(
            "Show {} ranked by {}",
            title,
            registry.vocabulary().label(metric)
        ),
        (ArtifactKind::Document, _) => format!("What drives {}?", title),
        _ => format!("Summarize {}", title),
    }
}

fn push(out: &mut Vec<String>, suggestion: String) {
    if out.len() < MAX_SUGGESTIONS && !out.contains(&suggestion) {
        out.push(suggestion);
    }
}

/// 2-4 suggestions, artifacts matching `topics` first.
pub fn suggestions(registry: &DataSourceRegistry, topics: &[TopicTag]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    let (related, other): (Vec<&Artifact>, Vec<&Artifact>) = registry
        .artifacts()
        .iter()
        .partition(|a| a.topic_overlap(topics) > 0);
    for artifact in related.into_iter().chain(other) {
        push(&mut out, artifact_suggestion(artifact, registry));
    }

    let vocab = registry.vocabulary();
    for entity in vocab.entities() {
        if out.len() >= MIN_SUGGESTIONS {
            break;
        }
        let metric = entity
            .default_metric
            .as_ref()
            .map(|m| vocab.label(m))
            .or_else(|| vocab.metrics().next().map(|m| m.label.clone()));
        let s = match metric {
            Some(m) => format!("What is the total {} by {}?", m, entity.label),
            None => format!("How many {} records are there?", entity.label),
        };
        push(&mut out, s);
    }

    for fallback in [
        "Ask about a named entity and metric, for example a total or a top-N ranking.",
        "Ask why a metric changed to get a driver analysis.",
    ] {
        if out.len() >= MIN_SUGGESTIONS {
            break;
        }
        push(&mut out, fallback.to_string());
    }

    out
}
