//! Terminal pipeline result.

use crate::candidate::Strategy;
use crate::clarify::ClarificationRequest;
use crate::question::ComplexityVerdict;
use serde::{Deserialize, Serialize};

/// Where an accepted answer came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceSummary {
    pub request_id: String,
    /// Source ids of the retained context fragments
    pub sources: Vec<String>,
    pub strategy: Strategy,
    /// Generation rounds used (1-based)
    pub attempts: u32,
    pub verdict: ComplexityVerdict,
}

/// What `ask` returns: an accepted answer or a clarification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerResult {
    Answer {
        text: String,
        provenance: ProvenanceSummary,
    },
    Clarification(ClarificationRequest),
}

impl AnswerResult {
    pub fn is_answer(&self) -> bool {
        matches!(self, Self::Answer { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Answer { text, .. } => Some(text),
            Self::Clarification(_) => None,
        }
    }

    pub fn provenance(&self) -> Option<&ProvenanceSummary> {
        match self {
            Self::Answer { provenance, .. } => Some(provenance),
            Self::Clarification(_) => None,
        }
    }

    pub fn clarification(&self) -> Option<&ClarificationRequest> {
        match self {
            Self::Clarification(req) => Some(req),
            Self::Answer { .. } => None,
        }
    }
}
