//! Question, complexity verdict and sub-question types.

use crate::text::{normalize, tokenize};
use crate::topic::TopicTag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable pipeline input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    raw: String,
    normalized: String,
    tokens: Vec<String>,
}

impl Question {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        let tokens = tokenize(&normalized);
        Self {
            raw,
            normalized,
            tokens,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercase, whitespace-collapsed form
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    /// Lowercase alphanumeric tokens of the normalized form
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_blank(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Complexity verdict attached to a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityVerdict {
    /// Single scalar/statistic about a clearly named entity
    Simple,
    /// Causal, comparative or multi-entity question
    Complex,
    /// No resolvable entity or metric
    Ambiguous,
}

impl fmt::Display for ComplexityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Simple => "simple",
            Self::Complex => "complex",
            Self::Ambiguous => "ambiguous",
        };
        write!(f, "{}", s)
    }
}

/// Sort direction for rank questions ("top 5", "bottom store").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankOrder {
    Descending,
    Ascending,
}

/// What kind of context a sub-question needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RetrievalFocus {
    /// Tabular or summary figures
    Facts,
    /// Root causes; prefers free-text insight documents
    Drivers,
    /// Ranked slice of a table
    Rank { order: RankOrder, limit: usize },
}

const DESCENDING_WORDS: &[&str] = &[
    "top", "best", "highest", "largest", "biggest", "leading", "strongest",
];
const ASCENDING_WORDS: &[&str] = &[
    "bottom", "worst", "lowest", "smallest", "weakest", "least",
];

impl RetrievalFocus {
    /// Detect a rank request in a token sequence; `top 5` keeps five rows.
    pub fn detect(tokens: &[String]) -> Self {
        for (i, tok) in tokens.iter().enumerate() {
            let order = if DESCENDING_WORDS.contains(&tok.as_str()) {
                RankOrder::Descending
            } else if ASCENDING_WORDS.contains(&tok.as_str()) {
                RankOrder::Ascending
            } else {
                continue;
            };

            let limit = tokens
                .get(i + 1)
                .and_then(|t| t.parse::<usize>().ok())
                .or_else(|| {
                    i.checked_sub(1)
                        .and_then(|p| tokens.get(p))
                        .and_then(|t| t.parse::<usize>().ok())
                })
                .filter(|n| *n > 0)
                .unwrap_or(1);

            return RetrievalFocus::Rank { order, limit };
        }
        RetrievalFocus::Facts
    }
}

/// Atomic question derived from the original during decomposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuestion {
    /// Position in the decomposition order
    pub index: usize,
    pub text: String,
    /// Topic tags used for retrieval routing (never empty)
    pub topics: Vec<TopicTag>,
    pub focus: RetrievalFocus,
}
