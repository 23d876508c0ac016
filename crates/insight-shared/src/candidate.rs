//! Generation strategies and candidate answers.

use crate::question::ComplexityVerdict;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How elaborate a candidate answer is asked to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Shortest possible answer, no elaboration
    Direct,
    /// Answer plus immediate supporting figures
    Contextual,
    /// Answer plus root-cause / driver discussion
    Comprehensive,
}

impl Strategy {
    /// Generation order; every round produces one candidate per strategy
    pub const ALL: [Strategy; 3] = [Strategy::Direct, Strategy::Contextual, Strategy::Comprehensive];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Contextual => "contextual",
            Self::Comprehensive => "comprehensive",
        }
    }

    /// Acceptance preference among passing candidates.
    pub fn preference_for(verdict: ComplexityVerdict) -> [Strategy; 3] {
        match verdict {
            ComplexityVerdict::Complex => {
                [Strategy::Comprehensive, Strategy::Contextual, Strategy::Direct]
            }
            ComplexityVerdict::Simple | ComplexityVerdict::Ambiguous => Self::ALL,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One generated answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub strategy: Strategy,
    pub text: String,
}

impl Candidate {
    pub fn new(strategy: Strategy, text: impl Into<String>) -> Self {
        Self {
            strategy,
            text: text.into().trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preference_simple_prefers_direct() {
        assert_eq!(Strategy::preference_for(ComplexityVerdict::Simple)[0], Strategy::Direct);
    }

    #[test]
    fn test_preference_complex_prefers_comprehensive() {
        assert_eq!(
            Strategy::preference_for(ComplexityVerdict::Complex)[0],
            Strategy::Comprehensive
        );
    }

    #[test]
    fn test_candidate_trims() {
        assert_eq!(Candidate::new(Strategy::Direct, "  50 stores\n").text, "50 stores");
    }
}
