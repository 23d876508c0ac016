//! Query Classifier: SIMPLE / COMPLEX / AMBIGUOUS.
//!
//! Pure function over the question and the registry vocabulary. Conservative:
//! a question with zero vocabulary matches is AMBIGUOUS, never guessed.

use crate::question::{ComplexityVerdict, Question};
use crate::topic::{TopicKind, TopicTag, TopicVocabulary};
use serde::{Deserialize, Serialize};

const CAUSAL_WORDS: &[&str] = &[
    "why", "cause", "causes", "caused", "driver", "drivers", "drive", "drives", "drove",
    "reason", "reasons", "explain", "impact", "impacts", "impacted", "affect", "affects",
    "affected", "because",
];

const COMPARISON_WORDS: &[&str] = &[
    "compare", "compared", "comparing", "comparison", "vs", "versus", "difference",
    "differences", "between", "against",
];

/// Words after "how" that keep a question descriptive ("how many", "how much")
const HOW_QUANTITY: &[&str] = &["many", "much"];

/// Signal that made a question compound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityCue {
    /// why / cause / driver framing
    Causal,
    /// "how does ..." rather than "how many ..."
    HowFraming,
    /// compare / vs / between
    Comparison,
    /// Two or more entity types named
    MultiEntity,
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub verdict: ComplexityVerdict,
    /// Entity topics in question order
    pub entities: Vec<TopicTag>,
    /// Metric topics in question order
    pub metrics: Vec<TopicTag>,
    pub cues: Vec<ComplexityCue>,
    /// Missing-information prompts (AMBIGUOUS only)
    pub missing: Vec<String>,
}

impl Classification {
    /// Entities followed by metrics
    pub fn topics(&self) -> Vec<TopicTag> {
        self.entities.iter().chain(self.metrics.iter()).cloned().collect()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.verdict == ComplexityVerdict::Ambiguous
    }

    pub fn has_cue(&self, cue: ComplexityCue) -> bool {
        self.cues.contains(&cue)
    }

    /// Downgrade to AMBIGUOUS after a failed decomposition.
    pub fn into_ambiguous(mut self, missing: Vec<String>) -> Self {
        self.verdict = ComplexityVerdict::Ambiguous;
        self.missing = missing;
        self
    }
}

fn push_unique(list: &mut Vec<TopicTag>, tag: &TopicTag) {
    if !list.contains(tag) {
        list.push(tag.clone());
    }
}

fn detect_cues(tokens: &[String]) -> Vec<ComplexityCue> {
    let mut cues = Vec::new();
    if tokens.iter().any(|t| CAUSAL_WORDS.contains(&t.as_str())) {
        cues.push(ComplexityCue::Causal);
    }
    let how_framing = tokens.iter().enumerate().any(|(i, t)| {
        t == "how"
            && tokens
                .get(i + 1)
                .map(|next| !HOW_QUANTITY.contains(&next.as_str()))
                .unwrap_or(false)
    });
    if how_framing {
        cues.push(ComplexityCue::HowFraming);
    }
    if tokens.iter().any(|t| COMPARISON_WORDS.contains(&t.as_str())) {
        cues.push(ComplexityCue::Comparison);
    }
    cues
}

/// Prompts describing what an ambiguous question is missing.
pub fn missing_information(
    vocab: &TopicVocabulary,
    has_entity: bool,
    has_metric: bool,
    cues: &[ComplexityCue],
) -> Vec<String> {
    let mut missing = Vec::new();
    if !has_entity {
        let labels: Vec<String> = vocab.entities().map(|t| t.label.clone()).collect();
        if labels.is_empty() {
            missing.push("Which business entity is the question about?".to_string());
        } else {
            missing.push(format!(
                "Which entity is the question about? Known entities: {}.",
                labels.join(", ")
            ));
        }
    }
    if !has_metric {
        let labels: Vec<String> = vocab.metrics().map(|t| t.label.clone()).collect();
        if !labels.is_empty() {
            missing.push(format!(
                "Which metric should be reported? Known metrics: {}.",
                labels.join(", ")
            ));
        }
    }
    if cues.contains(&ComplexityCue::Comparison) {
        missing.push("What should be compared? Name both sides of the comparison.".to_string());
    }
    missing
}

/// Classify a question against the registry vocabulary.
pub fn classify(question: &Question, vocab: &TopicVocabulary) -> Classification {
    let matches = vocab.match_tokens(question.tokens());
    let mut entities = Vec::new();
    let mut metrics = Vec::new();
    for m in &matches {
        match m.kind {
            TopicKind::Entity => push_unique(&mut entities, &m.tag),
            TopicKind::Metric => push_unique(&mut metrics, &m.tag),
        }
    }

    let mut cues = detect_cues(question.tokens());

    if entities.is_empty() && metrics.is_empty() {
        let mut missing = missing_information(vocab, false, false, &cues);
        if question.is_blank() {
            missing.insert(0, "The question is empty.".to_string());
        }
        return Classification {
            verdict: ComplexityVerdict::Ambiguous,
            entities,
            metrics,
            cues,
            missing,
        };
    }

    if entities.len() >= 2 {
        cues.push(ComplexityCue::MultiEntity);
    }

    let verdict = if cues.is_empty() {
        ComplexityVerdict::Simple
    } else {
        ComplexityVerdict::Complex
    };

    Classification {
        verdict,
        entities,
        metrics,
        cues,
        missing: Vec::new(),
    }
}
