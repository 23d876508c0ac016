//! Query Decomposer: COMPLEX question -> ordered atomic sub-questions.
//!
//! Each sub-question is bound to at least one topic tag that some registry
//! artifact carries. When nothing binds, the question is handed back as
//! AMBIGUOUS so the gate can ask for clarification instead of guessing.
//!
//! # Rules
//!
//! - Comparison: one sub-question per operand of the connective
//!   (`vs`, `versus`, `against`, `and`, `or`, `compared to`, `compared with`)
//! - Multi-entity: one sub-question per entity topic
//! - Causal or "how" framing: a facts sub-question, then a drivers one
//! - SIMPLE: identity decomposition

use crate::classifier::{Classification, ComplexityCue};
use crate::question::{ComplexityVerdict, Question, RetrievalFocus, SubQuestion};
use crate::registry::DataSourceRegistry;
use crate::topic::{TopicKind, TopicTag, TopicVocabulary};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Leading words dropped before splitting comparison operands
const LEADING_FILLER: &[&str] = &[
    "compare", "comparing", "comparison", "of", "the", "what", "whats", "is", "are", "was",
    "difference", "differences", "between", "show", "me", "please",
];

const CONNECTIVES: &[&str] = &["vs", "versus", "against", "and", "or"];

/// Decomposer output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decomposition {
    SubQuestions { items: Vec<SubQuestion> },
    /// Nothing bound to a known topic; route to clarification
    Ambiguous { missing: Vec<String> },
}

impl Decomposition {
    pub fn sub_questions(&self) -> &[SubQuestion] {
        match self {
            Self::SubQuestions { items } => items,
            Self::Ambiguous { .. } => &[],
        }
    }
}

/// Draft before binding against the registry
struct Draft {
    text: String,
    topics: Vec<TopicTag>,
    focus: RetrievalFocus,
}

/// Decompose a classified question.
pub fn decompose(
    question: &Question,
    classification: &Classification,
    registry: &DataSourceRegistry,
) -> Decomposition {
    let drafts = match classification.verdict {
        ComplexityVerdict::Ambiguous => {
            return Decomposition::Ambiguous {
                missing: classification.missing.clone(),
            }
        }
        ComplexityVerdict::Simple => vec![Draft {
            text: question.raw().trim().to_string(),
            topics: classification.topics(),
            focus: RetrievalFocus::detect(question.tokens()),
        }],
        ComplexityVerdict::Complex => complex_drafts(question, classification, registry.vocabulary()),
    };

    bind(drafts, classification, registry)
}

fn bind(
    drafts: Vec<Draft>,
    classification: &Classification,
    registry: &DataSourceRegistry,
) -> Decomposition {
    let mut items = Vec::new();
    for draft in drafts {
        let topics: Vec<TopicTag> = draft
            .topics
            .into_iter()
            .filter(|t| registry.has_topic(t))
            .collect();
        if topics.is_empty() {
            debug!("Decomposer: '{}' binds to no artifact topic, dropped", draft.text);
            continue;
        }
        items.push(SubQuestion {
            index: items.len(),
            text: draft.text,
            topics,
            focus: draft.focus,
        });
    }

    if items.is_empty() {
        return Decomposition::Ambiguous {
            missing: unbound_prompts(classification, registry),
        };
    }
    Decomposition::SubQuestions { items }
}

fn unbound_prompts(classification: &Classification, registry: &DataSourceRegistry) -> Vec<String> {
    let vocab = registry.vocabulary();
    let asked: Vec<String> = classification
        .topics()
        .iter()
        .map(|t| vocab.label(t))
        .collect();
    let covered: Vec<String> = vocab
        .topics()
        .iter()
        .filter(|t| registry.has_topic(&t.tag))
        .map(|t| t.label.clone())
        .collect();

    let mut missing = Vec::new();
    if asked.is_empty() {
        missing.push("Which entity or metric is the question about?".to_string());
    } else {
        missing.push(format!("No data source covers {}.", asked.join(", ")));
    }
    if !covered.is_empty() {
        missing.push(format!("Ask about one of: {}.", covered.join(", ")));
    }
    missing
}

/// Metric a sub-question reports: the question's own, else the entity default
fn metric_for(classification: &Classification, vocab: &TopicVocabulary) -> Option<TopicTag> {
    if let Some(m) = classification.metrics.first() {
        return Some(m.clone());
    }
    classification
        .entities
        .iter()
        .find_map(|e| vocab.get(e).and_then(|d| d.default_metric.clone()))
}

fn complex_drafts(
    question: &Question,
    classification: &Classification,
    vocab: &TopicVocabulary,
) -> Vec<Draft> {
    let metric = metric_for(classification, vocab);
    let causal = classification.has_cue(ComplexityCue::Causal)
        || classification.has_cue(ComplexityCue::HowFraming);

    let mut drafts = Vec::new();

    if classification.has_cue(ComplexityCue::Comparison) {
        let operands = comparison_operands(question.tokens());
        if operands.len() >= 2 {
            for operand in operands {
                drafts.push(operand_draft(&operand, classification, metric.as_ref(), vocab));
            }
        }
    }

    if drafts.is_empty() && classification.entities.len() >= 2 {
        for entity in &classification.entities {
            let mut topics = vec![entity.clone()];
            let text = match &metric {
                Some(m) => {
                    topics.push(m.clone());
                    format!("identify {} by {}", vocab.label(m), vocab.label(entity))
                }
                None => format!("identify {} figures", vocab.label(entity)),
            };
            drafts.push(Draft {
                text,
                topics,
                focus: RetrievalFocus::detect(question.tokens()),
            });
        }
    }

    let subject = subject_phrase(classification, metric.as_ref(), vocab);
    let mut topics = classification.topics();
    if let Some(m) = &metric {
        if !topics.contains(m) {
            topics.push(m.clone());
        }
    }

    if drafts.is_empty() {
        drafts.push(Draft {
            text: format!("identify {}", subject),
            topics: topics.clone(),
            focus: RetrievalFocus::detect(question.tokens()),
        });
    }

    if causal {
        drafts.push(Draft {
            text: format!("explain drivers of {}", subject),
            topics,
            focus: RetrievalFocus::Drivers,
        });
    }

    drafts
}

fn subject_phrase(
    classification: &Classification,
    metric: Option<&TopicTag>,
    vocab: &TopicVocabulary,
) -> String {
    let entities: Vec<String> = classification
        .entities
        .iter()
        .map(|e| vocab.label(e))
        .collect();
    match (metric, entities.is_empty()) {
        (Some(m), false) => format!("{} by {}", vocab.label(m), entities.join(" and ")),
        (Some(m), true) => vocab.label(m),
        (None, _) => entities.join(" and "),
    }
}

/// Split comparison tokens into operand token runs.
fn comparison_operands(tokens: &[String]) -> Vec<Vec<String>> {
    let start = tokens
        .iter()
        .position(|t| !LEADING_FILLER.contains(&t.as_str()))
        .unwrap_or(tokens.len());

    let mut operands = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut i = start;
    while i < tokens.len() {
        let tok = tokens[i].as_str();
        let compared_phrase = tok == "compared"
            && matches!(tokens.get(i + 1).map(String::as_str), Some("to") | Some("with"));
        if CONNECTIVES.contains(&tok) || compared_phrase {
            if !current.is_empty() {
                operands.push(std::mem::take(&mut current));
            }
            i += if compared_phrase { 2 } else { 1 };
            continue;
        }
        current.push(tokens[i].clone());
        i += 1;
    }
    if !current.is_empty() {
        operands.push(current);
    }
    operands
}

fn operand_draft(
    operand: &[String],
    classification: &Classification,
    metric: Option<&TopicTag>,
    vocab: &TopicVocabulary,
) -> Draft {
    let mut text = operand.join(" ");
    let mut topics: Vec<TopicTag> = Vec::new();

    for m in vocab.match_tokens(operand) {
        if !topics.contains(&m.tag) {
            topics.push(m.tag);
        }
    }

    let has_entity = topics
        .iter()
        .any(|t| vocab.kind_of(t) == Some(TopicKind::Entity));
    if !has_entity {
        if let Some(entity) = classification.entities.first() {
            text = format!("{} {}", text, vocab.label(entity));
            topics.insert(0, entity.clone());
        }
    }

    if let Some(m) = metric {
        if !topics.contains(m) {
            topics.push(m.clone());
        }
        text = format!("identify {} by {}", text, vocab.label(m));
    } else {
        text = format!("identify {}", text);
    }

    Draft {
        text,
        topics,
        focus: RetrievalFocus::detect(operand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;
    use crate::question::RankOrder;
    use crate::registry::{Artifact, ArtifactContent};
    use crate::topic::TopicDefinition;
    use serde_json::json;

    fn registry() -> DataSourceRegistry {
        let vocab = TopicVocabulary::new(vec![
            TopicDefinition::entity("store", "store", &["shop"]).with_default_metric("revenue"),
            TopicDefinition::entity("category", "category", &["department"]),
            TopicDefinition::entity("region", "region", &[]),
            TopicDefinition::metric("revenue", "revenue", &["sales"]),
        ])
        .unwrap();
        let records = ArtifactContent::Records(vec![json!({"store_id": "S001", "revenue": 10.0})
            .as_object()
            .unwrap()
            .clone()]);
        DataSourceRegistry::builder(vocab)
            .artifact(Artifact::new("stores", "Stores", records.clone()).with_topics(&["store", "revenue"]))
            .artifact(Artifact::new("cats", "Categories", records).with_topics(&["category", "revenue"]))
            .build()
            .unwrap()
    }

    fn run(q: &str) -> Decomposition {
        let reg = registry();
        let question = Question::new(q);
        let c = classify(&question, reg.vocabulary());
        decompose(&question, &c, &reg)
    }

    #[test]
    fn test_comparison_splits_operands() {
        let d = run("Compare top store vs bottom store");
        let subs = d.sub_questions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].text, "identify top store by revenue");
        assert_eq!(subs[1].text, "identify bottom store by revenue");
        assert_eq!(
            subs[1].focus,
            RetrievalFocus::Rank {
                order: RankOrder::Ascending,
                limit: 1
            }
        );
        assert!(subs.iter().all(|s| s.topics.contains(&TopicTag::new("store"))));
    }

    #[test]
    fn test_operand_inherits_entity() {
        let d = run("top 3 vs bottom 3 stores");
        let subs = d.sub_questions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].text, "identify top 3 store by revenue");
    }

    #[test]
    fn test_multi_entity_one_per_entity() {
        let d = run("revenue in each store and category");
        let texts: Vec<_> = d.sub_questions().iter().map(|s| s.text.clone()).collect();
        assert!(texts.contains(&"identify revenue by store".to_string()));
        assert!(texts.contains(&"identify revenue by category".to_string()));
    }

    #[test]
    fn test_causal_adds_drivers() {
        let d = run("Why did category sales drop?");
        let subs = d.sub_questions();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[1].focus, RetrievalFocus::Drivers);
        assert_eq!(subs[1].text, "explain drivers of revenue by category");
    }

    #[test]
    fn test_simple_is_identity() {
        let d = run("How many stores?");
        let subs = d.sub_questions();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].text, "How many stores?");
    }

    #[test]
    fn test_unbound_topic_becomes_ambiguous() {
        match run("Why is region performance weak?") {
            Decomposition::Ambiguous { missing } => {
                assert!(missing[0].contains("region"));
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_every_subquestion_has_topics() {
        for q in [
            "Compare store sales against category sales",
            "How does store revenue compare between top and bottom?",
            "Why are store sales up?",
        ] {
            for sub in run(q).sub_questions() {
                assert!(!sub.topics.is_empty(), "{} -> {:?}", q, sub);
            }
        }
    }
}
