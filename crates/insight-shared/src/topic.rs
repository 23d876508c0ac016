//! Topic-tag vocabulary.
//!
//! Every registry artifact is tagged with topics from one controlled
//! vocabulary. Questions are routed by matching their tokens against the
//! terms attached to each topic, never by ad hoc substring checks.

use crate::error::{InsightError, Result};
use crate::text::{stem, stem_tokens};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Controlled vocabulary label ("store", "category", "customer-segment", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TopicTag(String);

impl TopicTag {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TopicTag {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TopicTag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<TopicTag> for String {
    fn from(tag: TopicTag) -> Self {
        tag.0
    }
}

impl fmt::Display for TopicTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether a topic names an entity type or a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopicKind {
    Entity,
    Metric,
}

/// One vocabulary entry as declared in `registry.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub tag: TopicTag,
    pub kind: TopicKind,
    /// Human label used in prompts and suggestions ("store", "customer segment")
    pub label: String,
    /// Words or phrases that denote the topic in a question
    #[serde(default)]
    pub terms: Vec<String>,
    /// Metric reported when a question names the entity but no measure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_metric: Option<TopicTag>,
}

impl TopicDefinition {
    pub fn entity(tag: &str, label: &str, terms: &[&str]) -> Self {
        Self {
            tag: TopicTag::new(tag),
            kind: TopicKind::Entity,
            label: label.to_string(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            default_metric: None,
        }
    }

    pub fn metric(tag: &str, label: &str, terms: &[&str]) -> Self {
        Self {
            tag: TopicTag::new(tag),
            kind: TopicKind::Metric,
            label: label.to_string(),
            terms: terms.iter().map(|t| t.to_string()).collect(),
            default_metric: None,
        }
    }

    pub fn with_default_metric(mut self, metric: &str) -> Self {
        self.default_metric = Some(TopicTag::new(metric));
        self
    }
}

/// A vocabulary hit inside a token sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMatch {
    pub tag: TopicTag,
    pub kind: TopicKind,
    /// Token offset of the first matched token
    pub start: usize,
    /// Number of tokens covered
    pub len: usize,
}

/// Immutable topic vocabulary with a term index (longest phrase first).
#[derive(Debug, Clone, Default)]
pub struct TopicVocabulary {
    topics: Vec<TopicDefinition>,
    index: Vec<(Vec<String>, usize)>,
}

impl TopicVocabulary {
    /// Build and validate a vocabulary. The tag itself always counts as a term.
    pub fn new(topics: Vec<TopicDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for topic in &topics {
            if topic.tag.as_str().is_empty() {
                return Err(InsightError::Vocabulary("empty topic tag".to_string()));
            }
            if !seen.insert(topic.tag.clone()) {
                return Err(InsightError::Vocabulary(format!(
                    "duplicate topic tag '{}'",
                    topic.tag
                )));
            }
        }

        for topic in &topics {
            if let Some(metric) = &topic.default_metric {
                let ok = topics
                    .iter()
                    .any(|t| &t.tag == metric && t.kind == TopicKind::Metric);
                if !ok {
                    return Err(InsightError::Vocabulary(format!(
                        "topic '{}' names default metric '{}' which is not a metric topic",
                        topic.tag, metric
                    )));
                }
            }
        }

        let mut index = Vec::new();
        for (i, topic) in topics.iter().enumerate() {
            let mut phrases: Vec<Vec<String>> = vec![stem_tokens(topic.tag.as_str())];
            phrases.push(stem_tokens(&topic.label));
            phrases.extend(topic.terms.iter().map(|t| stem_tokens(t)));
            phrases.retain(|p| !p.is_empty());
            phrases.sort();
            phrases.dedup();
            for phrase in phrases {
                index.push((phrase, i));
            }
        }
        index.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        Ok(Self { topics, index })
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn topics(&self) -> &[TopicDefinition] {
        &self.topics
    }

    pub fn get(&self, tag: &TopicTag) -> Option<&TopicDefinition> {
        self.topics.iter().find(|t| &t.tag == tag)
    }

    pub fn contains(&self, tag: &TopicTag) -> bool {
        self.get(tag).is_some()
    }

    pub fn kind_of(&self, tag: &TopicTag) -> Option<TopicKind> {
        self.get(tag).map(|t| t.kind)
    }

    /// Label for a tag, falling back to the tag text.
    pub fn label(&self, tag: &TopicTag) -> String {
        self.get(tag)
            .map(|t| t.label.clone())
            .unwrap_or_else(|| tag.to_string())
    }

    pub fn entities(&self) -> impl Iterator<Item = &TopicDefinition> {
        self.topics.iter().filter(|t| t.kind == TopicKind::Entity)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &TopicDefinition> {
        self.topics.iter().filter(|t| t.kind == TopicKind::Metric)
    }

    /// Match raw (unstemmed) tokens against the vocabulary.
    ///
    /// Greedy longest-phrase match, non-overlapping, left to right.
    pub fn match_tokens(&self, tokens: &[String]) -> Vec<TopicMatch> {
        let stemmed: Vec<String> = tokens.iter().map(|t| stem(t)).collect();
        let mut matches = Vec::new();
        let mut pos = 0;

        while pos < stemmed.len() {
            let hit = self.index.iter().find(|(phrase, _)| {
                pos + phrase.len() <= stemmed.len() && stemmed[pos..pos + phrase.len()] == phrase[..]
            });
            match hit {
                Some((phrase, i)) => {
                    let topic = &self.topics[*i];
                    matches.push(TopicMatch {
                        tag: topic.tag.clone(),
                        kind: topic.kind,
                        start: pos,
                        len: phrase.len(),
                    });
                    pos += phrase.len();
                }
                None => pos += 1,
            }
        }

        matches
    }

    /// Match free text against the vocabulary.
    pub fn match_text(&self, text: &str) -> Vec<TopicMatch> {
        self.match_tokens(&crate::text::tokenize(text))
    }

    /// Whether `text` mentions `tag` through any of its terms.
    pub fn mentions(&self, text: &str, tag: &TopicTag) -> bool {
        self.match_text(text).iter().any(|m| &m.tag == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> TopicVocabulary {
        TopicVocabulary::new(vec![
            TopicDefinition::entity("store", "store", &["shop", "location"])
                .with_default_metric("revenue"),
            TopicDefinition::entity("customer-segment", "customer segment", &["segment"]),
            TopicDefinition::metric("revenue", "revenue", &["sales", "turnover"]),
        ])
        .unwrap()
    }

    fn toks(s: &str) -> Vec<String> {
        crate::text::tokenize(s)
    }

    #[test]
    fn test_plural_terms_match() {
        let m = vocab().match_tokens(&toks("How many stores?"));
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].tag, TopicTag::new("store"));
        assert_eq!(m[0].kind, TopicKind::Entity);
    }

    #[test]
    fn test_multi_word_term_wins_over_single() {
        let m = vocab().match_tokens(&toks("sales by customer segments"));
        let tags: Vec<_> = m.iter().map(|m| m.tag.as_str()).collect();
        assert_eq!(tags, vec!["revenue", "customer-segment"]);
        assert_eq!(m[1].len, 2);
    }

    #[test]
    fn test_no_substring_matching() {
        // "restore" must not bind to "store"
        assert!(vocab().match_tokens(&toks("restore status")).is_empty());
    }

    #[test]
    fn test_duplicate_tag_rejected() {
        let err = TopicVocabulary::new(vec![
            TopicDefinition::metric("revenue", "revenue", &[]),
            TopicDefinition::metric("revenue", "sales", &[]),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_default_metric_must_be_metric() {
        let err = TopicVocabulary::new(vec![
            TopicDefinition::entity("store", "store", &[]).with_default_metric("category"),
            TopicDefinition::entity("category", "category", &[]),
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn test_topic_tag_normalizes() {
        assert_eq!(TopicTag::new(" Store "), TopicTag::new("store"));
    }
}
