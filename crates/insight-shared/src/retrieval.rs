//! Context Retriever: sub-question -> ranked, bounded context slices.
//!
//! Deterministic. Candidate artifacts are ranked by topic overlap, then by how
//! well the artifact kind fits the sub-question focus, then by recency, then
//! by id. Zero matches yield an empty set, never an error.

use crate::question::{RankOrder, RetrievalFocus, SubQuestion};
use crate::registry::{Artifact, ArtifactContent, ArtifactKind, DataSourceRegistry, DocumentSection};
use crate::text::format_number;
use crate::topic::{TopicKind, TopicTag, TopicVocabulary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// One context slice extracted from one artifact for one sub-question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub source_id: String,
    /// Primary tag the artifact was matched on
    pub topic_tag: TopicTag,
    /// All tags carried by the source artifact
    pub topics: Vec<TopicTag>,
    pub content: String,
    /// 1 = most relevant for its sub-question
    pub relevance_rank: usize,
    /// Index of the sub-question this slice answers
    pub subquestion: usize,
}

/// Retrieval limits
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Max artifacts returned per sub-question
    pub top_k: usize,
    /// Max table rows kept for a non-rank extraction
    pub max_table_rows: usize,
    /// Max document sections kept per artifact
    pub max_sections: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 2,
            max_table_rows: 60,
            max_sections: 1,
        }
    }
}

/// Retrieve the top-K context slices for one sub-question.
pub fn retrieve(
    subq: &SubQuestion,
    registry: &DataSourceRegistry,
    opts: &RetrievalOptions,
) -> Vec<RetrievedContext> {
    let mut ranked = registry.artifacts_for_topics(&subq.topics);
    ranked.sort_by(|a, b| {
        b.topic_overlap(&subq.topics)
            .cmp(&a.topic_overlap(&subq.topics))
            .then_with(|| focus_fit(b, subq.focus).cmp(&focus_fit(a, subq.focus)))
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.id.cmp(&b.id))
    });

    let vocab = registry.vocabulary();
    let mut out = Vec::new();

    for artifact in ranked {
        if out.len() >= opts.top_k {
            break;
        }
        let Some(content) = extract(artifact, subq, vocab, opts) else {
            debug!("Retriever: {} had no matching slice for sub-question {}", artifact.id, subq.index);
            continue;
        };
        let topic_tag = subq
            .topics
            .iter()
            .find(|t| artifact.has_topic(t))
            .cloned()
            .unwrap_or_else(|| artifact.topics[0].clone());

        out.push(RetrievedContext {
            source_id: artifact.id.clone(),
            topic_tag,
            topics: artifact.topics.clone(),
            content,
            relevance_rank: out.len() + 1,
            subquestion: subq.index,
        });
    }

    debug!(
        "Retriever: sub-question {} '{}' -> {} slices",
        subq.index,
        subq.text,
        out.len()
    );
    out
}

fn focus_fit(artifact: &Artifact, focus: RetrievalFocus) -> u8 {
    match (focus, artifact.kind()) {
        (RetrievalFocus::Drivers, ArtifactKind::Document) => 1,
        (RetrievalFocus::Drivers, _) => 0,
        (_, ArtifactKind::Document) => 0,
        _ => 1,
    }
}

fn extract(
    artifact: &Artifact,
    subq: &SubQuestion,
    vocab: &TopicVocabulary,
    opts: &RetrievalOptions,
) -> Option<String> {
    match &artifact.content {
        ArtifactContent::Records(rows) => Some(extract_records(artifact, rows, subq, vocab, opts)),
        ArtifactContent::Summary(value) => extract_summary(artifact, value, subq, vocab, opts),
        ArtifactContent::Document(sections) => extract_document(artifact, sections, subq, vocab, opts),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn render_row(row: &Map<String, Value>) -> String {
    row.iter()
        .map(|(k, v)| format!("{}={}", k, render_value(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn metric_tags(subq: &SubQuestion, vocab: &TopicVocabulary) -> Vec<TopicTag> {
    subq.topics
        .iter()
        .filter(|t| vocab.kind_of(t) == Some(TopicKind::Metric))
        .cloned()
        .collect()
}

/// Tabular extraction. Always keeps the row count and the distinct entity
/// count; rank focus keeps the ranked slice, otherwise rows up to the cap.
fn extract_records(
    artifact: &Artifact,
    rows: &[Map<String, Value>],
    subq: &SubQuestion,
    vocab: &TopicVocabulary,
    opts: &RetrievalOptions,
) -> String {
    let mut lines = vec![format!("{} ({})", artifact.title, artifact.id)];
    lines.push(format!("rows: {}", rows.len()));

    if let Some(col) = &artifact.entity_column {
        let distinct: BTreeSet<String> = rows
            .iter()
            .filter_map(|r| r.get(col))
            .map(render_value)
            .collect();
        lines.push(format!("distinct {}: {}", col, distinct.len()));
    }

    let metrics = metric_tags(subq, vocab);
    let metric = artifact.metric_column(&metrics);

    if let Some((tag, col)) = metric {
        let total: f64 = rows.iter().filter_map(|r| r.get(col)).filter_map(Value::as_f64).sum();
        lines.push(format!("total {} ({}): {}", col, tag, format_number(total)));
    }

    match (subq.focus, metric) {
        (RetrievalFocus::Rank { order, limit }, Some((_, col))) => {
            let mut sorted: Vec<&Map<String, Value>> = rows.iter().collect();
            sorted.sort_by(|a, b| {
                let av = a.get(col).and_then(Value::as_f64);
                let bv = b.get(col).and_then(Value::as_f64);
                match (av, bv) {
                    (Some(x), Some(y)) => {
                        let ord = x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal);
                        match order {
                            RankOrder::Descending => ord.reverse(),
                            RankOrder::Ascending => ord,
                        }
                    }
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
            });
            let direction = match order {
                RankOrder::Descending => "highest first",
                RankOrder::Ascending => "lowest first",
            };
            lines.push(format!("ranked by {} ({})", col, direction));
            for (i, row) in sorted.iter().take(limit.max(1)).enumerate() {
                lines.push(format!("rank {}: {}", i + 1, render_row(row)));
            }
        }
        _ => {
            for row in rows.iter().take(opts.max_table_rows) {
                lines.push(render_row(row));
            }
            if rows.len() > opts.max_table_rows {
                lines.push(format!("... {} more rows", rows.len() - opts.max_table_rows));
            }
        }
    }

    lines.join("\n")
}

fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(&format!("{}[{}]", prefix, i), v, out);
            }
        }
        other => out.push((prefix.to_string(), render_value(other))),
    }
}

/// KPI summary extraction: lines whose key path mentions a sub-question
/// topic, or every line when none does. Empty summaries yield nothing.
fn extract_summary(
    artifact: &Artifact,
    value: &Value,
    subq: &SubQuestion,
    vocab: &TopicVocabulary,
    opts: &RetrievalOptions,
) -> Option<String> {
    let mut pairs = Vec::new();
    flatten("", value, &mut pairs);
    if pairs.is_empty() {
        return None;
    }

    let matching: Vec<&(String, String)> = pairs
        .iter()
        .filter(|(k, _)| subq.topics.iter().any(|t| vocab.mentions(&k.replace(['.', '_'], " "), t)))
        .collect();
    let selected: Vec<&(String, String)> = if matching.is_empty() {
        pairs.iter().collect()
    } else {
        matching
    };

    let mut lines = vec![format!("{} ({})", artifact.title, artifact.id)];
    lines.extend(
        selected
            .iter()
            .take(opts.max_table_rows)
            .map(|(k, v)| format!("{} = {}", k, v)),
    );
    Some(lines.join("\n"))
}

/// Free-text extraction: only the best-matching section(s), never the whole
/// document. A document with no section mentioning the topics yields nothing.
fn extract_document(
    artifact: &Artifact,
    sections: &[DocumentSection],
    subq: &SubQuestion,
    vocab: &TopicVocabulary,
    opts: &RetrievalOptions,
) -> Option<String> {
    let mut scored: Vec<(usize, usize, &DocumentSection)> = sections
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let text = format!("{}\n{}", s.heading, s.body);
            let score = subq.topics.iter().filter(|t| vocab.mentions(&text, t)).count();
            (score, i, s)
        })
        .filter(|(score, _, _)| *score > 0)
        .collect();

    if scored.is_empty() {
        return None;
    }
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut lines = vec![format!("{} ({})", artifact.title, artifact.id)];
    for (_, _, section) in scored.iter().take(opts.max_sections.max(1)) {
        if !section.heading.is_empty() {
            lines.push(format!("## {}", section.heading));
        }
        lines.push(section.body.clone());
    }
    Some(lines.join("\n"))
}
