//! Context Aggregator: merge retrieved slices into one budgeted package.
//!
//! Exact duplicates are removed by content fingerprint. Remaining fragments
//! are ordered by relevance rank (then sub-question order) and packed into a
//! character budget; the fragment that crosses the budget is cut on a line
//! boundary when enough of it fits, and everything after it is dropped.
//! Every retained fragment keeps its `source_id`.

use crate::retrieval::RetrievedContext;
use crate::topic::TopicTag;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

/// Smallest truncated fragment worth keeping
pub const MIN_TRUNCATED_CHARS: usize = 80;

/// One retained, provenance-tagged piece of context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFragment {
    pub source_id: String,
    pub topic_tag: TopicTag,
    pub topics: Vec<TopicTag>,
    pub content: String,
    pub relevance_rank: usize,
    pub subquestion: usize,
    /// Cut to fit the budget
    pub truncated: bool,
}

/// Request-scoped, de-duplicated context package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedContext {
    fragments: Vec<ContextFragment>,
    budget_chars: usize,
    duplicates_removed: usize,
    dropped: usize,
}

fn fingerprint(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.trim().as_bytes());
    hex::encode(hasher.finalize())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Keep whole lines while they fit in `budget` characters.
fn cut_lines(content: &str, budget: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for line in content.lines() {
        let cost = char_len(line) + usize::from(!out.is_empty());
        if used + cost > budget {
            break;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        used += cost;
    }
    out
}

/// Merge every retrieved slice of one run under a character budget.
pub fn aggregate(items: Vec<RetrievedContext>, budget_chars: usize) -> AggregatedContext {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());
    let mut duplicates_removed = 0;

    for item in items {
        if seen.insert(fingerprint(&item.content)) {
            unique.push(item);
        } else {
            duplicates_removed += 1;
        }
    }

    unique.sort_by(|a, b| {
        a.relevance_rank
            .cmp(&b.relevance_rank)
            .then_with(|| a.subquestion.cmp(&b.subquestion))
    });

    let mut fragments = Vec::new();
    let mut used = 0;
    let mut dropped = 0;

    for item in unique {
        let len = char_len(&item.content);
        let remaining = budget_chars.saturating_sub(used);

        let (content, truncated) = if len <= remaining {
            (item.content, false)
        } else if remaining >= MIN_TRUNCATED_CHARS {
            let cut = cut_lines(&item.content, remaining);
            if char_len(&cut) < MIN_TRUNCATED_CHARS {
                dropped += 1;
                continue;
            }
            (cut, true)
        } else {
            dropped += 1;
            continue;
        };

        used += char_len(&content);
        fragments.push(ContextFragment {
            source_id: item.source_id,
            topic_tag: item.topic_tag,
            topics: item.topics,
            content,
            relevance_rank: item.relevance_rank,
            subquestion: item.subquestion,
            truncated,
        });
    }

    debug!(
        "Aggregator: {} fragments, {} chars, {} duplicates removed, {} dropped",
        fragments.len(),
        used,
        duplicates_removed,
        dropped
    );

    AggregatedContext {
        fragments,
        budget_chars,
        duplicates_removed,
        dropped,
    }
}

impl AggregatedContext {
    pub fn fragments(&self) -> &[ContextFragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn budget_chars(&self) -> usize {
        self.budget_chars
    }

    pub fn total_chars(&self) -> usize {
        self.fragments.iter().map(|f| char_len(&f.content)).sum()
    }

    pub fn duplicates_removed(&self) -> usize {
        self.duplicates_removed
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Distinct source ids of retained fragments (sorted)
    pub fn sources(&self) -> Vec<String> {
        self.fragments
            .iter()
            .map(|f| f.source_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// All retained text, for claim tracing
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Prompt rendering with a provenance header per fragment
    pub fn render(&self) -> String {
        if self.fragments.is_empty() {
            return "(no data retrieved)".to_string();
        }
        self.fragments
            .iter()
            .map(|f| format!("[source: {}]\n{}", f.source_id, f.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Keep only fragments whose source carries one of `tags`.
    ///
    /// Returns `None` when nothing would be removed or nothing would remain.
    pub fn narrow_to(&self, tags: &[TopicTag]) -> Option<AggregatedContext> {
        if tags.is_empty() {
            return None;
        }
        let kept: Vec<ContextFragment> = self
            .fragments
            .iter()
            .filter(|f| f.topics.iter().any(|t| tags.contains(t)))
            .cloned()
            .collect();

        if kept.is_empty() || kept.len() == self.fragments.len() {
            return None;
        }

        Some(AggregatedContext {
            dropped: self.dropped + (self.fragments.len() - kept.len()),
            fragments: kept,
            budget_chars: self.budget_chars,
            duplicates_removed: self.duplicates_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(source: &str, content: &str, rank: usize, subq: usize, tags: &[&str]) -> RetrievedContext {
        RetrievedContext {
            source_id: source.to_string(),
            topic_tag: TopicTag::new(tags[0]),
            topics: tags.iter().map(TopicTag::new).collect(),
            content: content.to_string(),
            relevance_rank: rank,
            subquestion: subq,
        }
    }

    #[test]
    fn test_exact_duplicates_removed() {
        let agg = aggregate(
            vec![
                ctx("doc", "Weekend traffic lifts stores.", 2, 0, &["store"]),
                ctx("doc", "Weekend traffic lifts stores.", 2, 1, &["store"]),
            ],
            1000,
        );
        assert_eq!(agg.fragments().len(), 1);
        assert_eq!(agg.duplicates_removed(), 1);
    }

    #[test]
    fn test_higher_relevance_kept_under_budget() {
        let long = "x".repeat(60);
        let agg = aggregate(
            vec![
                ctx("low", &long, 2, 0, &["store"]),
                ctx("high", &long, 1, 0, &["store"]),
            ],
            100,
        );
        assert_eq!(agg.sources(), vec!["high".to_string()]);
        assert_eq!(agg.dropped(), 1);
        assert_eq!(agg.budget_chars(), 100);
        assert!(agg.total_chars() <= agg.budget_chars());
    }

    #[test]
    fn test_truncates_on_line_boundary() {
        let content: String = (0..20).map(|i| format!("line number {:02} with padding", i)).collect::<Vec<_>>().join("\n");
        let agg = aggregate(vec![ctx("t", &content, 1, 0, &["store"])], 200);
        let f = &agg.fragments()[0];
        assert!(f.truncated);
        assert!(agg.total_chars() <= 200);
        assert!(f.content.ends_with("padding"));
    }

    #[test]
    fn test_provenance_preserved() {
        let agg = aggregate(
            vec![
                ctx("a", "alpha", 1, 0, &["store"]),
                ctx("b", "beta", 1, 1, &["category"]),
            ],
            1000,
        );
        assert_eq!(agg.sources(), vec!["a".to_string(), "b".to_string()]);
        assert!(agg.render().contains("[source: b]"));
    }

    #[test]
    fn test_narrow_to_entity() {
        let agg = aggregate(
            vec![
                ctx("stores", "alpha", 1, 0, &["store"]),
                ctx("cats", "beta", 2, 0, &["category"]),
            ],
            1000,
        );
        let narrowed = agg.narrow_to(&[TopicTag::new("store")]).unwrap();
        assert_eq!(narrowed.sources(), vec!["stores".to_string()]);
        assert_eq!(narrowed.budget_chars(), agg.budget_chars());
        assert!(agg.narrow_to(&[TopicTag::new("region")]).is_none());
    }
}
