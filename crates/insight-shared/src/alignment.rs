//! Alignment criteria, deterministic checks and judge-output parsing.
//!
//! A candidate passes a criterion only when the deterministic check AND the
//! judge agree. The judge is fail-closed: anything that is not confidently
//! `true` counts as false, and unparseable output fails every criterion.

use crate::aggregate::AggregatedContext;
use crate::candidate::{Candidate, Strategy};
use crate::claims::{extract_claims, trace_claims, Claim, ClaimIndex, TraceReport};
use crate::classifier::Classification;
use crate::question::{ComplexityVerdict, Question};
use crate::text::word_count;
use crate::topic::{TopicKind, TopicVocabulary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Phrases that mark an answer as evasive
const EVASIVE_PHRASES: &[&str] = &[
    "i don't know",
    "i do not know",
    "i'm not sure",
    "i am not sure",
    "cannot answer",
    "can't answer",
    "unable to answer",
    "unable to determine",
    "not enough information",
    "insufficient data",
    "as an ai",
    "i'm sorry",
    "i apologize",
];

/// One of the five alignment criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    DirectlyAnswers,
    UsesRetrievedData,
    CorrectEntityType,
    AppropriateDetailLevel,
    NoUnverifiableClaims,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::DirectlyAnswers,
        Criterion::UsesRetrievedData,
        Criterion::CorrectEntityType,
        Criterion::AppropriateDetailLevel,
        Criterion::NoUnverifiableClaims,
    ];

    /// Key in the judge's JSON output
    pub fn key(&self) -> &'static str {
        match self {
            Self::DirectlyAnswers => "directly_answers",
            Self::UsesRetrievedData => "uses_retrieved_data",
            Self::CorrectEntityType => "correct_entity_type",
            Self::AppropriateDetailLevel => "appropriate_detail_level",
            Self::NoUnverifiableClaims => "no_unverifiable_claims",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::DirectlyAnswers => "answer does not directly address the question",
            Self::UsesRetrievedData => "answer does not use the retrieved data",
            Self::CorrectEntityType => "answer is about the wrong entity type",
            Self::AppropriateDetailLevel => "answer detail level does not match the question",
            Self::NoUnverifiableClaims => "answer contains figures or entities not found in the data",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Word-count bounds for the detail-level criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailPolicy {
    pub simple_max_words: usize,
    pub complex_min_words: usize,
}

impl Default for DetailPolicy {
    fn default() -> Self {
        Self {
            simple_max_words: 40,
            complex_min_words: 20,
        }
    }
}

impl DetailPolicy {
    pub fn fits(&self, verdict: ComplexityVerdict, text: &str) -> bool {
        let words = word_count(text);
        match verdict {
            ComplexityVerdict::Simple => words <= self.simple_max_words,
            ComplexityVerdict::Complex => words >= self.complex_min_words,
            ComplexityVerdict::Ambiguous => true,
        }
    }
}

/// Everything the deterministic checks look at, fixed for one round
pub struct EvaluationInput<'a> {
    pub question: &'a Question,
    pub classification: &'a Classification,
    pub context: &'a AggregatedContext,
    pub vocabulary: &'a TopicVocabulary,
    pub policy: DetailPolicy,
}

/// Deterministic half of an evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct DeterministicReport {
    pub checks: [(Criterion, bool); 5],
    /// Claims traced against retained context only
    pub context_trace: TraceReport,
    /// Claims traced against retained context plus the question's figures
    pub full_trace: TraceReport,
    /// Capitalized names found in neither the context nor the vocabulary
    pub invented_names: Vec<String>,
}

impl DeterministicReport {
    pub fn passed(&self, criterion: Criterion) -> bool {
        self.checks
            .iter()
            .find(|(c, _)| *c == criterion)
            .map(|(_, ok)| *ok)
            .unwrap_or(false)
    }
}

fn is_evasive(text: &str) -> bool {
    let lower = text.to_lowercase().replace('\u{2019}', "'");
    EVASIVE_PHRASES.iter().any(|p| lower.contains(p))
}

/// Whether the answer names an identifier or value taken from a fragment
/// that describes only the expected entity kinds.
fn names_entity_from_context(text: &str, input: &EvaluationInput<'_>) -> bool {
    let vocab = input.vocabulary;
    let expected = &input.classification.entities;
    input.context.fragments().iter().any(|f| {
        let mut kinds = f
            .topics
            .iter()
            .filter(|t| vocab.kind_of(t) == Some(TopicKind::Entity))
            .peekable();
        if kinds.peek().is_none() || !kinds.all(|t| expected.contains(t)) {
            return false;
        }
        let trace = trace_claims(text, &ClaimIndex::from_texts(&[&f.content]));
        !trace.named_mentions.is_empty()
            || trace.traced.iter().any(|c| matches!(c, Claim::Identifier { .. }))
    })
}

/// Run the five deterministic checks for one candidate.
pub fn check_candidate(candidate: &Candidate, input: &EvaluationInput<'_>) -> DeterministicReport {
    let text = candidate.text.as_str();
    let context_text = input.context.text();

    let context_index = ClaimIndex::from_texts(&[&context_text]);
    let full_index = context_index.clone().with_figures_from(input.question.raw());
    let context_trace = trace_claims(text, &context_index);
    let full_trace = trace_claims(text, &full_index);

    let vocab = input.vocabulary;
    let topics = input.classification.topics();
    let mentions_topic = topics.iter().any(|t| vocab.mentions(text, t));
    let has_figure = !extract_claims(text).is_empty();

    let directly_answers = !text.is_empty()
        && !is_evasive(text)
        && (mentions_topic || has_figure || !context_trace.named_mentions.is_empty());

    let uses_data = context_trace.uses_data();

    let entities = &input.classification.entities;
    let correct_entity = entities.is_empty()
        || entities.iter().any(|e| vocab.mentions(text, e))
        || names_entity_from_context(text, input);

    let detail = !text.is_empty() && input.policy.fits(input.classification.verdict, text);

    let invented_names: Vec<String> = full_trace
        .unknown_names
        .iter()
        .filter(|n| vocab.match_text(n).is_empty())
        .cloned()
        .collect();
    let verifiable = full_trace.all_traced() && invented_names.is_empty();

    DeterministicReport {
        checks: [
            (Criterion::DirectlyAnswers, directly_answers),
            (Criterion::UsesRetrievedData, uses_data),
            (Criterion::CorrectEntityType, correct_entity),
            (Criterion::AppropriateDetailLevel, detail),
            (Criterion::NoUnverifiableClaims, verifiable),
        ],
        context_trace,
        full_trace,
        invented_names,
    }
}

/// Per-criterion judge answers, already fail-closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub directly_answers: bool,
    pub uses_retrieved_data: bool,
    pub correct_entity_type: bool,
    pub appropriate_detail_level: bool,
    pub no_unverifiable_claims: bool,
}

impl JudgeVerdict {
    pub fn get(&self, criterion: Criterion) -> bool {
        match criterion {
            Criterion::DirectlyAnswers => self.directly_answers,
            Criterion::UsesRetrievedData => self.uses_retrieved_data,
            Criterion::CorrectEntityType => self.correct_entity_type,
            Criterion::AppropriateDetailLevel => self.appropriate_detail_level,
            Criterion::NoUnverifiableClaims => self.no_unverifiable_claims,
        }
    }
}

/// What happened to the judge call for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JudgeOutcome {
    Parsed { verdict: JudgeVerdict },
    /// Output had no usable JSON object
    Malformed,
    /// Call failed or timed out
    Unavailable,
    /// Judge disabled, or not consulted after a deterministic failure
    Skipped,
}

impl JudgeOutcome {
    /// Judge answer for one criterion; a disabled judge defers to the checks.
    fn allows(&self, criterion: Criterion) -> bool {
        match self {
            Self::Parsed { verdict } => verdict.get(criterion),
            Self::Skipped => true,
            Self::Malformed | Self::Unavailable => false,
        }
    }
}

/// Find the outermost JSON object in free-form model output.
fn extract_json(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

fn confident_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "pass")
        }
        _ => false,
    }
}

/// Parse judge output. `None` when no JSON object with any criterion key is found.
pub fn parse_judge_verdict(response: &str) -> Option<JudgeVerdict> {
    let json = extract_json(response)?;
    let value: Value = serde_json::from_str(json).ok()?;
    let obj = value.as_object()?;

    if !Criterion::ALL.iter().any(|c| obj.contains_key(c.key())) {
        return None;
    }

    let get = |c: Criterion| confident_true(obj.get(c.key()));
    Some(JudgeVerdict {
        directly_answers: get(Criterion::DirectlyAnswers),
        uses_retrieved_data: get(Criterion::UsesRetrievedData),
        correct_entity_type: get(Criterion::CorrectEntityType),
        appropriate_detail_level: get(Criterion::AppropriateDetailLevel),
        no_unverifiable_claims: get(Criterion::NoUnverifiableClaims),
    })
}

/// Final result for one criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion: Criterion,
    pub deterministic: bool,
    pub judge: bool,
    pub passed: bool,
}

/// Evaluation of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentScore {
    pub strategy: Strategy,
    pub criteria: Vec<CriterionResult>,
    pub pass: bool,
    pub failing: Vec<Criterion>,
    pub judge: JudgeOutcome,
    /// Raw text of claims missing from context and question
    pub untraced_claims: Vec<String>,
}

impl AlignmentScore {
    /// Combine the deterministic report with the judge outcome.
    pub fn combine(strategy: Strategy, report: &DeterministicReport, judge: JudgeOutcome) -> Self {
        let criteria: Vec<CriterionResult> = report
            .checks
            .iter()
            .map(|(criterion, deterministic)| {
                let judged = judge.allows(*criterion);
                CriterionResult {
                    criterion: *criterion,
                    deterministic: *deterministic,
                    judge: judged,
                    passed: *deterministic && judged,
                }
            })
            .collect();

        let failing: Vec<Criterion> = criteria
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.criterion)
            .collect();

        Self {
            strategy,
            pass: failing.is_empty(),
            criteria,
            failing,
            judge,
            untraced_claims: report
                .full_trace
                .untraced
                .iter()
                .map(|c| c.raw().to_string())
                .chain(report.invented_names.iter().cloned())
                .collect(),
        }
    }

    pub fn fails(&self, criterion: Criterion) -> bool {
        self.failing.contains(&criterion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::classifier::classify;
    use crate::retrieval::RetrievedContext;
    use crate::topic::{TopicDefinition, TopicTag};

    fn vocab() -> TopicVocabulary {
        TopicVocabulary::new(vec![
            TopicDefinition::entity("store", "store", &["shop"]),
            TopicDefinition::entity("category", "category", &[]),
            TopicDefinition::metric("revenue", "revenue", &["sales"]),
        ])
        .unwrap()
    }

    fn tagged_context(topic: &str, content: &str) -> AggregatedContext {
        aggregate(
            vec![RetrievedContext {
                source_id: format!("{}-summary", topic),
                topic_tag: TopicTag::new(topic),
                topics: vec![TopicTag::new(topic)],
                content: content.to_string(),
                relevance_rank: 1,
                subquestion: 0,
            }],
            6000,
        )
    }

    fn check(q: &str, answer: &str, ctx: &str) -> DeterministicReport {
        check_with(q, answer, tagged_context("store", ctx))
    }

    fn check_with(q: &str, answer: &str, context: AggregatedContext) -> DeterministicReport {
        let vocab = vocab();
        let question = Question::new(q);
        let classification = classify(&question, &vocab);
        let input = EvaluationInput {
            question: &question,
            classification: &classification,
            context: &context,
            vocabulary: &vocab,
            policy: DetailPolicy::default(),
        };
        check_candidate(&Candidate::new(Strategy::Direct, answer), &input)
    }

    #[test]
    fn test_grounded_simple_answer_passes_all() {
        let r = check("How many stores?", "50 stores", "rows: 50\ndistinct store_id: 50");
        assert!(r.checks.iter().all(|(_, ok)| *ok), "{:?}", r.checks);
    }

    #[test]
    fn test_wrong_entity_fails() {
        let r = check("How many stores?", "There are 50 categories", "rows: 50");
        assert!(!r.passed(Criterion::CorrectEntityType));
    }

    #[test]
    fn test_invented_figure_fails() {
        let r = check("How many stores?", "75 stores", "rows: 50");
        assert!(!r.passed(Criterion::NoUnverifiableClaims));
        assert!(!r.passed(Criterion::UsesRetrievedData));
    }

    #[test]
    fn test_evasive_fails() {
        let r = check("How many stores?", "I don't know how many stores there are", "rows: 50");
        assert!(!r.passed(Criterion::DirectlyAnswers));
    }

    #[test]
    fn test_simple_answer_too_long_fails_detail() {
        let long = format!("50 stores {}", "word ".repeat(60));
        let r = check("How many stores?", &long, "rows: 50");
        assert!(!r.passed(Criterion::AppropriateDetailLevel));
    }

    #[test]
    fn test_figure_from_question_is_verifiable() {
        let r = check("Which store is in the top 5 stores?", "S001 is in the top 5", "store_id=S001");
        assert!(r.passed(Criterion::NoUnverifiableClaims));
    }

    #[test]
    fn test_identifier_only_in_question_is_unverifiable() {
        let r = check(
            "Is S999 the top store?",
            "S999 is the top store with revenue 150000",
            "rank 1: store_id=S050, total_revenue=150000",
        );
        assert!(!r.passed(Criterion::NoUnverifiableClaims));
        assert!(r.full_trace.untraced.iter().any(|c| c.raw() == "S999"));
    }

    #[test]
    fn test_flipped_sign_is_unverifiable() {
        let r = check(
            "What is the store revenue growth?",
            "Store revenue grew +5.2%",
            "store_id=S050, revenue_growth=-5.2",
        );
        assert!(!r.passed(Criterion::NoUnverifiableClaims));

        let r = check(
            "What is the store revenue growth?",
            "Store revenue changed by -5.2%",
            "store_id=S050, revenue_growth=-5.2",
        );
        assert!(r.passed(Criterion::NoUnverifiableClaims));
    }

    #[test]
    fn test_store_identifier_answers_store_question() {
        let r = check(
            "Which store has the highest revenue?",
            "S050, with revenue of 150000",
            "rank 1: store_id=S050, total_revenue=150000",
        );
        assert!(r.passed(Criterion::CorrectEntityType));
        assert!(r.passed(Criterion::NoUnverifiableClaims));
    }

    #[test]
    fn test_identifier_from_other_entity_is_wrong_type() {
        let ctx = tagged_context("category", "rank 1: category_id=C12, total_revenue=300");
        let r = check_with("Which store has the highest revenue?", "C12 with revenue of 300", ctx);
        assert!(!r.passed(Criterion::CorrectEntityType));
    }

    #[test]
    fn test_invented_name_is_unverifiable() {
        let ctx = "rank 1: category=Fresh Produce, total_revenue=10";
        let q = "Which category has the highest revenue?";

        let invented = "The leader is Frozen Foods with 10 in revenue";
        let r = check_with(q, invented, tagged_context("category", ctx));
        assert!(!r.passed(Criterion::NoUnverifiableClaims));
        assert_eq!(r.invented_names, vec!["Frozen Foods".to_string()]);
        let score = AlignmentScore::combine(Strategy::Direct, &r, JudgeOutcome::Skipped);
        assert!(score.untraced_claims.contains(&"Frozen Foods".to_string()));

        let grounded = "The leader is Fresh Produce with 10 in revenue";
        let r = check_with(q, grounded, tagged_context("category", ctx));
        assert!(r.passed(Criterion::NoUnverifiableClaims));
    }

    #[test]
    fn test_parse_judge_tolerates_prose() {
        let v = parse_judge_verdict(
            "Sure! {\"directly_answers\": true, \"uses_retrieved_data\": \"yes\", \"correct_entity_type\": true, \"appropriate_detail_level\": true, \"no_unverifiable_claims\": true} done",
        )
        .unwrap();
        assert!(v.uses_retrieved_data);
        assert!(v.no_unverifiable_claims);
    }

    #[test]
    fn test_parse_judge_fail_closed() {
        let v = parse_judge_verdict("{\"directly_answers\": \"maybe\", \"uses_retrieved_data\": 1}").unwrap();
        assert!(!v.directly_answers);
        assert!(!v.uses_retrieved_data);
        assert!(!v.correct_entity_type);
    }

    #[test]
    fn test_parse_judge_malformed() {
        assert!(parse_judge_verdict("looks good to me").is_none());
        assert!(parse_judge_verdict("{not json}").is_none());
        assert!(parse_judge_verdict("{\"score\": 10}").is_none());
    }

    #[test]
    fn test_combine_requires_both() {
        let r = check("How many stores?", "50 stores", "rows: 50");
        let score = AlignmentScore::combine(Strategy::Direct, &r, JudgeOutcome::Malformed);
        assert!(!score.pass);
        assert_eq!(score.failing.len(), 5);

        let skipped = AlignmentScore::combine(Strategy::Direct, &r, JudgeOutcome::Skipped);
        assert!(skipped.pass);
    }
}
