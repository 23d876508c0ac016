//! End-to-end scenarios for `Pipeline::ask` with a scripted inference service.
//!
//! Tests verify:
//! - Simple, ambiguous and comparison questions reach the expected terminal state
//! - Failing candidates are never surfaced
//! - Retries are bounded and carry feedback
//! - Timeouts and malformed judge output fail closed

mod common;

use common::{config, is_judge_prompt, pipeline, strategy_of, PASS_JSON};
use insight::{FakeInferenceService, InferenceError};
use insight_shared::{AnswerResult, ClarifyCode, ComplexityVerdict, Strategy};
use std::sync::Arc;
use std::time::Duration;

const COMPARISON_ANSWER: &str = "The top store is S050 with total revenue of 150000, while the bottom \
store is S001 with 101000. The spread between the highest and lowest store is driven by weekend \
traffic from loyalty members.";

fn retail_fake() -> Arc<FakeInferenceService> {
    Arc::new(FakeInferenceService::new(|_, prompt| {
        if is_judge_prompt(prompt) {
            return Ok(PASS_JSON.to_string());
        }
        let reply = match (strategy_of(prompt), prompt.contains("Compare top store")) {
            ("direct", false) => "50 stores",
            ("contextual", false) => "There are 50 stores, with 50 distinct store ids in the data.",
            ("comprehensive", false) => "There are 50 stores in total.",
            ("direct", true) => "S050 beats S001.",
            ("contextual", true) => "S050 leads with 150000 and S001 trails with 101000.",
            (_, true) => COMPARISON_ANSWER,
            _ => "",
        };
        Ok(reply.to_string())
    }))
}

#[tokio::test]
async fn test_how_many_stores() {
    let fake = retail_fake();
    let result = pipeline(fake.clone(), config()).ask("How many stores?").await;

    match &result {
        AnswerResult::Answer { text, provenance } => {
            assert_eq!(text, "50 stores");
            assert_eq!(provenance.strategy, Strategy::Direct);
            assert_eq!(provenance.verdict, ComplexityVerdict::Simple);
            assert_eq!(provenance.attempts, 1);
            assert!(provenance.sources.contains(&"store-performance".to_string()));
        }
        other => panic!("expected answer, got {:?}", other),
    }
}

#[tokio::test]
async fn test_status_clarifies_without_generation() {
    let fake = retail_fake();
    let result = pipeline(fake.clone(), config()).ask("Status").await;

    let req = result.clarification().expect("clarification");
    assert_eq!(req.code, ClarifyCode::AmbiguousQuestion);
    assert!(!req.reasons.is_empty());
    assert!(req.suggestions.len() >= 2 && req.suggestions.len() <= 4);
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_bare_compare_clarifies() {
    let fake = retail_fake();
    let result = pipeline(fake.clone(), config()).ask("compare").await;
    assert_eq!(result.clarification().map(|r| r.code), Some(ClarifyCode::AmbiguousQuestion));
    assert_eq!(fake.call_count(), 0);
}

#[tokio::test]
async fn test_compare_top_vs_bottom_store() {
    let fake = retail_fake();
    let result = pipeline(fake.clone(), config())
        .ask("Compare top store vs bottom store")
        .await;

    match &result {
        AnswerResult::Answer { text, provenance } => {
            assert_eq!(text, COMPARISON_ANSWER);
            assert_eq!(provenance.strategy, Strategy::Comprehensive);
            assert_eq!(provenance.verdict, ComplexityVerdict::Complex);
        }
        other => panic!("expected answer, got {:?}", other),
    }

    // one ranked slice per sub-question reached the generator
    let generation = fake
        .calls()
        .into_iter()
        .find(|c| strategy_of(&c.prompt) == "comprehensive")
        .unwrap();
    assert!(generation.prompt.contains("rank 1: store_id=S050, total_revenue=150000"));
    assert!(generation.prompt.contains("rank 1: store_id=S001, total_revenue=101000"));
}

#[tokio::test]
async fn test_entity_mismatch_exhausts_retries() {
    let fake = Arc::new(FakeInferenceService::new(|_, prompt| {
        if is_judge_prompt(prompt) {
            Ok(PASS_JSON.to_string())
        } else {
            Ok("50 categories".to_string())
        }
    }));
    let result = pipeline(fake.clone(), config()).ask("How many stores?").await;

    let req = result.clarification().expect("clarification");
    assert_eq!(req.code, ClarifyCode::UnverifiableAnswer);
    assert!(req.reasons.iter().any(|r| r.message.contains("entity type mismatch")));

    // 3 rounds x 3 strategies; the judge is never reached
    assert_eq!(fake.call_count(), 9);
    let last = fake.calls().last().cloned().unwrap();
    assert!(last.prompt.contains("Answer about store only."));
}

#[tokio::test]
async fn test_retry_feedback_recovers() {
    let fake = Arc::new(FakeInferenceService::new(|_, prompt| {
        if is_judge_prompt(prompt) {
            Ok(PASS_JSON.to_string())
        } else if prompt.contains("Answer about store only.") {
            Ok("50 stores".to_string())
        } else {
            Ok("50 categories".to_string())
        }
    }));
    let result = pipeline(fake, config()).ask("How many stores?").await;

    assert_eq!(result.text(), Some("50 stores"));
    assert_eq!(result.provenance().map(|p| p.attempts), Some(2));
}

#[tokio::test]
async fn test_timeout_routes_to_service_unavailable() {
    let fake = Arc::new(FakeInferenceService::always("50 stores").with_delay(Duration::from_millis(200)));
    let mut cfg = config();
    cfg.inference.generator_timeout_ms = 20;
    cfg.pipeline.max_attempts = 2;

    let result = pipeline(fake.clone(), cfg).ask("How many stores?").await;

    let req = result.clarification().expect("clarification");
    assert_eq!(req.code, ClarifyCode::ServiceUnavailable);
    assert_eq!(req.reasons[0].kind, "service_unavailable");
    assert_eq!(fake.call_count(), 6);
}

#[tokio::test]
async fn test_service_error_routes_to_service_unavailable() {
    let fake = Arc::new(FakeInferenceService::always_error(InferenceError::Http(
        "connection refused".to_string(),
    )));
    let result = pipeline(fake, config()).ask("How many stores?").await;
    assert_eq!(
        result.clarification().map(|r| r.code),
        Some(ClarifyCode::ServiceUnavailable)
    );
}

#[tokio::test]
async fn test_malformed_judge_never_accepts() {
    let fake = Arc::new(FakeInferenceService::new(|_, prompt| {
        if is_judge_prompt(prompt) {
            Ok("Everything checks out.".to_string())
        } else {
            Ok("50 stores".to_string())
        }
    }));
    let result = pipeline(fake, config()).ask("How many stores?").await;

    let req = result.clarification().expect("clarification");
    assert_eq!(req.code, ClarifyCode::UnverifiableAnswer);
    assert!(!result.is_answer());
}

#[tokio::test]
async fn test_judge_disabled_uses_deterministic_checks() {
    let fake = Arc::new(FakeInferenceService::new(|_, prompt| {
        assert!(!is_judge_prompt(prompt));
        Ok("50 stores".to_string())
    }));
    let mut cfg = config();
    cfg.evaluation.judge_enabled = false;

    let result = pipeline(fake.clone(), cfg).ask("How many stores?").await;
    assert_eq!(result.text(), Some("50 stores"));
    assert_eq!(fake.call_count(), 3);
}

#[tokio::test]
async fn test_every_request_terminates() {
    let replies: Vec<Arc<FakeInferenceService>> = vec![
        retail_fake(),
        Arc::new(FakeInferenceService::always("I don't know.")),
        Arc::new(FakeInferenceService::always("{}")),
        Arc::new(FakeInferenceService::always_error(InferenceError::EmptyResponse)),
    ];
    let questions = [
        "How many stores?",
        "Status",
        "Why did category sales drop?",
        "Compare top store vs bottom store",
        "How do customer segments affect store revenue?",
        "",
    ];

    for fake in replies {
        let pipeline = pipeline(fake.clone(), config());
        for q in questions {
            let before = fake.call_count();
            let result = pipeline.ask(q).await;
            let calls = fake.call_count() - before;
            // 3 rounds x (3 generations + 3 judge calls)
            assert!(calls <= 18, "{} made {} calls", q, calls);
            match result {
                AnswerResult::Answer { ref text, .. } => assert!(!text.is_empty()),
                AnswerResult::Clarification(ref req) => {
                    assert!(req.suggestions.len() >= 2 && req.suggestions.len() <= 4)
                }
            }
        }
    }
}

#[tokio::test]
async fn test_pipeline_shared_across_tasks() {
    let pipeline = Arc::new(pipeline(retail_fake(), config()));
    let mut handles = Vec::new();
    for _ in 0..4 {
        let p = pipeline.clone();
        handles.push(tokio::spawn(async move { p.ask("How many stores?").await }));
    }
    let mut ids = Vec::new();
    for h in handles {
        let result = h.await.unwrap();
        assert_eq!(result.text(), Some("50 stores"));
        ids.push(result.provenance().unwrap().request_id.clone());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

#[tokio::test]
async fn test_answer_serializes_as_tagged_json() {
    let result = pipeline(retail_fake(), config()).ask("How many stores?").await;
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["type"], "answer");
    assert_eq!(json["text"], "50 stores");
    assert_eq!(json["provenance"]["strategy"], "direct");
}
