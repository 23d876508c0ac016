//! Shared fixture: a grocery-retail registry with 50 stores.

#![allow(dead_code)]

use insight::{FakeInferenceService, InsightConfig, Pipeline};
use insight_shared::registry::{parse_sections, Artifact, ArtifactContent, DataSourceRegistry};
use insight_shared::{TopicDefinition, TopicVocabulary};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const PASS_JSON: &str = r#"{"directly_answers": true, "uses_retrieved_data": true, "correct_entity_type": true, "appropriate_detail_level": true, "no_unverifiable_claims": true}"#;

pub fn is_judge_prompt(prompt: &str) -> bool {
    prompt.starts_with("Evaluate the candidate answer")
}

pub fn strategy_of(prompt: &str) -> &str {
    prompt
        .lines()
        .next()
        .and_then(|l| l.strip_prefix("Strategy: "))
        .unwrap_or("")
}

fn rows(values: Vec<Value>) -> Vec<Map<String, Value>> {
    values
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
}

pub fn registry() -> DataSourceRegistry {
    let vocab = TopicVocabulary::new(vec![
        TopicDefinition::entity("store", "store", &["shop", "outlet"]).with_default_metric("revenue"),
        TopicDefinition::entity("category", "category", &["department"]).with_default_metric("revenue"),
        TopicDefinition::entity("customer-segment", "customer segment", &["segment"]),
        TopicDefinition::metric("revenue", "revenue", &["sales", "turnover"]),
    ])
    .unwrap();

    let stores = rows(
        (1..=50)
            .map(|i| json!({"store_id": format!("S{:03}", i), "total_revenue": 100_000 + i * 1_000}))
            .collect(),
    );
    let categories = rows(vec![
        json!({"category": "Dairy", "total_revenue": 52_000}),
        json!({"category": "Bakery", "total_revenue": 31_000}),
        json!({"category": "Produce", "total_revenue": 47_500}),
    ]);
    let insights = parse_sections(
        "# Customer segment drivers\n\
         Loyalty members account for most weekend store traffic.\n\n\
         # Category drivers\n\
         Dairy promotions lifted category sales in March.\n",
    );

    DataSourceRegistry::builder(vocab)
        .artifact(
            Artifact::new("store-performance", "Store Performance", ArtifactContent::Records(stores))
                .with_topics(&["store", "revenue"])
                .with_entity_column("store_id")
                .with_metric_column("revenue", "total_revenue")
                .with_sample_question("Which store has the highest revenue?"),
        )
        .artifact(
            Artifact::new("category-mix", "Category Mix", ArtifactContent::Records(categories))
                .with_topics(&["category", "revenue"])
                .with_entity_column("category")
                .with_metric_column("revenue", "total_revenue"),
        )
        .artifact(
            Artifact::new("segment-insights", "Segment Insights", ArtifactContent::Document(insights))
                .with_topics(&["customer-segment", "store", "category"]),
        )
        .build()
        .unwrap()
}

pub fn config() -> InsightConfig {
    let mut config = InsightConfig::default();
    config.inference.generator_timeout_ms = 1_000;
    config.inference.judge_timeout_ms = 1_000;
    config
}

pub fn pipeline(fake: Arc<FakeInferenceService>, config: InsightConfig) -> Pipeline {
    Pipeline::new(Arc::new(registry()), fake, config)
}
