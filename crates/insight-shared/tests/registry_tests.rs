//! Registry loading from a directory of precomputed artifacts.
//!
//! Tests verify:
//! - registry.toml plus artifact files load into an immutable index
//! - All three artifact kinds parse
//! - Load errors surface at startup with the offending artifact named

use insight_shared::registry::{ArtifactKind, DataSourceRegistry, MANIFEST_FILE};
use insight_shared::{InsightError, TopicTag};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MANIFEST: &str = r#"
[[topic]]
tag = "store"
kind = "entity"
label = "store"
terms = ["shop", "outlet"]
default_metric = "revenue"

[[topic]]
tag = "category"
kind = "entity"
label = "category"
terms = ["department"]

[[topic]]
tag = "revenue"
kind = "metric"
label = "revenue"
terms = ["sales", "turnover"]

[[artifact]]
id = "store-performance"
title = "Store Performance"
path = "store_performance.json"
kind = "records"
topics = ["store", "revenue"]
updated_at = "2024-03-01T00:00:00Z"
entity_column = "store_id"
sample_question = "Which store has the highest revenue?"

[artifact.metric_columns]
revenue = "total_revenue"

[[artifact]]
id = "kpi-summary"
title = "KPI Summary"
path = "kpi_summary.json"
kind = "summary"
topics = ["revenue"]
updated_at = "2024-03-02T00:00:00Z"

[[artifact]]
id = "category-insights"
title = "Category Insights"
path = "category_insights.md"
kind = "document"
topics = ["category"]
updated_at = "2024-02-15T00:00:00Z"
"#;

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), MANIFEST_FILE, MANIFEST);
    write(
        dir.path(),
        "store_performance.json",
        r#"[{"store_id": "S001", "total_revenue": 101000}, {"store_id": "S002", "total_revenue": 102000}]"#,
    );
    write(
        dir.path(),
        "kpi_summary.json",
        r#"{"revenue": {"total": 203000, "growth_pct": 4.5}}"#,
    );
    write(
        dir.path(),
        "category_insights.md",
        "# Dairy category\nDairy grew on promotions.\n\n# Bakery category\nBakery was flat.\n",
    );
    dir
}

#[test]
fn test_load_all_kinds() {
    let dir = fixture();
    let registry = DataSourceRegistry::load(dir.path()).unwrap();

    assert_eq!(registry.len(), 3);
    assert_eq!(registry.vocabulary().topics().len(), 3);

    let stores = registry.get("store-performance").unwrap();
    assert_eq!(stores.kind(), ArtifactKind::Records);
    assert_eq!(stores.entity_column.as_deref(), Some("store_id"));
    assert_eq!(
        stores.metric_column(&[TopicTag::new("revenue")]),
        Some((&TopicTag::new("revenue"), "total_revenue"))
    );

    assert_eq!(registry.get("kpi-summary").unwrap().kind(), ArtifactKind::Summary);
    assert_eq!(registry.get("category-insights").unwrap().kind(), ArtifactKind::Document);
}

#[test]
fn test_topic_lookup() {
    let dir = fixture();
    let registry = DataSourceRegistry::load(dir.path()).unwrap();

    let ids: Vec<&str> = registry
        .artifacts_for_topics(&[TopicTag::new("revenue")])
        .iter()
        .map(|a| a.id.as_str())
        .collect();
    assert_eq!(ids, vec!["store-performance", "kpi-summary"]);
    assert!(registry.has_topic(&TopicTag::new("category")));
}

#[test]
fn test_missing_manifest() {
    let dir = TempDir::new().unwrap();
    let err = DataSourceRegistry::load(dir.path()).unwrap_err();
    assert!(matches!(err, InsightError::Registry(_)));
}

#[test]
fn test_manifest_without_topics() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), MANIFEST_FILE, "# nothing declared\n");
    let err = DataSourceRegistry::load(dir.path()).unwrap_err();
    match err {
        InsightError::Registry(msg) => assert!(msg.contains("declares no topics")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_missing_artifact_file_names_artifact() {
    let dir = fixture();
    fs::remove_file(dir.path().join("kpi_summary.json")).unwrap();
    let err = DataSourceRegistry::load(dir.path()).unwrap_err();
    match err {
        InsightError::Artifact { id, .. } => assert_eq!(id, "kpi-summary"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_bad_json_is_startup_error() {
    let dir = fixture();
    write(dir.path(), "store_performance.json", "[{not json");
    let err = DataSourceRegistry::load(dir.path()).unwrap_err();
    assert!(matches!(err, InsightError::Json(_)));
}

#[test]
fn test_unknown_artifact_topic() {
    let dir = fixture();
    let manifest = MANIFEST.replace(r#"topics = ["category"]"#, r#"topics = ["weather"]"#);
    write(dir.path(), MANIFEST_FILE, &manifest);
    let err = DataSourceRegistry::load(dir.path()).unwrap_err();
    assert!(matches!(err, InsightError::UnknownTopic(_)));
    assert_eq!(err.code(), -32012);
}
