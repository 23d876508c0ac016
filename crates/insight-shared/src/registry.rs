//! Data Source Registry: read-only index of precomputed analytics artifacts.
//!
//! Loaded once at process start from a directory holding `registry.toml`
//! (topic vocabulary + artifact manifest) and the artifact files, then shared
//! behind an `Arc` and never mutated.
//!
//! Artifact kinds:
//! - `records`: JSON array of flat objects (one row per entity)
//! - `summary`: arbitrary JSON object of KPIs
//! - `document`: Markdown insight text, split into sections at headings

use crate::error::{InsightError, Result};
use crate::topic::{TopicDefinition, TopicTag, TopicVocabulary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Manifest file name inside a registry directory
pub const MANIFEST_FILE: &str = "registry.toml";

/// Artifact format as declared in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Records,
    Summary,
    Document,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Records => "records",
            Self::Summary => "summary",
            Self::Document => "document",
        };
        write!(f, "{}", s)
    }
}

/// A heading-delimited section of an insight document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSection {
    pub heading: String,
    pub body: String,
}

/// Parsed artifact payload
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactContent {
    Records(Vec<Map<String, Value>>),
    Summary(Value),
    Document(Vec<DocumentSection>),
}

impl ArtifactContent {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Records(_) => ArtifactKind::Records,
            Self::Summary(_) => ArtifactKind::Summary,
            Self::Document(_) => ArtifactKind::Document,
        }
    }

    /// Parse raw file content according to its declared kind.
    pub fn parse(id: &str, kind: ArtifactKind, raw: &str) -> Result<Self> {
        match kind {
            ArtifactKind::Records => {
                let value: Value = serde_json::from_str(raw)?;
                let rows = value
                    .as_array()
                    .ok_or_else(|| InsightError::artifact(id, "records must be a JSON array"))?;
                let mut out = Vec::with_capacity(rows.len());
                for (i, row) in rows.iter().enumerate() {
                    match row {
                        Value::Object(map) => out.push(map.clone()),
                        _ => {
                            return Err(InsightError::artifact(
                                id,
                                format!("row {} is not an object", i),
                            ))
                        }
                    }
                }
                Ok(Self::Records(out))
            }
            ArtifactKind::Summary => {
                let value: Value = serde_json::from_str(raw)?;
                if !value.is_object() {
                    return Err(InsightError::artifact(id, "summary must be a JSON object"));
                }
                Ok(Self::Summary(value))
            }
            ArtifactKind::Document => Ok(Self::Document(parse_sections(raw))),
        }
    }
}

/// Split Markdown into sections at `#` headings. Text before the first heading
/// becomes an untitled section.
pub fn parse_sections(raw: &str) -> Vec<DocumentSection> {
    let mut sections = Vec::new();
    let mut heading = String::new();
    let mut body: Vec<&str> = Vec::new();

    let mut flush = |heading: &str, body: &mut Vec<&str>| {
        let text = body.join("\n").trim().to_string();
        if !text.is_empty() || !heading.is_empty() {
            sections.push(DocumentSection {
                heading: heading.to_string(),
                body: text,
            });
        }
        body.clear();
    };

    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            flush(&heading, &mut body);
            heading = trimmed.trim_start_matches('#').trim().to_string();
        } else {
            body.push(line);
        }
    }
    flush(&heading, &mut body);

    sections.retain(|s| !s.body.is_empty());
    sections
}

/// One precomputed artifact
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub title: String,
    pub topics: Vec<TopicTag>,
    /// Timestamp of the upstream build that produced the artifact
    pub updated_at: DateTime<Utc>,
    /// Identifier column for records artifacts ("store_id")
    pub entity_column: Option<String>,
    /// Metric topic -> column holding it ("revenue" -> "total_revenue")
    pub metric_columns: BTreeMap<TopicTag, String>,
    /// Example question offered when the pipeline asks for clarification
    pub sample_question: Option<String>,
    pub content: ArtifactContent,
}

impl Artifact {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: ArtifactContent) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            topics: Vec::new(),
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            entity_column: None,
            metric_columns: BTreeMap::new(),
            sample_question: None,
            content,
        }
    }

    pub fn with_topics(mut self, topics: &[&str]) -> Self {
        self.topics = topics.iter().map(TopicTag::new).collect();
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    pub fn with_entity_column(mut self, column: &str) -> Self {
        self.entity_column = Some(column.to_string());
        self
    }

    pub fn with_metric_column(mut self, metric: &str, column: &str) -> Self {
        self.metric_columns.insert(TopicTag::new(metric), column.to_string());
        self
    }

    pub fn with_sample_question(mut self, question: &str) -> Self {
        self.sample_question = Some(question.to_string());
        self
    }

    pub fn kind(&self) -> ArtifactKind {
        self.content.kind()
    }

    pub fn has_topic(&self, tag: &TopicTag) -> bool {
        self.topics.contains(tag)
    }

    /// Count of `tags` carried by this artifact
    pub fn topic_overlap(&self, tags: &[TopicTag]) -> usize {
        tags.iter().filter(|t| self.has_topic(t)).count()
    }

    /// Column for the first of `metrics` this artifact maps, else its first mapped column.
    pub fn metric_column(&self, metrics: &[TopicTag]) -> Option<(&TopicTag, &str)> {
        metrics
            .iter()
            .find_map(|m| self.metric_columns.get_key_value(m))
            .or_else(|| self.metric_columns.iter().next())
            .map(|(k, v)| (k, v.as_str()))
    }
}

/// Manifest entry for one artifact
#[derive(Debug, Clone, Deserialize)]
struct ArtifactManifest {
    id: String,
    title: String,
    path: String,
    kind: ArtifactKind,
    topics: Vec<TopicTag>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    entity_column: Option<String>,
    #[serde(default)]
    metric_columns: BTreeMap<TopicTag, String>,
    #[serde(default)]
    sample_question: Option<String>,
}

/// Whole `registry.toml`
#[derive(Debug, Clone, Deserialize)]
struct RegistryManifest {
    #[serde(default, rename = "topic")]
    topics: Vec<TopicDefinition>,
    #[serde(default, rename = "artifact")]
    artifacts: Vec<ArtifactManifest>,
}

/// Immutable artifact index. Safe for unlimited concurrent readers.
#[derive(Debug, Clone)]
pub struct DataSourceRegistry {
    vocabulary: TopicVocabulary,
    artifacts: Vec<Artifact>,
}

impl DataSourceRegistry {
    pub fn builder(vocabulary: TopicVocabulary) -> RegistryBuilder {
        RegistryBuilder {
            vocabulary,
            artifacts: Vec::new(),
        }
    }

    /// Load the registry from a directory containing `registry.toml`.
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&manifest_path).map_err(|e| {
            InsightError::Registry(format!("cannot read {}: {}", manifest_path.display(), e))
        })?;
        let manifest: RegistryManifest = toml::from_str(&raw)?;

        let vocabulary = TopicVocabulary::new(manifest.topics)?;
        if vocabulary.is_empty() {
            return Err(InsightError::Registry(format!(
                "{} declares no topics",
                manifest_path.display()
            )));
        }
        let mut builder = Self::builder(vocabulary);

        for entry in manifest.artifacts {
            let path = dir.join(&entry.path);
            let raw = fs::read_to_string(&path).map_err(|e| {
                InsightError::artifact(&entry.id, format!("cannot read {}: {}", path.display(), e))
            })?;
            let content = ArtifactContent::parse(&entry.id, entry.kind, &raw)?;
            debug!("Loaded artifact {} ({}) from {}", entry.id, entry.kind, path.display());

            builder = builder.artifact(Artifact {
                id: entry.id,
                title: entry.title,
                topics: entry.topics,
                updated_at: entry.updated_at,
                entity_column: entry.entity_column,
                metric_columns: entry.metric_columns,
                sample_question: entry.sample_question,
                content,
            });
        }

        let registry = builder.build()?;
        info!(
            "Registry loaded from {}: {} artifacts, {} topics",
            dir.display(),
            registry.len(),
            registry.vocabulary.topics().len()
        );
        Ok(registry)
    }

    pub fn vocabulary(&self) -> &TopicVocabulary {
        &self.vocabulary
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Whether at least one artifact carries `tag`
    pub fn has_topic(&self, tag: &TopicTag) -> bool {
        self.artifacts.iter().any(|a| a.has_topic(tag))
    }

    /// Every artifact sharing at least one tag with `tags`, in load order
    pub fn artifacts_for_topics(&self, tags: &[TopicTag]) -> Vec<&Artifact> {
        self.artifacts
            .iter()
            .filter(|a| a.topic_overlap(tags) > 0)
            .collect()
    }
}

/// Builder that validates artifacts against the vocabulary
pub struct RegistryBuilder {
    vocabulary: TopicVocabulary,
    artifacts: Vec<Artifact>,
}

impl RegistryBuilder {
    pub fn artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn build(self) -> Result<DataSourceRegistry> {
        let mut ids = HashSet::new();
        for artifact in &self.artifacts {
            if !ids.insert(artifact.id.clone()) {
                return Err(InsightError::Registry(format!(
                    "duplicate artifact id '{}'",
                    artifact.id
                )));
            }
            if artifact.topics.is_empty() {
                return Err(InsightError::artifact(&artifact.id, "no topic tags"));
            }
            for tag in artifact.topics.iter().chain(artifact.metric_columns.keys()) {
                if !self.vocabulary.contains(tag) {
                    return Err(InsightError::UnknownTopic(format!(
                        "{} (artifact '{}')",
                        tag, artifact.id
                    )));
                }
            }
        }

        Ok(DataSourceRegistry {
            vocabulary: self.vocabulary,
            artifacts: self.artifacts,
        })
    }
}
