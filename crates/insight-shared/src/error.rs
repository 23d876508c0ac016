//! Error types for Insight.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Artifact '{id}' is invalid: {reason}")]
    Artifact { id: String, reason: String },

    #[error("Unknown topic tag: {0}")]
    UnknownTopic(String),

    #[error("Vocabulary error: {0}")]
    Vocabulary(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl InsightError {
    pub fn code(&self) -> i32 {
        match self {
            InsightError::Registry(_) => -32010,
            InsightError::Artifact { .. } => -32011,
            InsightError::UnknownTopic(_) => -32012,
            InsightError::Vocabulary(_) => -32013,
            InsightError::Config(_) => -32020,
            InsightError::Io(_) => -32006,
            InsightError::Json(_) => -32700,
            InsightError::Toml(_) => -32701,
        }
    }

    pub(crate) fn artifact(id: &str, reason: impl Into<String>) -> Self {
        InsightError::Artifact {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;
