//! Call analysis: the analyzer seam and where results are kept

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallAnalysis {
    pub summary: String,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub extracted_info: Value,
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct AnalysisError(pub String);

/// Turns a call transcript into an analysis.
#[async_trait]
pub trait CallAnalyzer: Send + Sync {
    async fn analyze(
        &self,
        transcript: Option<&str>,
        metadata: &Value,
    ) -> Result<CallAnalysis, AnalysisError>;
}

/// Placeholder analyzer until a model-backed one is wired in.
///
/// Returns the same analysis for every call; the sentiment is configurable
/// so the follow-up path can be exercised.
#[derive(Debug, Clone)]
pub struct StubAnalyzer {
    sentiment: Sentiment,
}

impl StubAnalyzer {
    pub fn new() -> Self {
        Self {
            sentiment: Sentiment::Positive,
        }
    }

    pub fn with_sentiment(sentiment: Sentiment) -> Self {
        Self { sentiment }
    }
}

impl Default for StubAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallAnalyzer for StubAnalyzer {
    async fn analyze(
        &self,
        _transcript: Option<&str>,
        _metadata: &Value,
    ) -> Result<CallAnalysis, AnalysisError> {
        Ok(CallAnalysis {
            summary: "Call summary...".to_string(),
            sentiment: self.sentiment,
            action_items: Vec::new(),
            extracted_info: Value::Object(Default::default()),
        })
    }
}

/// A stored analysis result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub call_id: String,
    #[serde(flatten)]
    pub analysis: CallAnalysis,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn save(&self, record: AnalysisRecord) -> Result<(), AnalysisError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAnalysisStore {
    records: RwLock<Vec<AnalysisRecord>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AnalysisRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn save(&self, record: AnalysisRecord) -> Result<(), AnalysisError> {
        self.records
            .write()
            .map_err(|_| AnalysisError("analysis store lock poisoned".to_string()))?
            .push(record);
        Ok(())
    }
}
