use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HealthStatus {
    #[serde(default = "unknown_status")]
    pub status: String,
    #[serde(default)]
    pub ml_model: bool,
}

fn unknown_status() -> String {
    "unknown".to_string()
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModelList {
    pub models: Vec<String>,
    pub recommended: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct AnalyzeRequest {
    pub network_data: Vec<Map<String, Value>>,
    pub use_llm: bool,
    pub llm_model: String,
    pub confidence_threshold: f64,
}

/// Typed view of a `POST /analyze` response. Unknown fields are kept in `extra`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ClassificationResult {
    pub total_records: usize,
    pub threats_detected: usize,
    pub average_confidence: f64,
    pub predictions: Vec<Prediction>,
    #[serde(default)]
    pub llm_analysis: Option<Vec<LlmAnalysis>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Prediction {
    pub record_id: usize,
    pub prediction: String,
    pub confidence: f64,
    pub is_threat: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LlmAnalysis {
    pub record_id: usize,
    pub analysis: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// What `/analyze` answered: the body exactly as received, and its typed view.
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisResponse {
    pub raw: Value,
    pub result: ClassificationResult,
}

impl AnalysisResponse {
    pub fn from_raw(raw: Value) -> Result<Self, serde_json::Error> {
        let result = serde_json::from_value(raw.clone())?;
        Ok(Self { raw, result })
    }
}
