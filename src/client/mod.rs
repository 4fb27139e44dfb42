//! Boundary to the remote classification service.
pub mod api;
pub mod types;

pub use api::{ClientError, ThreatClient, Timeouts};
pub use types::{AnalysisResponse, AnalyzeRequest, ClassificationResult, LlmAnalysis, Prediction};
