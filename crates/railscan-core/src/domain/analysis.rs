//! Analysis result as returned by the inference backend.
//!
//! The history store does not need these types (it stores an opaque
//! [`Payload`]); they exist so result-producing code can work with a typed
//! value and convert it at the boundary.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entry::Payload;

/// Which backend pipeline produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Object detector only.
    #[default]
    Standard,
    /// Vision-model analysis with a structured report.
    Deep,
}

/// One bounding box reported by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Pixel coordinates `[x1, y1, x2, y2]`.
    pub bbox: [i64; 4],
    pub class: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<u32>,
}

/// A full analysis response, plus the client-side fields the capture and
/// upload flows attach before saving it (`preview`, `mode`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub detections: Vec<Detection>,
    /// Plain-text report (standard mode) or a structured object (deep mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_image: Option<String>,
    /// The image the user submitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default)]
    pub mode: AnalysisMode,
    /// Fields this client does not know about are kept as they are.
    #[serde(flatten)]
    pub extra: Payload,
}

impl AnalysisResult {
    pub fn defect_count(&self) -> usize {
        self.detections.len()
    }

    pub fn with_mode(mut self, mode: AnalysisMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    /// Flatten into the opaque payload stored in history.
    pub fn into_payload(self) -> Payload {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                tracing::warn!(kind = ?other, "analysis result did not serialize to an object");
                Payload::new()
            }
            Err(error) => {
                tracing::warn!(%error, "analysis result could not be serialized");
                Payload::new()
            }
        }
    }
}

impl From<AnalysisResult> for Payload {
    fn from(result: AnalysisResult) -> Self {
        result.into_payload()
    }
}
