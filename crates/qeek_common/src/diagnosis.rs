//! Diagnosis types and validation of the structured gateway output.

use serde::{Deserialize, Serialize};

/// The fixed taxonomy the diagnosis engine may classify a question into.
pub const CATEGORY_LABELS: [&str; 5] = ["深掘り系", "将来投資", "行動計画", "不安解消", "スキル向上"];

/// A persisted diagnosis row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: String,
    pub question_id: String,
    pub classification: Vec<String>,
    pub weight: Vec<f64>,
    pub score: f64,
    pub summary: String,
    pub reasons: Vec<String>,
}

/// The structured shape demanded from the diagnosis engine, before it has
/// been persisted. `weight` is parallel to `classification`; weights are
/// expected to sum to ~100 but that is deliberately not enforced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisShape {
    pub classification: Vec<String>,
    pub weight: Vec<f64>,
    pub score: f64,
    pub summary: String,
    pub reasons: Vec<String>,
}

impl DiagnosisShape {
    /// Reject malformed model output at the gateway boundary instead of
    /// trusting field presence downstream.
    pub fn validate(&self) -> Result<(), String> {
        if self.classification.is_empty() {
            return Err("classification is empty".to_string());
        }
        if let Some(label) = self
            .classification
            .iter()
            .find(|label| !CATEGORY_LABELS.contains(&label.as_str()))
        {
            return Err(format!("unknown classification label: {}", label));
        }
        if self.weight.len() != self.classification.len() {
            return Err(format!(
                "weight length {} does not match classification length {}",
                self.weight.len(),
                self.classification.len()
            ));
        }
        if let Some(w) = self.weight.iter().find(|w| !(0.0..=100.0).contains(*w)) {
            return Err(format!("weight out of range: {}", w));
        }
        if !(0.0..=100.0).contains(&self.score) {
            return Err(format!("score out of range: {}", self.score));
        }
        if self.summary.trim().is_empty() {
            return Err("summary is empty".to_string());
        }
        if self.reasons.is_empty() {
            return Err("reasons is empty".to_string());
        }
        Ok(())
    }
}
