//! AI gateways: response generation, diagnosis, resource recommendation.
//!
//! Each gateway owns its prompt and sampling settings and wraps the same
//! completion service. Response generation never fails — any error becomes
//! a fallback sentence so the conversation always has something to show.
//! Diagnosis and recommendation return typed errors the orchestrator
//! downgrades to "skip this turn".

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

use qeek_common::{ChatMessage, DiagnosisShape, GatewayErrorKind, QeekError};
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{CompletionParams, CompletionService};
use crate::prompts;

static RESOURCE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"r_\d{3}").unwrap());

/// A reply that is always displayable. `Fallback` records how the real
/// reply was lost, without ever surfacing that to the user as an error.
#[derive(Debug, Clone, PartialEq)]
pub enum AiReply {
    Full(String),
    Fallback { content: String, kind: GatewayErrorKind },
}

impl AiReply {
    pub fn content(&self) -> &str {
        match self {
            AiReply::Full(content) => content,
            AiReply::Fallback { content, .. } => content,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AiReply::Fallback { .. })
    }
}

fn fallback_for(kind: GatewayErrorKind) -> &'static str {
    match kind {
        GatewayErrorKind::Network => prompts::NETWORK_FALLBACK,
        GatewayErrorKind::Timeout => prompts::TIMEOUT_FALLBACK,
        GatewayErrorKind::Unknown => prompts::GENERATION_FALLBACK,
    }
}

// ============================================================================
// Response gateway
// ============================================================================

/// Generates conversational replies. `completion` is `None` when no
/// credential is configured; that is a supported degraded mode, not an
/// error — the fixed default reply comes back without any network call.
pub struct ResponseGateway {
    completion: Option<Arc<dyn CompletionService>>,
}

impl ResponseGateway {
    pub fn new(completion: Option<Arc<dyn CompletionService>>) -> Self {
        ResponseGateway { completion }
    }

    pub async fn generate(&self, history: &[ChatMessage]) -> AiReply {
        let Some(completion) = &self.completion else {
            warn!("No completion credential configured, returning default reply");
            return AiReply::Full(prompts::DEFAULT_REPLY.to_string());
        };

        let params = CompletionParams {
            temperature: 0.7,
            max_tokens: Some(500),
            json_object: false,
        };

        match completion.complete(prompts::ASSISTANT_SYSTEM_PROMPT, history, params).await {
            Ok(content) if !content.trim().is_empty() => AiReply::Full(content),
            Ok(_) => {
                warn!("Completion returned empty content, substituting fallback");
                AiReply::Fallback {
                    content: prompts::GENERATION_FALLBACK.to_string(),
                    kind: GatewayErrorKind::Unknown,
                }
            }
            Err(e) => {
                let kind = e.kind();
                warn!("Reply generation failed ({}): {}", kind, e);
                AiReply::Fallback { content: fallback_for(kind).to_string(), kind }
            }
        }
    }
}

// ============================================================================
// Diagnosis gateway
// ============================================================================

pub struct DiagnosisGateway {
    completion: Option<Arc<dyn CompletionService>>,
}

impl DiagnosisGateway {
    pub fn new(completion: Option<Arc<dyn CompletionService>>) -> Self {
        DiagnosisGateway { completion }
    }

    /// Analyze the question and history into the structured diagnosis
    /// shape. Any failure here is non-fatal for the conversation; the
    /// caller skips diagnosis for the turn.
    pub async fn diagnose(
        &self,
        question_title: &str,
        history: &[ChatMessage],
    ) -> Result<DiagnosisShape, QeekError> {
        let Some(completion) = &self.completion else {
            return Err(QeekError::Gateway(GatewayErrorKind::Unknown));
        };

        let user_prompt = format!(
            "問い: {}\n\n会話履歴: {}",
            question_title,
            serde_json::to_string(history)?
        );

        let params = CompletionParams {
            temperature: 0.5,
            max_tokens: None,
            json_object: true,
        };

        let text = completion
            .complete(prompts::DIAGNOSIS_SYSTEM_PROMPT, &[ChatMessage::user(user_prompt)], params)
            .await
            .map_err(|e| QeekError::Gateway(e.kind()))?;

        let shape = parse_diagnosis(&text).map_err(QeekError::Parse)?;
        shape.validate().map_err(QeekError::Parse)?;

        info!(
            "Diagnosis parsed: {} categories, score {}",
            shape.classification.len(),
            shape.score
        );
        Ok(shape)
    }
}

/// Parse the structured diagnosis response, tolerating common model
/// output variations: prose around the JSON object, numbers where the
/// contract says arrays of numbers, missing optional whitespace.
pub fn parse_diagnosis(text: &str) -> Result<DiagnosisShape, String> {
    if let Ok(shape) = serde_json::from_str::<DiagnosisShape>(text) {
        return Ok(shape);
    }

    let json_text = extract_json(text);
    if let Ok(shape) = serde_json::from_str::<DiagnosisShape>(&json_text) {
        return Ok(shape);
    }

    let value: Value =
        serde_json::from_str(&json_text).map_err(|e| format!("diagnosis is not JSON: {}", e))?;
    value_to_shape(&value)
}

/// Extract the JSON object from text that may have prose around it.
fn extract_json(text: &str) -> String {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }
    text.to_string()
}

fn value_to_shape(v: &Value) -> Result<DiagnosisShape, String> {
    let classification = string_array(v.get("classification")).ok_or("missing classification")?;
    let weight = number_array(v.get("weight")).ok_or("missing weight")?;
    let score = v
        .get("score")
        .and_then(Value::as_f64)
        .ok_or("missing score")?;
    let summary = v
        .get("summary")
        .and_then(Value::as_str)
        .ok_or("missing summary")?
        .to_string();
    let reasons = string_array(v.get("reasons")).ok_or("missing reasons")?;

    Ok(DiagnosisShape { classification, weight, score, summary, reasons })
}

fn string_array(v: Option<&Value>) -> Option<Vec<String>> {
    v.and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(|x| x.as_str().map(|s| s.to_string()))
            .collect()
    })
}

fn number_array(v: Option<&Value>) -> Option<Vec<f64>> {
    v.and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
}

// ============================================================================
// Resource recommendation gateway
// ============================================================================

/// Alternate resource-selection strategy: ask the model to pick ids from
/// the fixed catalog, then extract everything matching `r_` + 3 digits.
/// Not part of the per-turn flow; the chat page fetches the whole catalog.
pub struct ResourceGateway {
    completion: Option<Arc<dyn CompletionService>>,
}

impl ResourceGateway {
    pub fn new(completion: Option<Arc<dyn CompletionService>>) -> Self {
        ResourceGateway { completion }
    }

    pub async fn recommend(
        &self,
        question_title: &str,
        diagnosis: &DiagnosisShape,
    ) -> Result<Vec<String>, QeekError> {
        let Some(completion) = &self.completion else {
            return Err(QeekError::Gateway(GatewayErrorKind::Unknown));
        };

        let user_prompt = format!(
            "問い: {}\n\n診断結果: {}",
            question_title,
            serde_json::to_string(diagnosis)?
        );

        let params = CompletionParams {
            temperature: 0.3,
            max_tokens: Some(100),
            json_object: false,
        };

        let text = completion
            .complete(prompts::RECOMMEND_SYSTEM_PROMPT, &[ChatMessage::user(user_prompt)], params)
            .await
            .map_err(|e| QeekError::Gateway(e.kind()))?;

        Ok(extract_resource_ids(&text))
    }
}

pub fn extract_resource_ids(text: &str) -> Vec<String> {
    RESOURCE_ID
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}
