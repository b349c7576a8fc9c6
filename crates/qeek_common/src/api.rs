//! Request/response shapes for the daemon's HTTP surface.
//!
//! Every response carries `success`; failures on the critical path are
//! reported as `{ success: false, error }` with a 4xx/5xx status.

use serde::{Deserialize, Serialize};

use crate::conversation::{Message, Question, QuestionDetails};
use crate::diagnosis::DiagnosisShape;
use crate::resource::Resource;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        ErrorResponse { success: false, error: error.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub success: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        OkResponse { success: true }
    }
}

// ============================================================================
// Questions & messages
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestionRequest {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQuestionResponse {
    pub success: bool,
    pub question_id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

/// Result of one follow-up turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub success: bool,
    pub user_message: Message,
    pub ai_message: Message,
    pub show_diagnosis: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionListResponse {
    pub success: bool,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionDetailsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub details: QuestionDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleBookmarkRequest {
    pub current_status: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkResponse {
    pub success: bool,
    pub bookmarked: bool,
}

// ============================================================================
// Resources
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceListResponse {
    pub success: bool,
    pub resources: Vec<Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResourcesRequest {
    pub question: String,
    pub diagnosis: DiagnosisShape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResourcesResponse {
    pub success: bool,
    pub resource_ids: Vec<String>,
}

// ============================================================================
// Feedback
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: String,
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    /// Absent user is a normal state (signed out), not an error.
    pub user: Option<AuthUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
}
