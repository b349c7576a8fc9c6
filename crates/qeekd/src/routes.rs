//! API routes for qeekd.
//!
//! Only critical-path failures surface as `{success:false, error}` with a
//! 4xx/5xx status; best-effort failures (AI generation, diagnosis) are
//! invisible here beyond a generic reply or a missing diagnosis panel.

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

use qeek_common::{
    AuthResponse, BookmarkResponse, CreateQuestionRequest, CreateQuestionResponse,
    CredentialsRequest, ErrorResponse, FeedbackRequest, HealthResponse, OkResponse, QeekError,
    QuestionDetailsResponse, QuestionListResponse, RecommendResourcesRequest,
    RecommendResourcesResponse, ResourceListResponse, SendMessageRequest, ToggleBookmarkRequest,
    TurnResponse, VERSION,
};

use crate::db::ConversationStore;
use crate::server::AppState;

type AppStateArc = Arc<AppState>;

/// Critical-path failure as the `{success:false, error}` contract.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError { status, message: message.into() }
    }

    /// Map an orchestrator/repo error, falling back to the operation's
    /// canonical message for anything without user-facing text.
    fn from_qeek(e: QeekError, fallback: &str) -> Self {
        match e {
            QeekError::Validation(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            QeekError::Auth(message) => ApiError::new(StatusCode::UNAUTHORIZED, message),
            QeekError::Store(message) => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message),
            other => {
                error!("Unhandled failure: {}", other);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, fallback)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

// ============================================================================
// Question routes
// ============================================================================

pub fn question_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/questions", post(create_question).get(list_questions))
        .route("/v1/questions/:id", get(question_details).delete(remove_question))
        .route("/v1/questions/:id/messages", post(send_message))
        .route("/v1/questions/:id/bookmark", post(toggle_bookmark))
}

async fn create_question(
    State(state): State<AppStateArc>,
    Json(req): Json<CreateQuestionRequest>,
) -> Result<Json<CreateQuestionResponse>, ApiError> {
    info!("[Q]  New question: {}", req.title);

    let start = state
        .orchestrator
        .start_conversation(&req.title)
        .await
        .map_err(|e| ApiError::from_qeek(e, "問いの作成に失敗しました"))?;

    // The opening reply keeps generating after this response is sent.
    drop(start.first_reply);

    Ok(Json(CreateQuestionResponse {
        success: true,
        question_id: start.question_id,
        title: start.title,
    }))
}

#[derive(Debug, Deserialize)]
struct ListQuestionsParams {
    #[serde(default)]
    bookmarked: bool,
}

async fn list_questions(
    State(state): State<AppStateArc>,
    Query(params): Query<ListQuestionsParams>,
) -> Result<Json<QuestionListResponse>, ApiError> {
    let questions = state.repo.list_questions(params.bookmarked).await.map_err(|e| {
        error!("Question list failed: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "問いの取得中にエラーが発生しました")
    })?;

    Ok(Json(QuestionListResponse { success: true, questions }))
}

async fn question_details(
    State(state): State<AppStateArc>,
    Path(question_id): Path<String>,
) -> Result<Json<QuestionDetailsResponse>, ApiError> {
    let details = state
        .repo
        .question_details(&question_id)
        .await
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "問いの詳細取得に失敗しました"))?;

    Ok(Json(QuestionDetailsResponse { success: true, details }))
}

async fn send_message(
    State(state): State<AppStateArc>,
    Path(question_id): Path<String>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<TurnResponse>, ApiError> {
    let turn = state
        .orchestrator
        .send_message(&question_id, &req.content)
        .await
        .map_err(|e| ApiError::from_qeek(e, "メッセージの送信に失敗しました"))?;

    Ok(Json(TurnResponse {
        success: true,
        user_message: turn.user_message,
        ai_message: turn.ai_message,
        show_diagnosis: turn.show_diagnosis,
    }))
}

async fn toggle_bookmark(
    State(state): State<AppStateArc>,
    Path(question_id): Path<String>,
    Json(req): Json<ToggleBookmarkRequest>,
) -> Result<Json<BookmarkResponse>, ApiError> {
    let bookmarked = state
        .orchestrator
        .toggle_bookmark(&question_id, req.current_status)
        .await
        .map_err(|e| ApiError::from_qeek(e, "ブックマークの更新に失敗しました"))?;

    Ok(Json(BookmarkResponse { success: true, bookmarked }))
}

async fn remove_question(
    State(state): State<AppStateArc>,
    Path(question_id): Path<String>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .orchestrator
        .remove_question(&question_id)
        .await
        .map_err(|e| ApiError::from_qeek(e, "問いの削除に失敗しました"))?;

    Ok(Json(OkResponse::ok()))
}

// ============================================================================
// Resource routes
// ============================================================================

pub fn resource_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/resources", get(list_resources))
        .route("/v1/resources/recommend", post(recommend_resources))
}

async fn list_resources(State(state): State<AppStateArc>) -> Json<ResourceListResponse> {
    let resources = state.repo.resources().await;
    Json(ResourceListResponse { success: true, resources })
}

async fn recommend_resources(
    State(state): State<AppStateArc>,
    Json(req): Json<RecommendResourcesRequest>,
) -> Result<Json<RecommendResourcesResponse>, ApiError> {
    if req.question.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "パラメータが無効です"));
    }

    let resource_ids = state
        .resources_gateway
        .recommend(&req.question, &req.diagnosis)
        .await
        .map_err(|e| {
            error!("Resource recommendation failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "リソースの推薦に失敗しました")
        })?;

    Ok(Json(RecommendResourcesResponse { success: true, resource_ids }))
}

// ============================================================================
// Feedback routes
// ============================================================================

pub fn feedback_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/feedback", post(submit_feedback))
}

async fn submit_feedback(
    State(state): State<AppStateArc>,
    Json(req): Json<FeedbackRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    if req.feedback.trim().is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "フィードバックが無効です"));
    }

    state.repo.save_feedback(&req.feedback).await.map_err(|e| {
        error!("Feedback save failed: {}", e);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "フィードバックの保存に失敗しました")
    })?;

    Ok(Json(OkResponse::ok()))
}

// ============================================================================
// Auth routes
// ============================================================================

pub fn auth_routes() -> Router<AppStateArc> {
    Router::new()
        .route("/v1/auth/signup", post(sign_up))
        .route("/v1/auth/signin", post(sign_in))
        .route("/v1/auth/signout", post(sign_out))
        .route("/v1/auth/session", get(session))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

async fn sign_up(
    State(state): State<AppStateArc>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "メールアドレスとパスワードを入力してください",
        ));
    }

    let user = state
        .auth
        .sign_up(&req.email, &req.password)
        .await
        .map_err(|e| ApiError::from_qeek(e, "サインアップに失敗しました"))?;

    Ok(Json(AuthResponse { success: true, user: Some(user), access_token: None }))
}

async fn sign_in(
    State(state): State<AppStateArc>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "メールアドレスとパスワードを入力してください",
        ));
    }

    let session = state
        .auth
        .sign_in_with_password(&req.email, &req.password)
        .await
        .map_err(|e| ApiError::from_qeek(e, "サインインに失敗しました"))?;

    Ok(Json(AuthResponse {
        success: true,
        user: Some(session.user),
        access_token: Some(session.access_token),
    }))
}

async fn sign_out(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>, ApiError> {
    if let Some(token) = bearer_token(&headers) {
        state
            .auth
            .sign_out(token)
            .await
            .map_err(|e| ApiError::from_qeek(e, "サインアウトに失敗しました"))?;
    }
    Ok(Json(OkResponse::ok()))
}

/// Session lookup. A signed-out caller gets `user: null`, not an error.
async fn session(
    State(state): State<AppStateArc>,
    headers: HeaderMap,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state
        .auth
        .get_user(bearer_token(&headers))
        .await
        .map_err(|e| ApiError::from_qeek(e, "セッションの取得に失敗しました"))?;

    Ok(Json(AuthResponse { success: true, user, access_token: None }))
}

// ============================================================================
// Admin routes
// ============================================================================

pub fn admin_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/seed", post(run_seed))
}

async fn run_seed(State(state): State<AppStateArc>) -> Result<Json<OkResponse>, ApiError> {
    if !state.config.seeding_allowed() {
        return Err(ApiError::new(
            StatusCode::FORBIDDEN,
            "本番環境ではシードを実行できません",
        ));
    }

    let path = std::path::Path::new(&state.config.seed.data_path);
    crate::seed::seed_database(state.repo.client(), path)
        .await
        .map_err(|e| {
            error!("Seeding failed: {}", e);
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "シードの実行に失敗しました")
        })?;

    // The catalog changed under the cache; drop the memoized copy.
    state.repo.invalidate_resources();

    Ok(Json(OkResponse::ok()))
}

// ============================================================================
// Health routes
// ============================================================================

pub fn health_routes() -> Router<AppStateArc> {
    Router::new().route("/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppStateArc>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: VERSION.to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}
