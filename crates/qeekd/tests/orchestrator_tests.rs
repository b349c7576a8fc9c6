//! Golden tests for the conversation workflow.
//!
//! Run against a fake store and scripted completion services, so every
//! path is deterministic: no network, no real clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use qeek_common::{
    ChatMessage, Diagnosis, DiagnosisShape, Message, QeekError, Question, QuestionDetails,
    RecordId, Sender,
};
use qeekd::db::ConversationStore;
use qeekd::gateway::{DiagnosisGateway, ResponseGateway};
use qeekd::llm::{CompletionError, CompletionParams, CompletionService};
use qeekd::orchestrator::{Orchestrator, OrchestratorSettings};
use qeekd::prompts;
use qeekd::signal::{View, ViewInvalidator};

const TITLE: &str = "今の仕事、このままでいいのかな？";

const DIAGNOSIS_JSON: &str = r#"{
    "classification": ["深掘り系", "将来投資"],
    "weight": [60, 40],
    "score": 70,
    "summary": "現状への違和感を言語化する段階にあります",
    "reasons": ["理由1", "理由2", "理由3"]
}"#;

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
struct FakeStoreInner {
    questions: Vec<Question>,
    messages: Vec<Message>,
    diagnoses: Vec<Diagnosis>,
    next_id: u32,
}

/// In-memory store. Preserves insertion order for messages, like the
/// real store's `created_at.asc` read.
#[derive(Default)]
struct FakeStore {
    inner: Mutex<FakeStoreInner>,
    /// Simulates the store rejecting every message insert; the repo
    /// contract then degrades to placeholder records.
    message_store_down: AtomicBool,
}

impl FakeStore {
    fn shared() -> Arc<Self> {
        Arc::new(FakeStore::default())
    }

    fn messages_for(&self, question_id: &str) -> Vec<Message> {
        self.inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.question_id == question_id)
            .cloned()
            .collect()
    }

    fn diagnosis_count(&self, question_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .diagnoses
            .iter()
            .filter(|d| d.question_id == question_id)
            .count()
    }

    fn question(&self, question_id: &str) -> Option<Question> {
        self.inner
            .lock()
            .unwrap()
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
    }
}

#[async_trait]
impl ConversationStore for FakeStore {
    async fn save_question(
        &self,
        title: &str,
        user_id: Option<&str>,
    ) -> Result<Question, QeekError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let question = Question {
            id: format!("q-{}", inner.next_id),
            title: title.to_string(),
            user_id: user_id.map(|s| s.to_string()),
            score: None,
            bookmarked: false,
            created_at: Utc::now(),
        };
        inner.questions.push(question.clone());
        Ok(question)
    }

    async fn list_questions(&self, bookmarked_only: bool) -> Result<Vec<Question>, QeekError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .questions
            .iter()
            .filter(|q| !bookmarked_only || q.bookmarked)
            .cloned()
            .collect())
    }

    async fn question_details(&self, question_id: &str) -> Result<QuestionDetails, QeekError> {
        let inner = self.inner.lock().unwrap();
        let question = inner
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned()
            .ok_or_else(|| QeekError::Store(format!("question {} not found", question_id)))?;

        let messages = inner
            .messages
            .iter()
            .filter(|m| m.question_id == question_id)
            .cloned()
            .collect();

        let diagnosis = inner
            .diagnoses
            .iter()
            .find(|d| d.question_id == question_id)
            .cloned();

        Ok(QuestionDetails { question, messages, diagnosis })
    }

    async fn save_message(&self, question_id: &str, sender: Sender, content: &str) -> Message {
        if self.message_store_down.load(Ordering::SeqCst) {
            return Message::placeholder(question_id, sender, content);
        }

        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let message = Message {
            id: RecordId::Persisted(format!("m-{}", inner.next_id)),
            question_id: question_id.to_string(),
            sender,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.messages.push(message.clone());
        message
    }

    async fn save_diagnosis(
        &self,
        question_id: &str,
        shape: &DiagnosisShape,
    ) -> Result<Diagnosis, QeekError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let diagnosis = Diagnosis {
            id: format!("d-{}", inner.next_id),
            question_id: question_id.to_string(),
            classification: shape.classification.clone(),
            weight: shape.weight.clone(),
            score: shape.score,
            summary: shape.summary.clone(),
            reasons: shape.reasons.clone(),
        };
        inner.diagnoses.push(diagnosis.clone());
        if let Some(question) = inner.questions.iter_mut().find(|q| q.id == question_id) {
            question.score = Some(shape.score);
        }
        Ok(diagnosis)
    }

    async fn update_bookmark(
        &self,
        question_id: &str,
        bookmarked: bool,
    ) -> Result<Question, QeekError> {
        let mut inner = self.inner.lock().unwrap();
        let question = inner
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| QeekError::Store("question not found".to_string()))?;
        question.bookmarked = bookmarked;
        Ok(question.clone())
    }

    async fn delete_question(&self, question_id: &str) -> Result<(), QeekError> {
        let mut inner = self.inner.lock().unwrap();
        inner.questions.retain(|q| q.id != question_id);
        inner.messages.retain(|m| m.question_id != question_id);
        inner.diagnoses.retain(|d| d.question_id != question_id);
        Ok(())
    }
}

/// Completion service with a fixed scripted behavior.
struct Scripted {
    delay: Duration,
    behavior: Behavior,
}

#[derive(Clone)]
enum Behavior {
    Text(String),
    FailTimeout,
    FailNetwork,
}

#[async_trait]
impl CompletionService for Scripted {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &[ChatMessage],
        _params: CompletionParams,
    ) -> Result<String, CompletionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            Behavior::Text(text) => Ok(text.clone()),
            Behavior::FailTimeout => Err(CompletionError::Timeout("scripted".to_string())),
            Behavior::FailNetwork => Err(CompletionError::Network("scripted".to_string())),
        }
    }
}

fn scripted(text: &str) -> Arc<dyn CompletionService> {
    Arc::new(Scripted {
        delay: Duration::ZERO,
        behavior: Behavior::Text(text.to_string()),
    })
}

fn slow(delay: Duration, text: &str) -> Arc<dyn CompletionService> {
    Arc::new(Scripted {
        delay,
        behavior: Behavior::Text(text.to_string()),
    })
}

fn failing(behavior: Behavior) -> Arc<dyn CompletionService> {
    Arc::new(Scripted { delay: Duration::ZERO, behavior })
}

/// Completion service that replays a queue of outcomes, one per call.
struct Sequenced {
    outcomes: Mutex<VecDeque<Result<String, ()>>>,
}

#[async_trait]
impl CompletionService for Sequenced {
    async fn complete(
        &self,
        _system_prompt: &str,
        _history: &[ChatMessage],
        _params: CompletionParams,
    ) -> Result<String, CompletionError> {
        match self.outcomes.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(())) | None => Err(CompletionError::Unknown("script exhausted".to_string())),
        }
    }
}

fn default_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        first_reply_timeout: Duration::from_secs(15),
        trigger_threshold: 3,
        diagnose_once: false,
    }
}

fn build_orchestrator(
    store: Arc<FakeStore>,
    response: Option<Arc<dyn CompletionService>>,
    diagnosis: Option<Arc<dyn CompletionService>>,
    settings: OrchestratorSettings,
) -> (Orchestrator, ViewInvalidator) {
    let invalidator = ViewInvalidator::new();
    let orchestrator = Orchestrator::new(
        store as Arc<dyn ConversationStore>,
        Arc::new(ResponseGateway::new(response)),
        DiagnosisGateway::new(diagnosis),
        invalidator.clone(),
        settings,
    );
    (orchestrator, invalidator)
}

/// Set up a question that already holds its opening user message, without
/// going through the async first-reply path.
async fn seeded_question(store: &FakeStore, title: &str) -> String {
    let question = store.save_question(title, None).await.unwrap();
    store.save_message(&question.id, Sender::User, title).await;
    question.id
}

// ============================================================================
// Conversation start
// ============================================================================

#[tokio::test]
async fn test_start_conversation_persists_user_then_ai_message() {
    let store = FakeStore::shared();
    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("その気持ち、もう少し聞かせてください。")),
        None,
        default_settings(),
    );

    let start = orchestrator.start_conversation(TITLE).await.unwrap();
    assert_eq!(start.title, TITLE);

    start.first_reply.await.unwrap();

    let messages = store.messages_for(&start.question_id);
    assert_eq!(messages.len(), 2);
    // First message is always the user's title, verbatim.
    assert_eq!(messages[0].sender, Sender::User);
    assert_eq!(messages[0].content, TITLE);
    assert_eq!(messages[1].sender, Sender::Ai);
    assert!(!messages[1].content.is_empty());
}

#[tokio::test]
async fn test_start_conversation_without_credential_uses_default_reply() {
    let store = FakeStore::shared();
    let (orchestrator, _) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());

    let start = orchestrator.start_conversation(TITLE).await.unwrap();
    start.first_reply.await.unwrap();

    let messages = store.messages_for(&start.question_id);
    assert_eq!(messages[1].content, prompts::DEFAULT_REPLY);
}

#[tokio::test]
async fn test_start_conversation_rejects_empty_title() {
    let store = FakeStore::shared();
    let (orchestrator, _) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());

    let result = orchestrator.start_conversation("   ").await;
    assert!(matches!(result, Err(QeekError::Validation(_))));
    assert!(store.inner.lock().unwrap().questions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_first_reply_loses_race_to_fallback() {
    let store = FakeStore::shared();
    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(slow(Duration::from_secs(30), "遅すぎた返事")),
        None,
        default_settings(),
    );

    let start = orchestrator.start_conversation(TITLE).await.unwrap();
    start.first_reply.await.unwrap();

    let messages = store.messages_for(&start.question_id);
    assert_eq!(messages.len(), 2);
    // The 15s timer won; the late reply is discarded.
    assert_eq!(messages[1].content, prompts::DEFAULT_REPLY);
}

#[tokio::test]
async fn test_start_conversation_signals_both_views() {
    let store = FakeStore::shared();
    let (orchestrator, invalidator) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("返信")),
        None,
        default_settings(),
    );
    let mut rx = invalidator.subscribe();

    let start = orchestrator.start_conversation(TITLE).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), View::Chat);
    assert_eq!(rx.recv().await.unwrap(), View::Logs);

    start.first_reply.await.unwrap();
}

// ============================================================================
// Follow-up turns
// ============================================================================

#[tokio::test]
async fn test_follow_up_turn_below_threshold_skips_diagnosis() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;

    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("なるほど、詳しく教えてください。")),
        Some(scripted(DIAGNOSIS_JSON)),
        default_settings(),
    );

    let turn = orchestrator
        .send_message(&question_id, "朝起きるのがつらいんです")
        .await
        .unwrap();

    assert!(!turn.show_diagnosis);
    assert_eq!(turn.user_message.content, "朝起きるのがつらいんです");
    assert_eq!(turn.ai_message.content, "なるほど、詳しく教えてください。");
    assert_eq!(store.diagnosis_count(&question_id), 0);
    assert_eq!(store.messages_for(&question_id).len(), 3);
}

#[tokio::test]
async fn test_diagnosis_fires_at_threshold_and_repeats_each_turn() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;

    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("続けましょう。")),
        Some(scripted(DIAGNOSIS_JSON)),
        default_settings(),
    );

    // Turn 1: history is [title, follow-up] = 2 → below threshold.
    let turn1 = orchestrator.send_message(&question_id, "一通目").await.unwrap();
    assert!(!turn1.show_diagnosis);
    assert_eq!(store.diagnosis_count(&question_id), 0);

    // Turn 2: history reaches the threshold → diagnosis persisted.
    let turn2 = orchestrator.send_message(&question_id, "二通目").await.unwrap();
    assert!(turn2.show_diagnosis);
    assert_eq!(store.diagnosis_count(&question_id), 1);

    // Turn 3: the literal policy re-fires and a second row accumulates.
    let turn3 = orchestrator.send_message(&question_id, "三通目").await.unwrap();
    assert!(turn3.show_diagnosis);
    assert_eq!(store.diagnosis_count(&question_id), 2);

    // Denormalized score copied onto the question.
    assert_eq!(store.question(&question_id).unwrap().score, Some(70.0));
}

#[tokio::test]
async fn test_diagnose_once_guard_stops_reruns() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;

    let settings = OrchestratorSettings {
        diagnose_once: true,
        ..default_settings()
    };
    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("続けましょう。")),
        Some(scripted(DIAGNOSIS_JSON)),
        settings,
    );

    orchestrator.send_message(&question_id, "一通目").await.unwrap();
    let turn2 = orchestrator.send_message(&question_id, "二通目").await.unwrap();
    assert!(turn2.show_diagnosis);

    let turn3 = orchestrator.send_message(&question_id, "三通目").await.unwrap();
    assert!(!turn3.show_diagnosis);
    assert_eq!(store.diagnosis_count(&question_id), 1);
}

#[tokio::test]
async fn test_gateway_failure_still_persists_apology() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;

    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(failing(Behavior::FailTimeout)),
        None,
        default_settings(),
    );

    let turn = orchestrator.send_message(&question_id, "返事はまだですか").await.unwrap();

    // The AI message is never empty, even when generation failed.
    assert_eq!(turn.ai_message.content, prompts::TIMEOUT_FALLBACK);
    let messages = store.messages_for(&question_id);
    assert_eq!(messages.last().unwrap().sender, Sender::Ai);
    assert!(!messages.last().unwrap().content.is_empty());
}

#[tokio::test]
async fn test_network_failure_maps_to_connection_apology() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;

    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(failing(Behavior::FailNetwork)),
        None,
        default_settings(),
    );

    let turn = orchestrator.send_message(&question_id, "聞こえていますか").await.unwrap();
    assert_eq!(turn.ai_message.content, prompts::NETWORK_FALLBACK);
}

#[tokio::test]
async fn test_malformed_diagnosis_is_skipped_not_fatal() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;
    // Reach the trigger threshold first.
    store.save_message(&question_id, Sender::Ai, "初回の返信").await;

    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("続けましょう。")),
        Some(scripted("JSONではない診断結果")),
        default_settings(),
    );

    let turn = orchestrator.send_message(&question_id, "診断してください").await.unwrap();
    assert!(!turn.show_diagnosis);
    assert_eq!(store.diagnosis_count(&question_id), 0);
}

#[tokio::test]
async fn test_out_of_taxonomy_diagnosis_is_rejected() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;
    store.save_message(&question_id, Sender::Ai, "初回の返信").await;

    let bad = r#"{"classification":["転職推奨"],"weight":[100],"score":50,"summary":"s","reasons":["r"]}"#;
    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("続けましょう。")),
        Some(scripted(bad)),
        default_settings(),
    );

    let turn = orchestrator.send_message(&question_id, "診断してください").await.unwrap();
    assert!(!turn.show_diagnosis);
    assert_eq!(store.diagnosis_count(&question_id), 0);
}

#[tokio::test]
async fn test_message_store_outage_degrades_to_placeholders() {
    let store = FakeStore::shared();
    let question = store.save_question(TITLE, None).await.unwrap();
    store.message_store_down.store(true, Ordering::SeqCst);

    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("届いていますか")),
        None,
        default_settings(),
    );

    // The turn still succeeds; both records are local placeholders.
    let turn = orchestrator.send_message(&question.id, "保存できますか").await.unwrap();
    assert!(!turn.user_message.id.is_persisted());
    assert!(!turn.ai_message.id.is_persisted());
    assert!(turn.user_message.id.as_str().starts_with("temp-"));
}

#[tokio::test]
async fn test_empty_follow_up_is_rejected() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;

    let (orchestrator, _) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());

    let result = orchestrator.send_message(&question_id, "  ").await;
    assert!(matches!(result, Err(QeekError::Validation(_))));
}

#[tokio::test]
async fn test_missing_question_fails_the_turn() {
    let store = FakeStore::shared();
    let (orchestrator, _) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());

    let result = orchestrator.send_message("q-404", "だれかいますか").await;
    assert!(matches!(result, Err(QeekError::Store(_))));
}

#[tokio::test]
async fn test_diagnosis_exhausted_script_skips_quietly() {
    let store = FakeStore::shared();
    let question_id = seeded_question(&store, TITLE).await;
    store.save_message(&question_id, Sender::Ai, "初回の返信").await;

    let sequenced = Arc::new(Sequenced { outcomes: Mutex::new(VecDeque::new()) });
    let (orchestrator, _) = build_orchestrator(
        Arc::clone(&store),
        Some(scripted("続けましょう。")),
        Some(sequenced),
        default_settings(),
    );

    let turn = orchestrator.send_message(&question_id, "診断まだですか").await.unwrap();
    assert!(!turn.show_diagnosis);
}

// ============================================================================
// Bookmark / delete
// ============================================================================

#[tokio::test]
async fn test_bookmark_toggles_current_status() {
    let store = FakeStore::shared();
    let question = store.save_question(TITLE, None).await.unwrap();

    let (orchestrator, _) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());

    let bookmarked = orchestrator.toggle_bookmark(&question.id, false).await.unwrap();
    assert!(bookmarked);
    assert!(store.question(&question.id).unwrap().bookmarked);

    let bookmarked = orchestrator.toggle_bookmark(&question.id, true).await.unwrap();
    assert!(!bookmarked);
}

#[tokio::test]
async fn test_bookmark_refuses_placeholder_id() {
    let store = FakeStore::shared();
    let (orchestrator, _) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());

    let result = orchestrator.toggle_bookmark("temp-abc", false).await;
    assert!(matches!(result, Err(QeekError::Validation(_))));
}

#[tokio::test]
async fn test_delete_refuses_placeholder_id() {
    let store = FakeStore::shared();
    let (orchestrator, _) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());

    let result = orchestrator.remove_question("temp-abc").await;
    assert!(matches!(result, Err(QeekError::Validation(_))));
}

#[tokio::test]
async fn test_delete_removes_question_and_signals_logs() {
    let store = FakeStore::shared();
    let question = store.save_question(TITLE, None).await.unwrap();

    let (orchestrator, invalidator) =
        build_orchestrator(Arc::clone(&store), None, None, default_settings());
    let mut rx = invalidator.subscribe();

    orchestrator.remove_question(&question.id).await.unwrap();
    assert!(store.question(&question.id).is_none());
    assert_eq!(rx.recv().await.unwrap(), View::Logs);
}
