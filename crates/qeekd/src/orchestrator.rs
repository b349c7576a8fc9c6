//! Conversation orchestrator.
//!
//! Sequences message persistence, AI generation, diagnosis and view
//! invalidation for one question. The rule throughout: never block the
//! user on the AI subsystem. User-message persistence is the only hard
//! failure; everything downstream degrades to a logged warning plus a
//! safe default.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use qeek_common::conversation::PLACEHOLDER_PREFIX;
use qeek_common::{ChatMessage, Message, QeekError, Sender};

use crate::config::Config;
use crate::db::ConversationStore;
use crate::gateway::{DiagnosisGateway, ResponseGateway};
use crate::policy;
use crate::prompts;
use crate::signal::{View, ViewInvalidator};

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    /// Budget for the first reply's race on conversation start. The same
    /// configured value caps every completion call inside the client.
    pub first_reply_timeout: Duration,
    pub trigger_threshold: usize,
    pub diagnose_once: bool,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        OrchestratorSettings {
            first_reply_timeout: Duration::from_secs(config.llm.reply_timeout_secs),
            trigger_threshold: config.diagnosis.trigger_threshold,
            diagnose_once: config.diagnosis.diagnose_once,
        }
    }
}

/// Result of starting a conversation. The caller gets its id immediately;
/// `first_reply` is the detached task persisting the opening AI message.
/// HTTP callers drop the handle, tests await it.
pub struct ConversationStart {
    pub question_id: String,
    pub title: String,
    pub first_reply: JoinHandle<()>,
}

/// Result of one follow-up turn.
#[derive(Debug)]
pub struct Turn {
    pub user_message: Message,
    pub ai_message: Message,
    pub show_diagnosis: bool,
}

pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    responder: Arc<ResponseGateway>,
    diagnoser: DiagnosisGateway,
    invalidator: ViewInvalidator,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        responder: Arc<ResponseGateway>,
        diagnoser: DiagnosisGateway,
        invalidator: ViewInvalidator,
        settings: OrchestratorSettings,
    ) -> Self {
        Orchestrator { store, responder, diagnoser, invalidator, settings }
    }

    /// Start a conversation: persist the question and its first message,
    /// then generate the opening reply off the caller's path.
    pub async fn start_conversation(&self, title: &str) -> Result<ConversationStart, QeekError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(QeekError::Validation("問いを入力してください".to_string()));
        }

        let question = self.store.save_question(title, None).await.map_err(|e| {
            error!("Question creation failed: {}", e);
            QeekError::Store("問いの作成に失敗しました".to_string())
        })?;

        // The first message of every conversation is the title, verbatim.
        self.store
            .save_message(&question.id, Sender::User, title)
            .await;

        let first_reply = self.spawn_first_reply(question.id.clone(), title.to_string());

        self.invalidator.invalidate(View::Chat);
        self.invalidator.invalidate(View::Logs);

        Ok(ConversationStart {
            question_id: question.id,
            title: question.title,
            first_reply,
        })
    }

    /// Race the opening reply against the reply timeout. The generation
    /// task is not cancelled when the timer wins; its late result is
    /// discarded, the cost already spent.
    fn spawn_first_reply(&self, question_id: String, title: String) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let responder = Arc::clone(&self.responder);
        let invalidator = self.invalidator.clone();
        let timeout = self.settings.first_reply_timeout;

        tokio::spawn(async move {
            let generation = tokio::spawn(async move {
                let history = vec![ChatMessage::user(title)];
                responder.generate(&history).await
            });

            let content = match tokio::time::timeout(timeout, generation).await {
                Ok(Ok(reply)) => reply.content().to_string(),
                Ok(Err(e)) => {
                    error!("First reply task failed: {}", e);
                    prompts::DEFAULT_REPLY.to_string()
                }
                Err(_) => {
                    warn!("First reply timed out after {:?}, using default", timeout);
                    prompts::DEFAULT_REPLY.to_string()
                }
            };

            // Conversation creation already succeeded; a lost AI message
            // is logged inside save_message, never surfaced.
            store.save_message(&question_id, Sender::Ai, &content).await;
            invalidator.invalidate(View::Chat);
        })
    }

    /// One follow-up turn: user message in, AI message out, diagnosis when
    /// the conversation is long enough.
    pub async fn send_message(&self, question_id: &str, content: &str) -> Result<Turn, QeekError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(QeekError::Validation("メッセージを入力してください".to_string()));
        }

        let user_message = self
            .store
            .save_message(question_id, Sender::User, content)
            .await;

        // Fresh read, never cached: the history snapshot for this turn.
        let details = self.store.question_details(question_id).await.map_err(|e| {
            error!("History load failed for {}: {}", question_id, e);
            QeekError::Store("会話履歴の取得に失敗しました".to_string())
        })?;

        let history = ChatMessage::history(&details.messages);

        let reply = self.responder.generate(&history).await;
        if reply.is_degraded() {
            warn!("Turn reply degraded for question {}", question_id);
        }

        let ai_message = self
            .store
            .save_message(question_id, Sender::Ai, reply.content())
            .await;

        let show_diagnosis = self.maybe_diagnose(question_id, &details, &history).await;

        self.invalidator.invalidate(View::Chat);

        Ok(Turn { user_message, ai_message, show_diagnosis })
    }

    /// Evaluate the trigger policy and run diagnosis when it fires.
    /// Nothing in here may fail the turn.
    async fn maybe_diagnose(
        &self,
        question_id: &str,
        details: &qeek_common::QuestionDetails,
        history: &[ChatMessage],
    ) -> bool {
        let message_count = details.messages.len();
        if !policy::should_diagnose(message_count, self.settings.trigger_threshold) {
            return false;
        }

        if self.settings.diagnose_once && details.diagnosis.is_some() {
            debug!("Question {} already diagnosed, guard active", question_id);
            return false;
        }

        match self.diagnoser.diagnose(&details.question.title, history).await {
            Ok(shape) => {
                info!(
                    "Diagnosis for {}: score {}, {:?}",
                    question_id, shape.score, shape.classification
                );
                if let Err(e) = self.store.save_diagnosis(question_id, &shape).await {
                    warn!("Diagnosis persistence failed for {}: {}", question_id, e);
                }
                true
            }
            Err(e) => {
                warn!("Diagnosis skipped for {}: {}", question_id, e);
                false
            }
        }
    }

    /// Toggle the bookmark flag. Refuses records that were never durably
    /// stored.
    pub async fn toggle_bookmark(
        &self,
        question_id: &str,
        current_status: bool,
    ) -> Result<bool, QeekError> {
        Self::require_persisted(question_id)?;

        let question = self
            .store
            .update_bookmark(question_id, !current_status)
            .await
            .map_err(|e| {
                error!("Bookmark update failed: {}", e);
                QeekError::Store("ブックマークの更新に失敗しました".to_string())
            })?;

        self.invalidator.invalidate(View::Chat);
        self.invalidator.invalidate(View::Logs);

        Ok(question.bookmarked)
    }

    pub async fn remove_question(&self, question_id: &str) -> Result<(), QeekError> {
        Self::require_persisted(question_id)?;

        self.store.delete_question(question_id).await.map_err(|e| {
            error!("Question deletion failed: {}", e);
            QeekError::Store("問いの削除に失敗しました".to_string())
        })?;

        self.invalidator.invalidate(View::Logs);
        Ok(())
    }

    fn require_persisted(question_id: &str) -> Result<(), QeekError> {
        if question_id.starts_with(PLACEHOLDER_PREFIX) {
            return Err(QeekError::Validation(
                "保存されていない項目は操作できません".to_string(),
            ));
        }
        Ok(())
    }
}
