//! Typed repository over the persistence service.
//!
//! `ConversationStore` is the seam the orchestrator runs against;
//! `PostgrestRepo` is the production implementation, tests use a fake.
//! Message persistence retries and then degrades to a local placeholder
//! record — a conversation never loses the user's place because the
//! store had a bad moment.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use qeek_common::{
    Diagnosis, DiagnosisShape, Message, QeekError, Question, QuestionDetails, Resource, Sender,
};

use crate::cache::TtlCache;
use crate::retry;
use crate::store::{eq, StoreClient, StoreError};

/// Message persistence retry budget: 3 attempts, 1 second apart.
const SAVE_MESSAGE_ATTEMPTS: u32 = 3;
const SAVE_MESSAGE_BACKOFF: Duration = Duration::from_secs(1);

const RESOURCES_CACHE_KEY: &str = "resources";

/// Lazy bootstrap for the feedback table; safe to run on every request.
const FEEDBACK_BOOTSTRAP_SQL: &str = "\
CREATE TABLE IF NOT EXISTS feedback (
  id UUID PRIMARY KEY DEFAULT uuid_generate_v4(),
  content TEXT NOT NULL,
  user_id UUID,
  created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);";

fn store_err(e: StoreError) -> QeekError {
    match e {
        StoreError::Unreachable(msg) => QeekError::DependencyUnavailable(msg),
        other => QeekError::Store(other.to_string()),
    }
}

/// Everything the conversation workflow needs from the store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save_question(&self, title: &str, user_id: Option<&str>)
        -> Result<Question, QeekError>;

    async fn list_questions(&self, bookmarked_only: bool) -> Result<Vec<Question>, QeekError>;

    /// Fresh read of a question with its ordered history and diagnosis.
    async fn question_details(&self, question_id: &str) -> Result<QuestionDetails, QeekError>;

    /// Append one message. Infallible by design: after the retry budget is
    /// spent a placeholder record comes back instead of an error.
    async fn save_message(&self, question_id: &str, sender: Sender, content: &str) -> Message;

    async fn save_diagnosis(
        &self,
        question_id: &str,
        shape: &DiagnosisShape,
    ) -> Result<Diagnosis, QeekError>;

    async fn update_bookmark(
        &self,
        question_id: &str,
        bookmarked: bool,
    ) -> Result<Question, QeekError>;

    async fn delete_question(&self, question_id: &str) -> Result<(), QeekError>;
}

/// Production repository backed by the PostgREST store.
pub struct PostgrestRepo {
    client: StoreClient,
    resource_cache: TtlCache<Vec<Resource>>,
    resources_ttl: Duration,
}

impl PostgrestRepo {
    pub fn new(client: StoreClient, resources_ttl: Duration) -> Self {
        PostgrestRepo {
            client,
            resource_cache: TtlCache::new(),
            resources_ttl,
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// The resource catalog, memoized for `resources_ttl`. Store failures
    /// degrade to an empty catalog rather than breaking the page.
    pub async fn resources(&self) -> Vec<Resource> {
        let fetched: Result<Vec<Resource>, StoreError> = self
            .resource_cache
            .get_or_fetch(RESOURCES_CACHE_KEY, Some(self.resources_ttl), || async {
                Ok(match self.client.select::<Resource>("resources", &[], None).await {
                    Ok(rows) => rows,
                    Err(e) => {
                        error!("Resource catalog fetch failed: {}", e);
                        Vec::new()
                    }
                })
            })
            .await;

        fetched.unwrap_or_default()
    }

    /// Drop the memoized catalog; called after seeding mutates it.
    pub fn invalidate_resources(&self) {
        self.resource_cache.delete(RESOURCES_CACHE_KEY);
    }

    /// Store user feedback, creating the table on first use.
    pub async fn save_feedback(&self, content: &str) -> Result<(), QeekError> {
        self.client
            .exec_sql(FEEDBACK_BOOTSTRAP_SQL)
            .await
            .map_err(store_err)?;

        let _: serde_json::Value = self
            .client
            .insert("feedback", &json!({ "content": content }))
            .await
            .map_err(store_err)?;
        Ok(())
    }

    pub fn client(&self) -> &StoreClient {
        &self.client
    }
}

#[async_trait]
impl ConversationStore for PostgrestRepo {
    async fn save_question(
        &self,
        title: &str,
        user_id: Option<&str>,
    ) -> Result<Question, QeekError> {
        self.client
            .insert(
                "questions",
                &json!({
                    "title": title,
                    "user_id": user_id,
                    "score": null,
                    "bookmarked": false,
                }),
            )
            .await
            .map_err(store_err)
    }

    async fn list_questions(&self, bookmarked_only: bool) -> Result<Vec<Question>, QeekError> {
        let mut filters: Vec<(&str, String)> = Vec::new();
        if bookmarked_only {
            filters.push(("bookmarked", eq("true")));
        }

        self.client
            .select("questions", &filters, Some("created_at.desc"))
            .await
            .map_err(store_err)
    }

    async fn question_details(&self, question_id: &str) -> Result<QuestionDetails, QeekError> {
        let question: Question = self
            .client
            .select_single("questions", &[("id", eq(question_id))])
            .await
            .map_err(store_err)?
            .ok_or_else(|| QeekError::Store(format!("question {} not found", question_id)))?;

        // A history read failure is logged, not fatal; the question page
        // can still render.
        let messages = match self
            .client
            .select::<Message>(
                "messages",
                &[("question_id", eq(question_id))],
                Some("created_at.asc"),
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                error!("Message history fetch failed: {}", e);
                Vec::new()
            }
        };

        // Missing diagnosis is the normal state before the trigger fires.
        let diagnosis = match self
            .client
            .select_single::<Diagnosis>("diagnoses", &[("question_id", eq(question_id))])
            .await
        {
            Ok(diagnosis) => diagnosis,
            Err(e) => {
                error!("Diagnosis fetch failed: {}", e);
                None
            }
        };

        Ok(QuestionDetails { question, messages, diagnosis })
    }

    async fn save_message(&self, question_id: &str, sender: Sender, content: &str) -> Message {
        let row = json!({
            "question_id": question_id,
            "sender": sender,
            "content": content,
        });

        let saved = retry::with_backoff(SAVE_MESSAGE_ATTEMPTS, SAVE_MESSAGE_BACKOFF, || {
            self.client.insert::<Message>("messages", &row)
        })
        .await;

        match saved {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Message persistence failed after {} attempts, returning placeholder: {}",
                    SAVE_MESSAGE_ATTEMPTS, e
                );
                Message::placeholder(question_id, sender, content)
            }
        }
    }

    async fn save_diagnosis(
        &self,
        question_id: &str,
        shape: &DiagnosisShape,
    ) -> Result<Diagnosis, QeekError> {
        let diagnosis: Diagnosis = self
            .client
            .insert(
                "diagnoses",
                &json!({
                    "question_id": question_id,
                    "classification": shape.classification,
                    "weight": shape.weight,
                    "score": shape.score,
                    "summary": shape.summary,
                    "reasons": shape.reasons,
                }),
            )
            .await
            .map_err(store_err)?;

        // Denormalized score for list display; losing it never fails the turn.
        if let Err(e) = self
            .client
            .update::<Question>("questions", question_id, &json!({ "score": shape.score }))
            .await
        {
            warn!("Question score update failed: {}", e);
        }

        Ok(diagnosis)
    }

    async fn update_bookmark(
        &self,
        question_id: &str,
        bookmarked: bool,
    ) -> Result<Question, QeekError> {
        self.client
            .update("questions", question_id, &json!({ "bookmarked": bookmarked }))
            .await
            .map_err(store_err)
    }

    async fn delete_question(&self, question_id: &str) -> Result<(), QeekError> {
        self.client
            .delete("questions", question_id)
            .await
            .map_err(store_err)
    }
}
