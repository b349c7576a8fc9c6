//! Auth-service client.
//!
//! Thin wrapper over the external GoTrue-style provider. A missing
//! session is a normal signed-out state, never an error; provider error
//! strings are mapped to readable messages before they reach a user.

use serde::Deserialize;
use std::time::Duration;
use tracing::error;

use qeek_common::{AuthUser, QeekError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<RawUser> for AuthUser {
    fn from(raw: RawUser) -> Self {
        AuthUser {
            id: raw.id,
            email: raw.email.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: RawUser,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, alias = "error_description", alias = "msg")]
    message: String,
}

/// A signed-in session as returned to the HTTP surface.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: AuthUser,
    pub access_token: String,
}

#[derive(Clone)]
pub struct AuthClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        AuthClient {
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: format!("{}/auth/v1", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, QeekError> {
        let response = self
            .http_client
            .post(format!("{}/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| QeekError::DependencyUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QeekError::Auth(Self::readable_failure(response).await));
        }

        let user: RawUser = response
            .json()
            .await
            .map_err(|e| QeekError::Auth(e.to_string()))?;
        Ok(user.into())
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, QeekError> {
        let response = self
            .http_client
            .post(format!("{}/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| QeekError::DependencyUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QeekError::Auth(Self::readable_failure(response).await));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| QeekError::Auth(e.to_string()))?;
        Ok(Session {
            user: token.user.into(),
            access_token: token.access_token,
        })
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), QeekError> {
        let response = self
            .http_client
            .post(format!("{}/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| QeekError::DependencyUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(QeekError::Auth(Self::readable_failure(response).await));
        }
        Ok(())
    }

    /// Look up the session user. `None` token or a rejected token are the
    /// ordinary signed-out state, so both come back as `Ok(None)`.
    pub async fn get_user(&self, access_token: Option<&str>) -> Result<Option<AuthUser>, QeekError> {
        let Some(access_token) = access_token else {
            return Ok(None);
        };

        let response = self
            .http_client
            .get(format!("{}/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| QeekError::DependencyUnavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !response.status().is_success() {
            error!("Session lookup failed: {}", response.status());
            return Ok(None);
        }

        let user: RawUser = response
            .json()
            .await
            .map_err(|e| QeekError::Auth(e.to_string()))?;
        Ok(Some(user.into()))
    }

    async fn readable_failure(response: reqwest::Response) -> String {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.message)
            .unwrap_or(body);
        readable_error_message(&message)
    }
}

/// Map provider error strings to something a person can act on.
pub fn readable_error_message(raw: &str) -> String {
    if raw.contains("auth/invalid-email") || raw.contains("invalid format") {
        return "無効なメールアドレスです".to_string();
    }
    if raw.contains("auth/wrong-password") || raw.contains("Invalid login credentials") {
        return "パスワードが間違っています".to_string();
    }
    if raw.contains("auth/user-not-found") {
        return "ユーザーが見つかりません".to_string();
    }
    if raw.contains("auth/email-already-in-use") || raw.contains("already registered") {
        return "このメールアドレスは既に使用されています".to_string();
    }
    if raw.contains("auth/weak-password") || raw.contains("at least 6 characters") {
        return "パスワードが弱すぎます。6文字以上にしてください".to_string();
    }
    if raw.trim().is_empty() {
        return "エラーが発生しました。もう一度お試しください".to_string();
    }
    raw.to_string()
}
