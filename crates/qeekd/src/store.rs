//! Persistence-service client.
//!
//! The store is an opaque remote service speaking PostgREST conventions:
//! table CRUD over HTTP plus an `exec_sql` RPC escape hatch used only for
//! schema bootstrap and test-data seeding. The daemon never owns storage;
//! the service is the sole arbiter of write ordering.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unreachable(String),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store row missing")]
    Missing,

    #[error("store response decode failed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Unreachable(e.to_string())
    }
}

/// Equality filter in the store's query syntax.
pub fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[derive(Clone)]
pub struct StoreClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl StoreClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        StoreClient {
            http_client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Store error {}: {}", status, body);
            return Err(StoreError::Status { status: status.as_u16(), body });
        }
        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    /// Insert one row and return it.
    pub async fn insert<R: DeserializeOwned>(
        &self,
        table: &str,
        row: &impl Serialize,
    ) -> Result<R, StoreError> {
        let response = self
            .authed(self.http_client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;

        let mut rows: Vec<R> = Self::check(response).await?;
        if rows.is_empty() {
            return Err(StoreError::Missing);
        }
        Ok(rows.remove(0))
    }

    /// Select rows matching the given `column=filter` pairs, optionally
    /// ordered (e.g. `created_at.asc`).
    pub async fn select<R: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        order: Option<&str>,
    ) -> Result<Vec<R>, StoreError> {
        let mut query: Vec<(&str, String)> = filters.to_vec();
        if let Some(order) = order {
            query.push(("order", order.to_string()));
        }

        let response = self
            .authed(self.http_client.get(self.table_url(table)))
            .query(&query)
            .send()
            .await?;

        Self::check(response).await
    }

    /// Select at most one row; absence is a normal outcome, not an error.
    pub async fn select_single<R: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, String)],
    ) -> Result<Option<R>, StoreError> {
        let mut rows = self.select::<R>(table, filters, None).await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows.remove(0)))
        }
    }

    /// Patch the row with the given id and return the updated row.
    pub async fn update<R: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
        patch: &Value,
    ) -> Result<R, StoreError> {
        let response = self
            .authed(self.http_client.patch(self.table_url(table)))
            .query(&[("id", eq(id))])
            .header("Prefer", "return=representation")
            .json(patch)
            .send()
            .await?;

        let mut rows: Vec<R> = Self::check(response).await?;
        if rows.is_empty() {
            return Err(StoreError::Missing);
        }
        Ok(rows.remove(0))
    }

    pub async fn delete(&self, table: &str, id: &str) -> Result<(), StoreError> {
        let response = self
            .authed(self.http_client.delete(self.table_url(table)))
            .query(&[("id", eq(id))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Store delete error {}: {}", status, body);
            return Err(StoreError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }

    /// Raw-SQL escape hatch. Schema bootstrap and seeding only.
    pub async fn exec_sql(&self, sql: &str) -> Result<(), StoreError> {
        let response = self
            .authed(
                self.http_client
                    .post(format!("{}/rest/v1/rpc/exec_sql", self.base_url)),
            )
            .json(&serde_json::json!({ "sql_query": sql }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Store exec_sql error {}: {}", status, body);
            return Err(StoreError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }
}
