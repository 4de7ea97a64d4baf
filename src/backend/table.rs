//! Table Store
//!
//! Seam over the platform's relational REST surface. Operations are the
//! small subset the application uses: equality-filtered selects, inserts,
//! and upserts against named tables (`profiles`, `audit_logs`).
//!
//! Single-row selects ask for the object representation; the store answers
//! status 406 when no row matches, which decodes to `Ok(None)` here: "no
//! row" is an expected outcome, never a hard failure.

use async_trait::async_trait;

use super::http::{expect_ok, json_body};
use crate::error::BackendError;

/// Relational store contract
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Select one row by primary key. `None` when no row matches.
    async fn select_by_id(
        &self,
        table: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, BackendError>;

    /// Select every row of a table.
    async fn select_all(&self, table: &str) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Select the newest rows ordered by `order_col` descending.
    async fn select_recent(
        &self,
        table: &str,
        order_col: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, BackendError>;

    /// Append a row.
    async fn insert(&self, table: &str, row: serde_json::Value) -> Result<(), BackendError>;

    /// Insert-or-update a row keyed on the primary key. Required because
    /// profile rows are created lazily and cannot be assumed to exist.
    async fn upsert(&self, table: &str, row: serde_json::Value) -> Result<(), BackendError>;
}

/// Table store over the platform's relational REST API
#[derive(Debug, Clone)]
pub struct HttpTableStore {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl HttpTableStore {
    /// Create a store against a project base URL (no trailing slash).
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
        service_role_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            service_role_key: service_role_key.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.service_role_key)
    }

    /// Single-row select by primary key. The filter value goes through
    /// `query` so ids containing reserved characters cannot alter the
    /// filter expression.
    fn select_by_id_request(&self, table: &str, id: &str) -> reqwest::RequestBuilder {
        let filter = format!("eq.{}", id);
        self.request(reqwest::Method::GET, self.table_url(table))
            .query(&[("select", "*"), ("id", filter.as_str())])
            // Object representation: exactly one row or status 406.
            .header("Accept", "application/vnd.pgrst.object+json")
    }
}

#[async_trait]
impl TableStore for HttpTableStore {
    async fn select_by_id(
        &self,
        table: &str,
        id: &str,
    ) -> Result<Option<serde_json::Value>, BackendError> {
        let response = self.select_by_id_request(table, id).send().await?;

        match expect_ok(response).await {
            Ok(response) => Ok(Some(json_body(response).await?)),
            Err(err) if err.is_no_rows() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn select_all(&self, table: &str) -> Result<Vec<serde_json::Value>, BackendError> {
        let url = format!("{}?select=*", self.table_url(table));
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let response = expect_ok(response).await?;
        json_body(response).await
    }

    async fn select_recent(
        &self,
        table: &str,
        order_col: &str,
        limit: usize,
    ) -> Result<Vec<serde_json::Value>, BackendError> {
        let url = format!(
            "{}?select=*&order={}.desc&limit={}",
            self.table_url(table),
            order_col,
            limit
        );
        let response = self.request(reqwest::Method::GET, url).send().await?;
        let response = expect_ok(response).await?;
        json_body(response).await
    }

    async fn insert(&self, table: &str, row: serde_json::Value) -> Result<(), BackendError> {
        let response = self
            .request(reqwest::Method::POST, self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(&row)
            .send()
            .await?;
        expect_ok(response).await?;
        Ok(())
    }

    async fn upsert(&self, table: &str, row: serde_json::Value) -> Result<(), BackendError> {
        let response = self
            .request(reqwest::Method::POST, self.table_url(table))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await?;
        expect_ok(response).await?;
        Ok(())
    }
}
