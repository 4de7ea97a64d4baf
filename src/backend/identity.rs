//! Identity Store
//!
//! Seam over the hosted auth service. The trait carries exactly the
//! contract the rest of the crate depends on: session resolution, user
//! listing/lookup, deletion (which the platform cascades into dependent
//! rows), and the best-effort metadata mirror.
//!
//! [`HttpIdentityStore`] talks to the platform's auth REST surface with
//! the service role key; per-session calls carry the caller's access
//! token instead.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http::{expect_ok, json_body};
use super::types::Identity;
use crate::error::BackendError;

/// Identity backend contract
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Resolve the identity behind a session access token.
    ///
    /// Returns `None` for unknown or expired tokens rather than an error,
    /// so callers can turn it into their own unauthorized answer.
    async fn current_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError>;

    /// List every identity record (privileged).
    async fn list_users(&self) -> Result<Vec<Identity>, BackendError>;

    /// Look up one identity by id (privileged). `None` when absent.
    async fn user_by_id(&self, id: &str) -> Result<Option<Identity>, BackendError>;

    /// Delete an identity record (privileged). The platform cascades the
    /// deletion into dependent rows such as the profile.
    async fn delete_user(&self, id: &str) -> Result<(), BackendError>;

    /// Replace the identity record's user metadata (privileged).
    async fn update_user_metadata(
        &self,
        id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), BackendError>;
}

/// Identity store over the platform's auth REST API
#[derive(Debug, Clone)]
pub struct HttpIdentityStore {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

/// Envelope the admin listing endpoint wraps its page in
#[derive(Debug, Deserialize)]
struct UserPage {
    users: Vec<Identity>,
}

impl HttpIdentityStore {
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

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.base_url, path)
    }

    /// Request builder for privileged admin endpoints.
    fn admin_request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.auth_url(path))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.service_role_key)
    }
}

#[async_trait]
impl IdentityStore for HttpIdentityStore {
    async fn current_user(&self, access_token: &str) -> Result<Option<Identity>, BackendError> {
        let response = self
            .client
            .get(self.auth_url("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        // The auth service answers 401/403 for bad or expired tokens.
        if response.status().as_u16() == 401 || response.status().as_u16() == 403 {
            debug!("session token rejected by auth service");
            return Ok(None);
        }

        let response = expect_ok(response).await?;
        Ok(Some(json_body(response).await?))
    }

    async fn list_users(&self) -> Result<Vec<Identity>, BackendError> {
        let response = self
            .admin_request(reqwest::Method::GET, "/admin/users")
            .send()
            .await?;
        let response = expect_ok(response).await?;
        let page: UserPage = json_body(response).await?;
        Ok(page.users)
    }

    async fn user_by_id(&self, id: &str) -> Result<Option<Identity>, BackendError> {
        let response = self
            .admin_request(reqwest::Method::GET, &format!("/admin/users/{}", id))
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }

        let response = expect_ok(response).await?;
        Ok(Some(json_body(response).await?))
    }

    async fn delete_user(&self, id: &str) -> Result<(), BackendError> {
        let response = self
            .admin_request(reqwest::Method::DELETE, &format!("/admin/users/{}", id))
            .send()
            .await?;
        expect_ok(response).await?;
        Ok(())
    }

    async fn update_user_metadata(
        &self,
        id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), BackendError> {
        let response = self
            .admin_request(reqwest::Method::PUT, &format!("/admin/users/{}", id))
            .json(&serde_json::json!({ "user_metadata": metadata }))
            .send()
            .await?;
        expect_ok(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let store = HttpIdentityStore::new(
            reqwest::Client::new(),
            "https://abc.supabase.co/",
            "anon",
            "service",
        );
        assert_eq!(
            store.auth_url("/admin/users"),
            "https://abc.supabase.co/auth/v1/admin/users"
        );
    }

    #[test]
    fn test_user_page_decoding() {
        let page: UserPage = serde_json::from_value(serde_json::json!({
            "users": [{
                "id": "u1",
                "email": "a@x.com",
                "created_at": "2024-01-01T00:00:00Z",
                "last_sign_in_at": null,
                "user_metadata": {"role": "admin"}
            }],
            "aud": "authenticated"
        }))
        .unwrap();
        assert_eq!(page.users.len(), 1);
        assert_eq!(page.users[0].email.as_deref(), Some("a@x.com"));
    }
}
