//! Admin Gateway HTTP Server
//!
//! Exposes the privileged admin operations and the signed-in user's
//! profile operations as an HTTP surface. Sessions are bearer tokens
//! resolved through the identity backend; every request passes the
//! per-client-IP rate limiter first. Mutations answer
//! `{"success": true}` or an error message the caller surfaces verbatim.

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::admin::AdminService;
use crate::backend::{BlobStore, Identity, IdentityStore, Role, TableStore};
use crate::error::OpsError;
use crate::profile::{ProfileService, ProfileUpdate};
use crate::rate_limit::{RateDecision, RateLimiter};

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    identity: Arc<dyn IdentityStore>,
    admin: AdminService,
    profiles: ProfileService,
    limiter: RateLimiter,
    /// Derived online set from the presence feed; stays empty when no
    /// feed is attached.
    online: watch::Receiver<Vec<String>>,
}

impl AppState {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        tables: Arc<dyn TableStore>,
        blobs: Arc<dyn BlobStore>,
        limiter: RateLimiter,
        online: watch::Receiver<Vec<String>>,
    ) -> Self {
        Self {
            admin: AdminService::new(identity.clone(), tables.clone()),
            profiles: ProfileService::new(tables, blobs),
            identity,
            limiter,
            online,
        }
    }
}

impl IntoResponse for OpsError {
    fn into_response(self) -> Response {
        let status = match &self {
            OpsError::Unauthorized => StatusCode::FORBIDDEN,
            OpsError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            OpsError::NotFound => StatusCode::NOT_FOUND,
            // The backend's own message passes through untouched.
            OpsError::Backend(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/users", get(list_users))
        .route("/admin/users/{id}", delete(delete_user))
        .route("/admin/users/{id}/role", post(update_role))
        .route("/admin/audit", get(recent_audit))
        .route("/admin/presence", get(presence))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/profile/avatar", post(upload_avatar))
        .route("/profile/avatar/{path}", get(download_avatar))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("Starting admin gateway on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind gateway server")?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Gateway server error")?;

    Ok(())
}

/// Client identifier for rate limiting: first `x-forwarded-for` entry,
/// then the peer address, then a loopback fallback.
fn client_id(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request);
    match state.limiter.check(&client).await {
        RateDecision::Allowed { .. } => next.run(request).await,
        RateDecision::Denied { retry_after_secs } => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, retry_after_secs.to_string())],
            "Too many requests",
        )
            .into_response(),
    }
}

/// Resolve the session behind the bearer token, or answer 401.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Identity, Response> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(unauthorized("Missing bearer token"));
    };

    match state.identity.current_user(token).await {
        Ok(Some(identity)) => Ok(identity),
        Ok(None) => Err(unauthorized("Invalid or expired session")),
        Err(err) => Err(OpsError::Backend(err).into_response()),
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn success() -> Response {
    Json(serde_json::json!({ "success": true })).into_response()
}

async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match authenticate(&state, &headers).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state.admin.list_users(&actor).await {
        Ok(users) => Json(users).into_response(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct RoleBody {
    role: Role,
}

async fn update_role(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<RoleBody>,
) -> Response {
    let actor = match authenticate(&state, &headers).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state.admin.update_user_role(&actor, &user_id, body.role).await {
        Ok(()) => success(),
        Err(err) => err.into_response(),
    }
}

async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let actor = match authenticate(&state, &headers).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state.admin.delete_user(&actor, &user_id).await {
        Ok(()) => success(),
        Err(err) => err.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

async fn recent_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
    headers: HeaderMap,
) -> Response {
    let actor = match authenticate(&state, &headers).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let limit = query.limit.unwrap_or(20);
    match state.admin.recent_audit(&actor, limit).await {
        Ok(entries) => Json(entries).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn presence(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = authenticate(&state, &headers).await {
        return response;
    }
    let online = state.online.borrow().clone();
    Json(serde_json::json!({ "online": online })).into_response()
}

async fn get_profile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let actor = match authenticate(&state, &headers).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state.profiles.get(&actor.id).await {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(update): Json<ProfileUpdate>,
) -> Response {
    let actor = match authenticate(&state, &headers).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    match state.profiles.update(&actor.id, update).await {
        Ok(()) => success(),
        Err(err) => err.into_response(),
    }
}

/// File extension for an uploaded avatar, from its content type.
fn avatar_extension(headers: &HeaderMap) -> &'static str {
    match headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        Some("image/png") => "png",
        Some("image/jpeg") => "jpg",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        _ => "bin",
    }
}

async fn upload_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let actor = match authenticate(&state, &headers).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };
    let extension = avatar_extension(&headers);
    match state.profiles.upload_avatar(&actor.id, extension, body).await {
        Ok(path) => {
            let url = state.profiles.avatar_url(&path);
            Json(serde_json::json!({ "path": path, "url": url })).into_response()
        }
        Err(err) => err.into_response(),
    }
}

async fn download_avatar(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authenticate(&state, &headers).await {
        return response;
    }
    match state.profiles.download_avatar(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            bytes,
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}
