//! Error Types
//!
//! Two layers, matching the seams of the crate:
//!
//! - [`BackendError`]: failures talking to the hosted platform (identity,
//!   relational store, blob storage). Status 406 from the relational store
//!   means "no row" and is handled at the call site, never surfaced.
//! - [`OpsError`]: operation-level outcomes surfaced to callers of the
//!   admin and profile services.
//!
//! Best-effort writes (audit entries, identity metadata mirrors) never
//! produce either type at the caller: their failures go to `tracing::warn!`
//! and are swallowed by design.

/// HTTP status the relational store uses for "no row matched".
pub const STATUS_NO_ROWS: u16 = 406;

/// Error talking to the hosted backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Backend answered with a non-success status
    #[error("backend returned {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, surfaced verbatim to administrators
        message: String,
    },

    /// Request never completed (connect, timeout, TLS)
    #[error("backend request failed: {0}")]
    Transport(String),

    /// Response arrived but could not be decoded
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether this is the relational store's "no row" answer (status 406).
    pub fn is_no_rows(&self) -> bool {
        matches!(self, BackendError::Http { status, .. } if *status == STATUS_NO_ROWS)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else {
            BackendError::Transport(err.to_string())
        }
    }
}

/// Operation-level error for admin and profile operations
#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    /// Caller lacks the admin capability. Fatal to the operation; the
    /// mutation must not have had any side effect when this is returned.
    #[error("Unauthorized")]
    Unauthorized,

    /// Per-client request budget exhausted
    #[error("Too many requests")]
    RateLimited {
        /// Seconds until the window resets
        retry_after_secs: u64,
    },

    /// Requested record does not exist
    #[error("Not found")]
    NotFound,

    /// Primary mutation failed at the backend; propagated, never swallowed
    #[error(transparent)]
    Backend(#[from] BackendError),
}
