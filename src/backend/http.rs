//! Shared HTTP Helpers
//!
//! Small helpers the concrete backend clients share: status checking that
//! keeps the platform's error text intact (it is surfaced verbatim to
//! administrators) and decoding with a distinct error class.

use crate::error::BackendError;

/// Turn a non-success response into [`BackendError::Http`], preserving the
/// body as the message. Success responses pass through untouched.
pub(crate) async fn expect_ok(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(BackendError::Http {
        status: status.as_u16(),
        message: if message.is_empty() {
            status.to_string()
        } else {
            message
        },
    })
}

/// Decode a JSON body, classifying failures as [`BackendError::Decode`].
pub(crate) async fn json_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, BackendError> {
    response
        .json::<T>()
        .await
        .map_err(|err| BackendError::Decode(err.to_string()))
}
