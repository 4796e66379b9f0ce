//! Shared plumbing for the REST adapters (Pinecone, Cohere, Tavily).

use ragweave_kernel::error::{RagError, RagResult};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Request timeout used when a caller configures none.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

pub(crate) fn build_client(timeout_secs: u64) -> RagResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RagError::Configuration(format!("HTTP client: {e}")))
}

/// Maps a transport error into the caller's error kind.
pub(crate) fn map_error(err: reqwest::Error, kind: fn(String) -> RagError) -> RagError {
    if err.is_timeout() {
        kind(format!("request timed out: {err}"))
    } else if err.is_connect() {
        kind(format!("connection failed: {err}"))
    } else {
        kind(err.to_string())
    }
}

/// Reads a response body, turning non-success statuses into errors that
/// carry the status code and body.
pub(crate) async fn read_body(
    resp: reqwest::Response,
    kind: fn(String) -> RagError,
) -> RagResult<String> {
    let status = resp.status();
    let text = resp.text().await.map_err(|e| map_error(e, kind))?;
    if !status.is_success() {
        return Err(kind(format!("HTTP {}: {}", status.as_u16(), text.trim())));
    }
    Ok(text)
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    resp: reqwest::Response,
    kind: fn(String) -> RagError,
) -> RagResult<T> {
    let text = read_body(resp, kind).await?;
    serde_json::from_str(&text).map_err(|e| kind(format!("unexpected response: {e}")))
}

/// Rejects blank credentials before any request is built.
pub(crate) fn require_key(service: &str, api_key: &str) -> RagResult<()> {
    if api_key.trim().is_empty() {
        return Err(RagError::Configuration(format!("{service} API key is empty")));
    }
    Ok(())
}
