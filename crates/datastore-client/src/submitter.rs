// Datastore write path.
//
// `ValueSubmitter` turns a `SubmissionRequest` into one HTTP write against
// `{host}/api/hub/{hub}/datastores/{target}` and classifies whatever comes
// back into exactly one `SubmissionOutcome`. Nothing escapes as an error:
// transport failures, bad statuses and unparseable bodies all become
// `SubmissionOutcome::TransportError`.
//
// The HTTP call itself goes through the `Transport` trait so the
// classification logic can be exercised without sockets.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::protocol::{SubmissionOutcome, SubmissionRequest, SubmitResponse};

/// Detail used when a success response does not carry a usable result.
pub const MALFORMED_BODY: &str = "malformed response body";

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// A fully built request, ready to hand to a transport.
#[derive(Debug, Clone)]
pub struct WriteRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// What a transport got back when the server answered at all.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    /// Reason phrase from the status line when it differs from the
    /// canonical one for `status`.
    pub reason: Option<String>,
    /// Response body as text. `None` if it could not be read.
    pub body: Option<String>,
}

/// The request never produced a response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        let chain = error_chain(&err);
        if err.is_connect() {
            TransportFailure::Connect(chain)
        } else if err.is_timeout() {
            TransportFailure::Timeout(chain)
        } else {
            TransportFailure::Other(chain)
        }
    }
}

/// Sends one request and returns the raw response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: WriteRequest) -> Result<TransportResponse, TransportFailure>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: WriteRequest) -> Result<TransportResponse, TransportFailure> {
        self.as_ref().send(request).await
    }
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: WriteRequest) -> Result<TransportResponse, TransportFailure> {
        let mut builder = self
            .http
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let reason = response
            .extensions()
            .get::<hyper::ext::ReasonPhrase>()
            .map(|phrase| String::from_utf8_lossy(phrase.as_bytes()).into_owned());
        let body = match response.text().await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(%status, "failed to read response body: {}", error_chain(&e));
                None
            }
        };

        Ok(TransportResponse {
            status,
            reason,
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// ValueSubmitter
// ---------------------------------------------------------------------------

/// Client-side write path for datastore values.
///
/// Cheap to clone; clones share the configuration and the transport's
/// connection pool. Each call is independent: no retries, no caching, no
/// state left behind.
#[derive(Debug, Clone)]
pub struct ValueSubmitter<T = HttpTransport> {
    config: Arc<ClientConfig>,
    transport: T,
}

impl ValueSubmitter<HttpTransport> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_transport(config, HttpTransport::default())
    }
}

impl<T: Transport> ValueSubmitter<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Write `request.value` to its datastore and classify the result.
    pub async fn submit(&self, request: &SubmissionRequest) -> SubmissionOutcome {
        let target = request.target_id();

        let body = match serde_json::to_vec(&request.body()) {
            Ok(body) => body,
            Err(e) => {
                let outcome =
                    SubmissionOutcome::transport(format!("failed to encode request body: {e}"));
                log_outcome("submit", target, &outcome);
                return outcome;
            }
        };

        let mut headers = self.config.headers.clone();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let write = WriteRequest {
            method: self.config.method.clone(),
            url: self.config.datastore_url(target),
            headers,
            body: Some(body),
        };
        debug!(
            target_id = target,
            format = request.format(),
            method = %write.method,
            url = %write.url,
            "submitting datastore value"
        );

        let outcome = match self.transport.send(write).await {
            Ok(response) => classify_write(response),
            Err(failure) => SubmissionOutcome::transport(failure.to_string()),
        };
        log_outcome("submit", target, &outcome);
        outcome
    }

    /// Delete a datastore. Any 2xx counts as accepted; the body is ignored.
    pub async fn delete(&self, target_id: &str) -> SubmissionOutcome {
        if target_id.trim().is_empty() {
            let outcome = SubmissionOutcome::transport("datastore target id must not be empty");
            log_outcome("delete", target_id, &outcome);
            return outcome;
        }

        let write = WriteRequest {
            method: Method::DELETE,
            url: self.config.datastore_url(target_id),
            headers: self.config.headers.clone(),
            body: None,
        };
        debug!(target_id, url = %write.url, "deleting datastore");

        let outcome = match self.transport.send(write).await {
            Ok(response) if response.status.is_success() => SubmissionOutcome::Accepted,
            Ok(response) => status_error(&response),
            Err(failure) => SubmissionOutcome::transport(failure.to_string()),
        };
        log_outcome("delete", target_id, &outcome);
        outcome
    }
}

// ---------------------------------------------------------------------------
// Classification helpers
// ---------------------------------------------------------------------------

/// Classify the response to a value write.
pub(crate) fn classify_write(response: TransportResponse) -> SubmissionOutcome {
    if !response.status.is_success() {
        return status_error(&response);
    }

    let parsed = response.body.as_deref().and_then(parse_submit_response);

    match parsed {
        Some(SubmitResponse { accepted: true, .. }) => SubmissionOutcome::Accepted,
        Some(SubmitResponse {
            accepted: false,
            reason,
        }) => SubmissionOutcome::Rejected {
            reason: reason.unwrap_or_default(),
        },
        None => SubmissionOutcome::transport(MALFORMED_BODY),
    }
}

/// Only a JSON object is a result. Derived struct deserialization would also
/// take a sequence, so `[true]` has to be turned away here.
fn parse_submit_response(body: &str) -> Option<SubmitResponse> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if !value.is_object() {
        return None;
    }
    SubmitResponse::deserialize(value).ok()
}

/// `"<reason phrase> (<code>)"`, plus `": <body>"` when the server sent one.
///
/// The phrase the server sent wins over the canonical one.
pub(crate) fn status_error(response: &TransportResponse) -> SubmissionOutcome {
    let status = response.status;
    let reason = response
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .or_else(|| status.canonical_reason())
        .unwrap_or("HTTP");
    let mut detail = format!("{reason} ({})", status.as_u16());
    if let Some(body) = response.body.as_deref().map(str::trim) {
        if !body.is_empty() {
            detail.push_str(": ");
            detail.push_str(body);
        }
    }
    SubmissionOutcome::TransportError { detail }
}

/// Render an error and all of its sources as `outer: inner: root`.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if parts.last() != Some(&text) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}

fn log_outcome(op: &str, target_id: &str, outcome: &SubmissionOutcome) {
    match outcome {
        SubmissionOutcome::Accepted => info!(op, target_id, "datastore write accepted"),
        SubmissionOutcome::Rejected { reason } => {
            warn!(op, target_id, reason = reason.as_str(), "datastore write rejected")
        }
        SubmissionOutcome::TransportError { detail } => {
            warn!(op, target_id, detail = detail.as_str(), "datastore write failed")
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
