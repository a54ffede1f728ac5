//! HTTP forwarding of decoded messages to the upstream endpoint.

use std::time::Instant;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;

use crate::error::ForwardError;
use crate::jsonrpc::{json_type_name, Envelope};

use super::RelaySession;

/// Forwards one message at a time to the session's target endpoint.
///
/// Borrows the session for its HTTP client, cancellation token, and
/// diagnostics handle; holds no state of its own. The client is stateless
/// per call, so a single forwarder serves the whole session without locking.
pub struct Forwarder<'a> {
    session: &'a RelaySession,
}

impl<'a> Forwarder<'a> {
    pub fn new(session: &'a RelaySession) -> Self {
        Self { session }
    }

    /// POST one request and decode the response body.
    ///
    /// The exchange is bounded two ways: the client's overall timeout
    /// (configured at session construction) and the session's cancellation
    /// token, which aborts an in-flight call instead of letting it run to
    /// its timeout during shutdown.
    ///
    /// On success the decoded response object is returned unmodified: no
    /// reinterpretation of its `id`, `result`, or `error` members. A non-2xx
    /// status with a decodable JSON object body is still a success at this
    /// layer: the upstream speaks JSON-RPC and its errors ride in-band.
    ///
    /// # Errors
    ///
    /// Any transport failure, unreadable body, or body that is not a JSON
    /// object yields a [`ForwardError`]; a partially-decoded message is
    /// never returned.
    pub async fn forward(&self, request: &Envelope) -> Result<Envelope, ForwardError> {
        let body = serde_json::to_string(request).map_err(ForwardError::Serialize)?;
        let diagnostics = &self.session.diagnostics;
        diagnostics.record(&format!("HTTP request body: {body}"));

        let shutdown = self.session.lifecycle.shutdown_token();
        let exchange = async {
            let started = Instant::now();
            let response = self
                .session
                .client
                .post(self.session.target_url.as_str())
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "application/json")
                .body(body)
                .send()
                .await
                .map_err(ForwardError::Transport)?;
            let status = response.status();
            let bytes = response.bytes().await.map_err(ForwardError::Body)?;
            Ok::<_, ForwardError>((status, started.elapsed(), bytes))
        };

        let (status, elapsed, bytes) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Err(ForwardError::Cancelled),
            result = exchange => result?,
        };

        diagnostics.record(&format!(
            "HTTP response received in {elapsed:?} - status: {status}"
        ));
        diagnostics.record(&format!(
            "HTTP response body: {}",
            String::from_utf8_lossy(&bytes)
        ));

        let value: Value =
            serde_json::from_slice(&bytes).map_err(|e| ForwardError::Decode {
                reason: e.to_string(),
            })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ForwardError::Decode {
                reason: format!("expected a JSON object, got {}", json_type_name(&other)),
            }),
        }
    }
}
