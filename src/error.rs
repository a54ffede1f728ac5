//! Error types for the relay, layered by where the failure occurs.
//!
//! `FramingError` covers the inbound line stream: size limits, malformed
//! JSON, non-object payloads, and IO. `ForwardError` covers the upstream
//! HTTP exchange. `RelayError` covers failures that end the session:
//! startup problems and fatal stream errors.
//!
//! The split matters for recovery policy: framing and forwarding errors are
//! answered on the outbound stream with a JSON-RPC error envelope and the
//! relay keeps running; `RelayError` escapes to the lifecycle controller and
//! triggers shutdown.

/// Errors that can occur while reading or decoding one inbound line.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// A single line exceeds the configured maximum size.
    ///
    /// Checked while reading, before any JSON parsing, so a newline-less
    /// flood cannot allocate an oversized value tree.
    #[error("message exceeds maximum size of {max_bytes} bytes")]
    MessageTooLarge {
        /// The configured maximum line size in bytes.
        max_bytes: usize,
    },

    /// The line is not valid JSON.
    #[error("malformed JSON: {reason}")]
    MalformedJson {
        /// Human-readable description of the parse failure.
        reason: String,
    },

    /// The line parsed as JSON but is not an object, so it cannot be a
    /// JSON-RPC envelope.
    #[error("expected a JSON object, got {found}")]
    NotAnObject {
        /// JSON type name of what was found instead.
        found: &'static str,
    },

    /// An underlying IO error on the inbound stream.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while forwarding one message upstream.
///
/// Every variant is recovered locally: the relay loop converts it into a
/// `-32603` error envelope and moves on to the next line. `Cancelled` is the
/// exception: it means the session is shutting down and the loop stops.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The decoded message could not be re-serialized. A string-keyed JSON
    /// object always serializes, so this indicates a local invariant
    /// violation; it is surfaced rather than dropped.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The HTTP request could not be completed (connection failure,
    /// timeout, protocol error).
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The response status arrived but the body could not be read.
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The response body is not a JSON object.
    #[error("malformed response JSON: {reason}")]
    Decode {
        /// Human-readable description of the decode failure.
        reason: String,
    },

    /// The session's cancellation signal fired while the call was in
    /// flight; the call was aborted rather than awaited to its timeout.
    #[error("request aborted by shutdown")]
    Cancelled,
}

/// Errors that end the relay session.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// No diagnostics log location could be opened at startup.
    #[error("no writable diagnostics log location")]
    DiagnosticsUnavailable,

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// Fatal failure on the inbound line stream.
    #[error("inbound stream failed: {0}")]
    Stream(#[source] FramingError),

    /// An outbound envelope could not be encoded.
    #[error("failed to encode outbound message: {0}")]
    Encode(#[source] serde_json::Error),

    /// Fatal failure writing the outbound stream.
    #[error("outbound stream failed: {0}")]
    Io(#[from] std::io::Error),
}
