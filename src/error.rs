use thiserror::Error;

/// Unified error type for the bridge.
///
/// Every terminal failure a caller can observe maps onto one of these
/// kinds, so capability-probing UIs can branch on the variant instead of
/// string-matching messages.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable API key for the active connection mode (direct vs proxy).
    #[error("no usable API key for the active connection mode")]
    MissingCredential,

    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// Every candidate in the resolver's list failed with a connection-level
    /// or 404 error. Carries the last candidate tried and its underlying
    /// cause for diagnostics.
    #[error("no reachable endpoint (last tried {last_url})")]
    EndpointUnreachable {
        last_url: String,
        #[source]
        source: crate::transport::TransportError,
    },

    /// A candidate answered with a non-2xx, non-404 status. This indicates a
    /// real, candidate-independent problem (auth, rate limit, bad request),
    /// so no further candidates are tried.
    #[error("upstream rejected the request: HTTP {status} at {url}: {message}")]
    UpstreamRejected {
        status: u16,
        url: String,
        message: String,
    },

    /// A tool-call payload was located but failed to parse or did not match
    /// the expected shape. Distinct from "no tool call found" so callers can
    /// tell "the model tried and failed" from "the model didn't try".
    #[error("tool-call payload malformed: {reason}")]
    MalformedToolCallPayload { snippet: String, reason: String },

    /// `force_tool_call` was set and extraction produced zero valid calls.
    #[error("a tool call was required but the response contained none")]
    ToolCallRequiredButAbsent,

    /// Caller-initiated abort via the cancellation token.
    #[error("request cancelled by caller")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }
}
