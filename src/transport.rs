//! HTTP layer: one `reqwest::Client`, auth placement per candidate, and
//! cancellation-aware request execution.

use std::env;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::resolver::{AuthPlacement, BodyKind, EndpointCandidate};

/// Transport-level failure for one candidate attempt.
///
/// The variants encode the dispatcher's advance/abort decision directly:
/// [`NotFound`](TransportError::NotFound) and
/// [`Connection`](TransportError::Connection) advance to the next candidate,
/// [`Status`](TransportError::Status) aborts the whole loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("endpoint not found (404) at {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    /// Connection-level failure with no HTTP status: refused, reset, DNS,
    /// TLS, timeout. In a browser environment a blocked cross-origin read
    /// has exactly this signature, so these are the failures that fall
    /// through to the local proxy chain. Ambiguity falls through by design
    /// of the classification, not by message sniffing.
    #[error("connection failed for {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("transport setup error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether this failure should be treated as a cross-origin signature
    /// for the purpose of the proxy-port fallback.
    pub fn is_cors_class(&self) -> bool {
        matches!(self, TransportError::Connection { .. })
    }

    /// Whether the dispatcher should advance to the next candidate.
    pub fn is_advance(&self) -> bool {
        matches!(
            self,
            TransportError::NotFound { .. } | TransportError::Connection { .. }
        )
    }
}

/// Thin wrapper over a shared `reqwest::Client` with production-friendly,
/// env-overridable defaults.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> crate::Result<Self> {
        let timeout_secs = env::var("LLM_BRIDGE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(120);
        // Candidate probing walks a list that can be fifteen entries long;
        // a blackholed host must fail in seconds, not eat the full request
        // timeout per candidate.
        let connect_secs = env::var("LLM_BRIDGE_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(5);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(connect_secs))
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| crate::Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self { client })
    }

    /// Issue one candidate request.
    ///
    /// The key lands where the candidate's [`AuthPlacement`] says; the body
    /// is attached for POST candidates. The whole exchange races the
    /// cancellation token, including the body read.
    pub async fn send(
        &self,
        candidate: &EndpointCandidate,
        body: Option<&Value>,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, TransportError> {
        let url = &candidate.url;
        debug!(url = %url, auth = ?candidate.auth, "issuing candidate request");

        let mut req = match candidate.body {
            BodyKind::None => self.client.get(url),
            _ => self.client.post(url).json(body.unwrap_or(&Value::Null)),
        };
        req = match candidate.auth {
            AuthPlacement::Bearer => req.bearer_auth(api_key),
            AuthPlacement::GoogleHeader => req.header("x-goog-api-key", api_key),
            AuthPlacement::QueryKey => req.query(&[("key", api_key)]),
        };

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            r = req.send() => r.map_err(|source| TransportError::Connection {
                url: url.clone(),
                source,
            })?,
        };

        let status = response.status().as_u16();
        if status == 404 {
            return Err(TransportError::NotFound { url: url.clone() });
        }

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            t = response.text() => t.map_err(|source| TransportError::Connection {
                url: url.clone(),
                source,
            })?,
        };

        if !(200..300).contains(&status) {
            return Err(TransportError::Status {
                status,
                url: url.clone(),
                body: truncate(&text, 500),
            });
        }

        serde_json::from_str(&text).map_err(|source| TransportError::Decode {
            url: url.clone(),
            source,
        })
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
