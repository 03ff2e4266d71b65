//! Candidate probe loop.
//!
//! Walks the resolver's ordered list, advancing past failures that say
//! "wrong door" (404, connection-level) and aborting on failures that say
//! "right door, real problem" (any other HTTP status). When every direct
//! candidate failed at the connection level against a remote host, the same
//! first candidate is retried through the local proxy-port chain.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ProviderConfig;
use crate::resolver::{
    candidates_for, is_loopback, proxy_chain, proxy_port_of, BodyKind, EndpointCandidate,
    Operation,
};
use crate::transport::{HttpTransport, TransportError};
use crate::{Error, Result};

/// Which candidate ultimately answered. The gateway picks the response
/// parser from `body` and reports proxy usage from `via_proxy_port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReport {
    pub url: String,
    pub body: BodyKind,
    pub via_proxy_port: Option<u16>,
}

/// Pre-built request bodies, one per dialect a candidate list can span.
/// Listing operations carry neither.
#[derive(Debug, Default)]
pub struct PlannedBodies {
    pub gemini: Option<Value>,
    pub openai: Option<Value>,
}

impl PlannedBodies {
    fn for_kind(&self, kind: BodyKind) -> Option<&Value> {
        match kind {
            BodyKind::GeminiGenerate => self.gemini.as_ref(),
            BodyKind::OpenAiChat => self.openai.as_ref(),
            BodyKind::None => None,
        }
    }
}

enum WalkOutcome {
    Success(Value, CandidateReport),
    Exhausted {
        last_url: String,
        last: TransportError,
        all_cors: bool,
    },
}

pub struct Dispatcher {
    transport: HttpTransport,
}

impl Dispatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new()?,
        })
    }

    /// Resolve candidates for `(op, cfg)` and probe them in order.
    pub async fn dispatch(
        &self,
        op: Operation,
        cfg: &ProviderConfig,
        bodies: &PlannedBodies,
        cancel: &CancellationToken,
    ) -> Result<(Value, CandidateReport)> {
        cfg.validate()?;
        let api_key = cfg.effective_api_key()?;

        let direct = candidates_for(op, cfg);
        let first = match direct.first() {
            Some(c) => c.clone(),
            None => return Err(Error::configuration("no endpoint candidates resolved")),
        };

        match self.walk(&direct, bodies, &api_key, cancel).await? {
            WalkOutcome::Success(value, report) => Ok((value, report)),
            WalkOutcome::Exhausted {
                last_url,
                last,
                all_cors,
            } => {
                // A 404 anywhere proves the host was reachable, so only a
                // clean sweep of connection-level failures earns the proxy
                // chain. Loopback targets have no cross-origin wall to climb.
                if !all_cors || is_loopback(&first.url) {
                    return Err(Error::EndpointUnreachable {
                        last_url,
                        source: last,
                    });
                }
                warn!(
                    target_url = %first.url,
                    "all direct candidates failed at the connection level, trying local proxy ports"
                );
                match self
                    .walk(&proxy_chain(&first), bodies, &api_key, cancel)
                    .await?
                {
                    WalkOutcome::Success(value, report) => Ok((value, report)),
                    WalkOutcome::Exhausted { last_url, last, .. } => {
                        Err(Error::EndpointUnreachable {
                            last_url,
                            source: last,
                        })
                    }
                }
            }
        }
    }

    /// Try each candidate once, in order. `Err` means a hard abort;
    /// `Exhausted` means every candidate failed softly.
    async fn walk(
        &self,
        candidates: &[EndpointCandidate],
        bodies: &PlannedBodies,
        api_key: &str,
        cancel: &CancellationToken,
    ) -> Result<WalkOutcome> {
        let mut all_cors = true;
        let mut last: Option<(String, TransportError)> = None;

        for candidate in candidates {
            let body = bodies.for_kind(candidate.body);
            match self.transport.send(candidate, body, api_key, cancel).await {
                Ok(value) => {
                    debug!(url = %candidate.url, "candidate answered");
                    return Ok(WalkOutcome::Success(
                        value,
                        CandidateReport {
                            url: candidate.url.clone(),
                            body: candidate.body,
                            via_proxy_port: proxy_port_of(&candidate.url),
                        },
                    ));
                }
                Err(TransportError::Cancelled) => return Err(Error::Cancelled),
                Err(TransportError::Status { status, url, body }) => {
                    return Err(Error::UpstreamRejected {
                        status,
                        url,
                        message: body,
                    });
                }
                Err(e @ TransportError::Decode { .. }) => return Err(Error::Transport(e)),
                Err(e @ TransportError::Other(_)) => return Err(Error::Transport(e)),
                Err(e) => {
                    debug!(url = %candidate.url, error = %e, "candidate failed, advancing");
                    all_cors &= e.is_cors_class();
                    last = Some((candidate.url.clone(), e));
                }
            }
        }

        match last {
            Some((last_url, last)) => Ok(WalkOutcome::Exhausted {
                last_url,
                last,
                all_cors,
            }),
            None => Err(Error::configuration("no endpoint candidates resolved")),
        }
    }
}
