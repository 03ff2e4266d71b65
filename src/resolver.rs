//! Endpoint resolution: turns `(operation, config)` into an ordered list of
//! request targets.
//!
//! Everything here is a pure function of its inputs — the same `(op, cfg)`
//! pair always yields the same candidate list, in the same order. The
//! dispatcher walks the list strictly in order; the local proxy-port chain
//! is appended by the dispatcher only after every direct candidate failed
//! with a connection-level (CORS-class) error.

use url::Url;

use crate::config::{ProviderConfig, ProviderKind};

/// Logical operation a candidate list is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListModels,
    Chat,
}

/// Where the API key goes for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlacement {
    /// `Authorization: Bearer <key>` — the OpenAI-compatible default.
    Bearer,
    /// `x-goog-api-key: <key>` — Gemini behind a reverse proxy.
    GoogleHeader,
    /// `?key=<key>` query parameter — Gemini called natively.
    QueryKey,
}

/// Which request-body dialect the candidate expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// POST with a Gemini `generateContent` body.
    GeminiGenerate,
    /// POST with an OpenAI `chat/completions` body.
    OpenAiChat,
    /// GET, no body (model listings).
    None,
}

/// One fully-formed request target, tried in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCandidate {
    pub url: String,
    pub auth: AuthPlacement,
    pub body: BodyKind,
}

/// Explicit host classification replacing ad hoc substring checks scattered
/// through request-building code. Pure and unit-testable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProfile {
    /// Host is Google's own API surface.
    pub is_google_host: bool,
    /// Host (or the requested model id) suggests an OpenAI-compatible
    /// surface is also served — a compatibility proxy in front of Gemini,
    /// or a gateway exposing Gemini models under OpenAI routes.
    pub looks_openai_compatible: bool,
}

/// Local CORS-fallback proxy ports, scanned in ascending order.
pub const PROXY_PORTS: [u16; 10] = [3001, 3002, 3003, 3004, 3005, 3006, 3007, 3008, 3009, 3010];

/// Classify a base URL (and optional model-id hint) into a [`HostProfile`].
pub fn classify_host(base_url: &str, model_hint: &str) -> HostProfile {
    let parsed = Url::parse(base_url).ok();
    let host = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    let path = parsed.as_ref().map(|u| u.path()).unwrap_or("");

    let is_google_host =
        host == "generativelanguage.googleapis.com" || host.ends_with(".googleapis.com");

    // Model listings sometimes tag ids with a vendor prefix like "[O]".
    let hint = {
        let h = model_hint.trim().to_ascii_lowercase();
        match (h.starts_with('['), h.find(']')) {
            (true, Some(end)) => h[end + 1..].to_string(),
            _ => h,
        }
    };
    let hint_is_google = hint.contains("gemini") || hint.contains("google");

    let looks_openai_compatible = !is_google_host
        || path.contains("/openai")
        || (!hint.is_empty() && !hint_is_google);

    HostProfile {
        is_google_host,
        looks_openai_compatible,
    }
}

/// Strip a `models/` prefix some listings attach to model ids.
pub fn strip_model_prefix(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

/// Produce the ordered candidate list for one operation.
pub fn candidates_for(op: Operation, cfg: &ProviderConfig) -> Vec<EndpointCandidate> {
    match cfg.provider {
        ProviderKind::GeminiNative if cfg.use_proxy => gemini_proxied(op, cfg),
        ProviderKind::GeminiNative => gemini_direct(op, cfg),
        ProviderKind::OpenAiCompatible => openai_compatible(op, cfg),
    }
}

/// Gemini behind a reverse proxy speaks the OpenAI dialect on Google's
/// `/v1beta/openai` routes, authenticated with `x-goog-api-key`.
fn gemini_proxied(op: Operation, cfg: &ProviderConfig) -> Vec<EndpointCandidate> {
    let mut base = cfg.effective_base_url();
    if !base.contains("/openai") {
        base = format!("{}/v1beta/openai", base);
    }
    let (suffix, body) = match op {
        Operation::ListModels => ("models", BodyKind::None),
        Operation::Chat => ("chat/completions", BodyKind::OpenAiChat),
    };
    vec![EndpointCandidate {
        url: format!("{}/{}", base, suffix),
        auth: AuthPlacement::GoogleHeader,
        body,
    }]
}

fn gemini_direct(op: Operation, cfg: &ProviderConfig) -> Vec<EndpointCandidate> {
    let raw_base = cfg.effective_base_url();
    let canon = canonical_gemini_host(&raw_base);
    let profile = classify_host(&raw_base, &cfg.model);

    match op {
        Operation::Chat => {
            let model = strip_model_prefix(&cfg.model);
            vec![EndpointCandidate {
                url: format!("{}/v1beta/models/{}:generateContent", canon, model),
                auth: AuthPlacement::QueryKey,
                body: BodyKind::GeminiGenerate,
            }]
        }
        Operation::ListModels => {
            let mut out = vec![EndpointCandidate {
                url: format!("{}/v1beta/models", canon),
                auth: AuthPlacement::QueryKey,
                body: BodyKind::None,
            }];
            if profile.looks_openai_compatible {
                for path in [
                    "/v1beta/openai/models",
                    "/v1beta/models",
                    "/openai/v1/models",
                    "/v1/models",
                ] {
                    out.push(EndpointCandidate {
                        url: format!("{}{}", canon, path),
                        auth: AuthPlacement::Bearer,
                        body: BodyKind::None,
                    });
                }
            }
            out
        }
    }
}

fn openai_compatible(op: Operation, cfg: &ProviderConfig) -> Vec<EndpointCandidate> {
    let base = normalize_openai_base(&cfg.effective_base_url());
    // Bases that already carry a versioned path (Google's OpenAI-compat
    // surface, gateways mounted under /openai) get the bare suffix.
    let has_path = base.ends_with("/openai") || base.contains("/v1beta");
    let suffix = match (op, has_path) {
        (Operation::ListModels, false) => "/v1/models",
        (Operation::ListModels, true) => "/models",
        (Operation::Chat, false) => "/v1/chat/completions",
        (Operation::Chat, true) => "/chat/completions",
    };
    let body = match op {
        Operation::ListModels => BodyKind::None,
        Operation::Chat => BodyKind::OpenAiChat,
    };
    vec![EndpointCandidate {
        url: format!("{}{}", base, suffix),
        auth: AuthPlacement::Bearer,
        body,
    }]
}

/// Reduce a Gemini base URL to its canonical host: strip any
/// `/v1beta/openai`, `/openai`, `/v1beta`, `/v1` suffix a caller pasted in.
fn canonical_gemini_host(base: &str) -> String {
    let mut s = base.trim().trim_end_matches('/').to_string();
    loop {
        let before = s.len();
        for suffix in ["/v1beta/openai", "/openai", "/v1beta", "/v1"] {
            if let Some(stripped) = s.strip_suffix(suffix) {
                s = stripped.trim_end_matches('/').to_string();
                break;
            }
        }
        if s.len() == before {
            return s;
        }
    }
}

/// Undo the common paste mistakes on OpenAI-compatible base URLs: a trailing
/// `/chat/completions` and a trailing `/v1`.
fn normalize_openai_base(base: &str) -> String {
    let mut s = base.trim().trim_end_matches('/');
    if let Some(stripped) = s.strip_suffix("/chat/completions") {
        s = stripped.trim_end_matches('/');
    }
    if let Some(stripped) = s.strip_suffix("/v1") {
        s = stripped.trim_end_matches('/');
    }
    s.to_string()
}

/// Whether the candidate targets the local machine. Loopback targets never
/// fall through to the proxy chain — there is no same-origin wall to climb.
pub fn is_loopback(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .map(|h| h == "localhost" || h == "127.0.0.1" || h == "::1" || h == "[::1]")
        .unwrap_or(false)
}

/// Rewrite one direct candidate through the local CORS proxy, one candidate
/// per port in ascending order: `http://localhost:{port}/proxy?target=<url>`.
pub fn proxy_chain(direct: &EndpointCandidate) -> Vec<EndpointCandidate> {
    let encoded: String = url::form_urlencoded::byte_serialize(direct.url.as_bytes()).collect();
    PROXY_PORTS
        .iter()
        .map(|port| EndpointCandidate {
            url: format!("http://localhost:{}/proxy?target={}", port, encoded),
            auth: direct.auth,
            body: direct.body,
        })
        .collect()
}

/// Pull the proxy port back out of a rewritten candidate, for diagnostics.
pub fn proxy_port_of(url: &str) -> Option<u16> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if (host == "localhost" || host == "127.0.0.1") && parsed.path() == "/proxy" {
        parsed.port()
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;

    fn gemini_cfg(base: &str, model: &str) -> ProviderConfig {
        ProviderConfig {
            provider: ProviderKind::GeminiNative,
            model: model.into(),
            base_url: base.into(),
            api_key: "k".into(),
            use_proxy: false,
            proxy_url: String::new(),
            proxy_key: String::new(),
            tool_call_mode: None,
        }
    }

    fn openai_cfg(base: &str) -> ProviderConfig {
        ProviderConfig {
            provider: ProviderKind::OpenAiCompatible,
            model: "deepseek-chat".into(),
            base_url: base.into(),
            api_key: "k".into(),
            use_proxy: false,
            proxy_url: String::new(),
            proxy_key: String::new(),
            tool_call_mode: None,
        }
    }

    #[test]
    fn google_direct_list_yields_single_candidate_with_stripped_suffix() {
        // Google's own host is never treated as a compatibility proxy, so a
        // pasted /v1beta suffix collapses to one native candidate.
        let cfg = gemini_cfg(
            "https://generativelanguage.googleapis.com/v1beta",
            "gemini-2.0-flash",
        );
        let cands = candidates_for(Operation::ListModels, &cfg);
        assert_eq!(cands.len(), 1);
        assert_eq!(
            cands[0].url,
            "https://generativelanguage.googleapis.com/v1beta/models"
        );
        assert_eq!(cands[0].auth, AuthPlacement::QueryKey);
    }

    #[test]
    fn compat_proxy_host_gets_full_fallback_ladder() {
        let cfg = gemini_cfg("https://gemini-relay.example.com", "gemini-2.0-flash");
        let cands = candidates_for(Operation::ListModels, &cfg);
        let urls: Vec<&str> = cands.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://gemini-relay.example.com/v1beta/models",
                "https://gemini-relay.example.com/v1beta/openai/models",
                "https://gemini-relay.example.com/v1beta/models",
                "https://gemini-relay.example.com/openai/v1/models",
                "https://gemini-relay.example.com/v1/models",
            ]
        );
        assert_eq!(cands[0].auth, AuthPlacement::QueryKey);
        assert!(cands[1..].iter().all(|c| c.auth == AuthPlacement::Bearer));
    }

    #[test]
    fn openai_base_strips_pasted_chat_completions_suffix() {
        let cfg = openai_cfg("https://api.deepseek.com/v1/chat/completions");
        let cands = candidates_for(Operation::Chat, &cfg);
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].url, "https://api.deepseek.com/v1/chat/completions");
        assert_eq!(cands[0].body, BodyKind::OpenAiChat);
    }

    #[test]
    fn openai_base_with_v1_only_normalizes_once() {
        let cfg = openai_cfg("https://api.siliconflow.cn/v1");
        let cands = candidates_for(Operation::ListModels, &cfg);
        assert_eq!(cands[0].url, "https://api.siliconflow.cn/v1/models");
    }

    #[test]
    fn gemini_chat_url_strips_models_prefix() {
        let cfg = gemini_cfg(
            "https://generativelanguage.googleapis.com",
            "models/gemini-2.0-flash",
        );
        let cands = candidates_for(Operation::Chat, &cfg);
        assert_eq!(
            cands[0].url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn gemini_proxied_uses_openai_dialect_and_google_header() {
        let mut cfg = gemini_cfg("", "gemini-2.0-flash");
        cfg.use_proxy = true;
        cfg.proxy_url = "https://relay.example.com".into();
        let cands = candidates_for(Operation::Chat, &cfg);
        assert_eq!(
            cands[0].url,
            "https://relay.example.com/v1beta/openai/chat/completions"
        );
        assert_eq!(cands[0].auth, AuthPlacement::GoogleHeader);
        assert_eq!(cands[0].body, BodyKind::OpenAiChat);
    }

    #[test]
    fn resolution_is_deterministic() {
        let cfg = gemini_cfg("https://gemini-relay.example.com/v1beta", "gemini-2.0-flash");
        let a = candidates_for(Operation::ListModels, &cfg);
        let b = candidates_for(Operation::ListModels, &cfg);
        assert_eq!(a, b);
    }

    #[test]
    fn proxy_chain_is_ten_ports_ascending() {
        let direct = EndpointCandidate {
            url: "https://api.example.com/v1/chat/completions".into(),
            auth: AuthPlacement::Bearer,
            body: BodyKind::OpenAiChat,
        };
        let chain = proxy_chain(&direct);
        assert_eq!(chain.len(), 10);
        assert!(chain[0].url.starts_with("http://localhost:3001/proxy?target="));
        assert!(chain[9].url.starts_with("http://localhost:3010/proxy?target="));
        assert!(chain[0].url.contains("https%3A%2F%2Fapi.example.com"));
        assert_eq!(proxy_port_of(&chain[3].url), Some(3004));
    }

    #[test]
    fn loopback_hosts_detected() {
        assert!(is_loopback("http://localhost:8080/v1/models"));
        assert!(is_loopback("http://127.0.0.1:3000/x"));
        assert!(!is_loopback("https://api.example.com/v1"));
    }

    #[test]
    fn host_classification() {
        let p = classify_host("https://generativelanguage.googleapis.com", "gemini-2.0-flash");
        assert!(p.is_google_host);
        assert!(!p.looks_openai_compatible);

        let p = classify_host("https://my-gateway.example.com", "gemini-2.0-flash");
        assert!(!p.is_google_host);
        assert!(p.looks_openai_compatible);

        // A bracket-tagged non-Google model id on a Google host flags compat.
        let p = classify_host("https://generativelanguage.googleapis.com", "[O]gpt-4o");
        assert!(p.is_google_host);
        assert!(p.looks_openai_compatible);
    }
}
