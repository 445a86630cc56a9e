#![forbid(unsafe_code)]

use std::collections::{BTreeMap, VecDeque};
use std::env;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use precinct_contracts::api::{ApiEndpoint, HttpMethod};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};
use url::Url;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn endpoint(endpoint: ApiEndpoint) -> Self {
        Self {
            method: endpoint.method(),
            path: endpoint.path().to_string(),
            body: None,
        }
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }
}

/// No HTTP answer at all. `detail` keeps the debug rendering of the underlying cause.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {message}")]
pub struct TransportError {
    pub name: String,
    pub message: String,
    pub detail: String,
}

impl TransportError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: name.into(),
            detail: message.clone(),
            message,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// One HTTP exchange with the API server.
pub trait ApiTransport {
    fn send(
        &self,
        request: ApiRequest,
    ) -> impl Future<Output = Result<ApiResponse, TransportError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub base_url: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl TransportConfig {
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            user_agent: format!("precinct/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn from_env() -> Self {
        let base_url = env::var("PRECINCT_API_BASE_URL")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let connect_timeout_ms = env::var("PRECINCT_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (100..=60_000).contains(v))
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS);
        let request_timeout_ms = env::var("PRECINCT_REQUEST_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (100..=120_000).contains(v))
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        Self {
            connect_timeout_ms,
            request_timeout_ms,
            ..Self::for_base_url(base_url)
        }
    }
}

/// Session cookies the server hands out, replayed on every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    cookies: BTreeMap<String, String>,
}

impl CookieJar {
    pub fn from_header(raw: &str) -> Self {
        let cookies = raw
            .split(';')
            .filter_map(split_cookie_pair)
            .collect::<BTreeMap<_, _>>();
        Self { cookies }
    }

    pub fn header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn absorb_set_cookie(&mut self, set_cookie: &str) {
        let mut parts = set_cookie.split(';');
        let Some((name, value)) = parts.next().and_then(split_cookie_pair) else {
            return;
        };
        let expired = parts.any(|attr| {
            let attr = attr.trim().to_ascii_lowercase();
            attr == "max-age=0" || (attr.starts_with("expires=") && attr.contains("1970"))
        });
        if expired || value.is_empty() {
            self.cookies.remove(&name);
        } else {
            self.cookies.insert(name, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

fn split_cookie_pair(raw: &str) -> Option<(String, String)> {
    let (name, value) = raw.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Production transport: a blocking `ureq` agent driven from tokio's blocking pool so the
/// caller's event loop never stalls on I/O.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: Url,
    cookies: Arc<Mutex<CookieJar>>,
}

impl UreqTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut base_url = Url::parse(&config.base_url).map_err(|err| {
            TransportError::new("config_invalid", format!("invalid API base url: {err}"))
        })?;
        // A prefix such as `/leo` must survive `join`, which replaces the last segment otherwise.
        if !base_url.path().ends_with('/') {
            let prefixed = format!("{}/", base_url.path());
            base_url.set_path(&prefixed);
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_millis(config.connect_timeout_ms))
            .timeout_read(Duration::from_millis(config.request_timeout_ms))
            .timeout_write(Duration::from_millis(config.request_timeout_ms))
            .user_agent(&config.user_agent)
            .build();
        Ok(Self {
            agent,
            base_url,
            cookies: Arc::new(Mutex::new(CookieJar::default())),
        })
    }

    pub fn with_cookie_header(self, raw: Option<&str>) -> Self {
        if let Some(raw) = raw {
            *self.jar() = CookieJar::from_header(raw);
        }
        self
    }

    pub fn cookie_header(&self) -> Option<String> {
        self.jar().header()
    }

    pub fn clear_cookies(&self) {
        *self.jar() = CookieJar::default();
    }

    /// Endpoint paths resolve under the base url's own path.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    fn jar(&self) -> std::sync::MutexGuard<'_, CookieJar> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ApiTransport for UreqTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.endpoint_url(&request.path).map_err(|err| {
            TransportError::new("config_invalid", format!("invalid request path: {err}"))
        })?;
        let agent = self.agent.clone();
        let cookie_header = self.cookie_header();
        debug!(method = %request.method, path = %request.path, "api request");
        let (response, set_cookies) = tokio::task::spawn_blocking(move || {
            execute_blocking(&agent, request.method, &url, cookie_header, request.body)
        })
        .await
        .map_err(|err| {
            TransportError::new("join", "request task did not complete")
                .with_detail(format!("{err:?}"))
        })??;
        if !set_cookies.is_empty() {
            let mut jar = self.jar();
            for raw in &set_cookies {
                jar.absorb_set_cookie(raw);
            }
        }
        trace!(status = response.status, "api response");
        Ok(response)
    }
}

fn execute_blocking(
    agent: &ureq::Agent,
    method: HttpMethod,
    url: &Url,
    cookie_header: Option<String>,
    body: Option<Value>,
) -> Result<(ApiResponse, Vec<String>), TransportError> {
    let mut req = agent
        .request(method.as_str(), url.as_str())
        .set("Accept", "application/json");
    if let Some(cookie) = cookie_header.as_deref() {
        req = req.set("Cookie", cookie);
    }
    let result = match body {
        Some(body) => req.send_json(body),
        None => req.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => return Err(transport_error(transport)),
    };
    let status = response.status();
    let set_cookies = response
        .all("set-cookie")
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let body = response.into_string().map_err(|err| {
        TransportError::new("body_read", format!("failed to read response body: {err}"))
            .with_detail(format!("{err:?}"))
    })?;
    Ok((ApiResponse { status, body }, set_cookies))
}

fn transport_error(transport: ureq::Transport) -> TransportError {
    let combined = format!("{:?} {}", transport.kind(), transport);
    TransportError::new(classify_transport_error_kind(&combined), transport.to_string())
        .with_detail(format!("{transport:?}"))
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: ApiRequest,
    pub at: Instant,
}

/// In-process transport answering from a queue of prepared replies, in order.
/// Every request is recorded with the tokio instant it was sent at.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: Value) -> &Self {
        self.push(Ok(ApiResponse::new(status, body.to_string())))
    }

    pub fn push_text(&self, status: u16, body: &str) -> &Self {
        self.push(Ok(ApiResponse::new(status, body)))
    }

    pub fn push_transport_error(&self, name: &str, message: &str) -> &Self {
        self.push(Err(TransportError::new(name, message)))
    }

    pub fn push(&self, reply: Result<ApiResponse, TransportError>) -> &Self {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|call| format!("{} {}", call.request.method, call.request.path))
            .collect()
    }

    pub fn pending_replies(&self) -> usize {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ApiTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = request.path.clone();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                request,
                at: Instant::now(),
            });
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                Err(TransportError::new(
                    "unscripted",
                    format!("no scripted reply for {path}"),
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_transport_01_cookie_jar_tracks_set_and_clear() {
        let mut jar = CookieJar::default();
        jar.absorb_set_cookie("connect.sid=s%3Aabc.def; Path=/; HttpOnly");
        jar.absorb_set_cookie("theme=dark; Path=/");
        assert_eq!(
            jar.header().as_deref(),
            Some("connect.sid=s%3Aabc.def; theme=dark")
        );
        jar.absorb_set_cookie("connect.sid=; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT");
        jar.absorb_set_cookie("theme=dark; Max-Age=0");
        assert!(jar.is_empty());
        assert_eq!(jar.header(), None);
    }

    #[test]
    fn at_transport_02_cookie_header_roundtrips_through_store_string() {
        let jar = CookieJar::from_header("a=1; b=2");
        assert_eq!(CookieJar::from_header(&jar.header().unwrap()), jar);
    }

    #[test]
    fn at_transport_03_transport_kinds_are_classified() {
        assert_eq!(classify_transport_error_kind("Io connection refused"), "connection");
        assert_eq!(classify_transport_error_kind("Io timed out reading response"), "timeout");
        assert_eq!(classify_transport_error_kind("Dns failed to lookup"), "dns");
        assert_eq!(classify_transport_error_kind("BadHeader"), "transport");
    }

    #[test]
    fn at_transport_04_invalid_base_url_is_a_config_error() {
        let err = UreqTransport::new(&TransportConfig::for_base_url("not a url"))
            .expect_err("base url must parse");
        assert_eq!(err.name, "config_invalid");
    }

    #[tokio::test]
    async fn at_transport_05_scripted_transport_replays_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, serde_json::json!({"ok": true}))
            .push_transport_error("connection", "refused");
        let first = transport
            .send(ApiRequest::endpoint(ApiEndpoint::AuthMe))
            .await
            .unwrap();
        assert!(first.is_success());
        let second = transport
            .send(ApiRequest::endpoint(ApiEndpoint::AuthLogout))
            .await
            .unwrap_err();
        assert_eq!(second.name, "connection");
        let third = transport
            .send(ApiRequest::endpoint(ApiEndpoint::AuthLogout))
            .await
            .unwrap_err();
        assert_eq!(third.name, "unscripted");
        assert_eq!(
            transport.paths(),
            vec![
                "GET /api/auth/me",
                "POST /api/auth/logout",
                "POST /api/auth/logout"
            ]
        );
    }

    #[test]
    fn at_transport_06_base_url_path_prefix_is_kept() {
        let prefixed =
            UreqTransport::new(&TransportConfig::for_base_url("https://host/leo")).unwrap();
        assert_eq!(
            prefixed.endpoint_url("/api/auth/me").unwrap().as_str(),
            "https://host/leo/api/auth/me"
        );
        let origin =
            UreqTransport::new(&TransportConfig::for_base_url("http://localhost:5000/")).unwrap();
        assert_eq!(
            origin.endpoint_url("/api/shift-logs").unwrap().as_str(),
            "http://localhost:5000/api/shift-logs"
        );
    }
}
