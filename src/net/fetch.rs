//! Guarded HTTP fetching.
//!
//! Wraps a request so every connection — including every redirect hop —
//! goes through pinned resolution under one policy. Redirects are never
//! delegated to the HTTP stack: the client is built with
//! `redirect::Policy::none()` and the guard walks the chain itself,
//! re-pinning each hop and stripping credential headers when the chain
//! crosses an origin boundary.

use super::resolve::{
    resolve_pinned_hostname_with_policy, HostLookup, ResolveError, SystemLookup,
};
use super::SsrfPolicy;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, LOCATION};
use reqwest::{Method, StatusCode, Url};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Headers that carry credentials and must not leak across an origin
/// boundary. `cookie2` is the legacy RFC 2965 family.
const CREDENTIAL_HEADERS: &[&str] = &["authorization", "proxy-authorization", "cookie", "cookie2"];

/// Caller-supplied request shape. One `FetchInit` describes the initial
/// request; the guard derives each hop's request from it.
#[derive(Debug, Clone)]
pub struct FetchInit {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Overall per-request timeout, threaded into the backend so
    /// cancellation propagates through the transport.
    pub timeout: Duration,
    pub max_redirects: usize,
}

impl Default for FetchInit {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: Duration::from_secs(30),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// One hop's request, with the pinned addresses the transport must dial.
#[derive(Debug, Clone)]
pub struct GuardedRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    /// Pinned socket addresses for the URL's host (port ignored by the
    /// transport; it connects on the URL's port).
    pub addresses: Vec<SocketAddr>,
    pub timeout: Duration,
}

/// Injectable HTTP transport. The implementation must dial only the
/// pinned addresses and must not follow redirects on its own.
#[async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, request: GuardedRequest) -> Result<BackendResponse, reqwest::Error>;
}

/// A transport response plus the handle keeping its connection alive.
pub struct BackendResponse {
    pub response: reqwest::Response,
    pub release: ReleaseHandle,
}

/// Keeps the per-connection transport alive until the caller has consumed
/// the body. Dropping it (or calling [`ReleaseHandle::release`]) closes
/// the transport's idle connections.
#[derive(Debug, Default)]
pub struct ReleaseHandle {
    transport: Option<reqwest::Client>,
}

impl ReleaseHandle {
    pub fn noop() -> Self {
        Self { transport: None }
    }

    pub(crate) fn for_client(client: reqwest::Client) -> Self {
        Self {
            transport: Some(client),
        }
    }

    /// Explicitly close the transport.
    pub fn release(mut self) {
        self.transport.take();
    }
}

/// Default backend: a one-off reqwest client per hop, with the pin wired
/// in through `resolve_to_addrs` and redirects disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestBackend;

#[async_trait]
impl FetchBackend for ReqwestBackend {
    async fn fetch(&self, request: GuardedRequest) -> Result<BackendResponse, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(request.timeout)
            .connect_timeout(Duration::from_secs(10));

        // Only domains need the pin override; an IP-literal URL already
        // dials its decoded (and validated) address.
        if let Some(domain) = request.url.domain() {
            builder = builder.resolve_to_addrs(domain, &request.addresses);
        }

        let client = builder.build()?;
        let mut req = client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            req = req.body(body);
        }
        let response = req.send().await?;

        Ok(BackendResponse {
            response,
            release: ReleaseHandle::for_client(client),
        })
    }
}

/// Everything that can end a guarded fetch short of a final response.
#[derive(Debug, thiserror::Error)]
pub enum FetchGuardError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported scheme '{0}'")]
    UnsupportedScheme(String),
    /// A policy denial at some hop. The whole fetch aborts; no partial
    /// data is returned.
    #[error("blocked target '{hostname}': {reason}")]
    BlockedTarget {
        hostname: String,
        reason: super::resolve::BlockReason,
    },
    #[error("lookup failed for '{hostname}': {source}")]
    Lookup {
        hostname: String,
        #[source]
        source: std::io::Error,
    },
    #[error("redirect limit exceeded after {hops} hops")]
    TooManyRedirects { hops: usize },
    #[error("redirect response carried a missing or invalid Location header")]
    InvalidRedirect,
    /// The transport itself failed. Passed through unchanged — never
    /// reinterpreted as a verdict.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl From<ResolveError> for FetchGuardError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Blocked { hostname, reason } => {
                Self::BlockedTarget { hostname, reason }
            }
            ResolveError::Lookup { hostname, source } => Self::Lookup { hostname, source },
        }
    }
}

/// The final response of a guarded fetch plus its release handle and the
/// number of redirect hops taken.
#[derive(Debug)]
pub struct GuardedFetch {
    pub response: reqwest::Response,
    pub release: ReleaseHandle,
    pub hops: usize,
}

/// SSRF-guarded fetcher. One guard per policy; each `fetch` pins its own
/// hostnames, so concurrent fetches never share resolution state.
pub struct FetchGuard {
    policy: SsrfPolicy,
    lookup: Arc<dyn HostLookup>,
    backend: Arc<dyn FetchBackend>,
}

impl FetchGuard {
    pub fn new(policy: SsrfPolicy) -> Self {
        Self {
            policy,
            lookup: Arc::new(SystemLookup),
            backend: Arc::new(ReqwestBackend),
        }
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn HostLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn FetchBackend>) -> Self {
        self.backend = backend;
        self
    }

    /// Fetch `url`, validating the target and every redirect hop against
    /// the guard's policy.
    pub async fn fetch(
        &self,
        url: &str,
        init: FetchInit,
    ) -> Result<GuardedFetch, FetchGuardError> {
        let mut url =
            Url::parse(url.trim()).map_err(|err| FetchGuardError::InvalidUrl(err.to_string()))?;
        let mut method = init.method.clone();
        let mut headers = init.headers.clone();
        let mut body = init.body.clone();
        let mut hops = 0usize;

        loop {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(FetchGuardError::UnsupportedScheme(url.scheme().to_string()));
            }
            let host = url_host(&url)
                .ok_or_else(|| FetchGuardError::InvalidUrl("missing host".to_string()))?;

            let pinned =
                resolve_pinned_hostname_with_policy(&host, self.lookup.clone(), &self.policy)
                    .await?;

            let hop = self
                .backend
                .fetch(GuardedRequest {
                    url: url.clone(),
                    method: method.clone(),
                    headers: headers.clone(),
                    body: body.clone(),
                    addresses: pinned.socket_addrs(0),
                    timeout: init.timeout,
                })
                .await?;

            let status = hop.response.status();
            if !is_redirect(status) {
                return Ok(GuardedFetch {
                    response: hop.response,
                    release: hop.release,
                    hops,
                });
            }

            hops += 1;
            if hops > init.max_redirects {
                return Err(FetchGuardError::TooManyRedirects { hops });
            }

            let location = hop
                .response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or(FetchGuardError::InvalidRedirect)?;
            let next = url
                .join(location)
                .map_err(|_| FetchGuardError::InvalidRedirect)?;

            if !same_origin(&url, &next) {
                strip_credential_headers(&mut headers);
            }

            // 303 always degrades to GET; 301/302 degrade POST like
            // browsers and fetch() do; 307/308 preserve method and body.
            let degrade = status == StatusCode::SEE_OTHER
                || ((status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND)
                    && method == Method::POST);
            if degrade && method != Method::HEAD {
                method = Method::GET;
                body = None;
            }

            tracing::debug!(
                from = %url,
                to = %next,
                status = status.as_u16(),
                hop = hops,
                "following validated redirect"
            );
            // The hop response body is dropped unread.
            url = next;
        }
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn url_host(url: &Url) -> Option<String> {
    if let Some(domain) = url.domain() {
        return Some(domain.to_string());
    }
    // IP-literal host; brackets stripped so the resolver sees bare text.
    let host = url.host_str()?;
    Some(
        host.trim_start_matches('[')
            .trim_end_matches(']')
            .to_string(),
    )
}

/// Origin is (scheme, host, effective port); any component change crosses
/// the boundary.
fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

fn strip_credential_headers(headers: &mut HeaderMap) {
    for name in CREDENTIAL_HEADERS {
        let name = HeaderName::from_static(*name);
        // remove() drops one value per call for multi-valued entries.
        while headers.remove(&name).is_some() {}
    }
}
