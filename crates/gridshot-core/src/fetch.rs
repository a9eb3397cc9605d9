//! Fetch pipeline: resolves pending-by-URL resources over HTTP.
//!
//! Failures are contained per resource: a non-2xx response, an exhausted
//! retry budget, or an overrun streaming-body budget all become a
//! `FailedResource` placeholder in the mapping, never an error that could
//! take down the containing render.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::{Resource, Result};

/// Transport attempts per URL before giving up.
pub const FETCH_ATTEMPTS: usize = 3;

/// Body budget for responses that look like unbounded media streams.
pub const STREAMING_BODY_BUDGET: Duration = Duration::from_secs(30);

/// Sentinel status for a streaming body that outlived its budget.
pub const STREAMING_FAILURE_STATUS: u16 = 599;

/// Sentinel status for transport failures with no HTTP status to report.
pub const TRANSPORT_FAILURE_STATUS: u16 = 504;

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Resolves one URL to a resource. Implementations never return an
/// error; failure is a resource state.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str, renderer: Option<&str>) -> Resource;
}

/// A cookie the capture layer observed; attached to fetches whose URL it
/// matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Proxy scoped to the application under test's own domains. Consulted
/// before the generic proxy; an empty domain list matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutProxy {
    pub url: String,
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Settings threaded into every resource fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Explicit user-agent; otherwise one is derived from the renderer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<Cookie>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aut_proxy: Option<AutProxy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyRoute {
    Aut,
    Generic,
    Direct,
}

fn route_for(options: &FetchOptions, url: &str) -> ProxyRoute {
    if let Some(aut) = &options.aut_proxy {
        let host = host_of(url).unwrap_or_default();
        if aut.domains.is_empty()
            || aut
                .domains
                .iter()
                .any(|d| host == d || host.ends_with(&format!(".{d}")))
        {
            return ProxyRoute::Aut;
        }
    }
    if options.proxy.is_some() {
        ProxyRoute::Generic
    } else {
        ProxyRoute::Direct
    }
}

/// Host portion of a URL, without scheme, userinfo or port.
fn host_of(url: &str) -> Option<&str> {
    let rest = url.split_once("://").map(|(_, r)| r)?;
    let authority = rest.split(['/', '?', '#']).next()?;
    let host = authority.rsplit('@').next()?;
    Some(host.split(':').next().unwrap_or(host))
}

/// Path portion of a URL, defaulting to `/`.
fn path_of(url: &str) -> &str {
    url.split_once("://")
        .map(|(_, rest)| rest)
        .and_then(|rest| rest.find('/').map(|i| &rest[i..]))
        .map(|path| path.split(['?', '#']).next().unwrap_or(path))
        .unwrap_or("/")
}

/// Build the `Cookie` header value from the cookies matching `url`.
fn cookie_header(cookies: &[Cookie], url: &str) -> Option<String> {
    let host = host_of(url)?;
    let path = path_of(url);
    let matching: Vec<String> = cookies
        .iter()
        .filter(|c| match &c.domain {
            Some(domain) => {
                let domain = domain.trim_start_matches('.');
                host == domain || host.ends_with(&format!(".{domain}"))
            }
            None => true,
        })
        .filter(|c| match &c.path {
            Some(cookie_path) => path.starts_with(cookie_path.as_str()),
            None => true,
        })
        .map(|c| format!("{}={}", c.name, c.value))
        .collect();
    if matching.is_empty() {
        None
    } else {
        Some(matching.join("; "))
    }
}

fn user_agent_for(options: &FetchOptions, renderer: Option<&str>) -> String {
    if let Some(ua) = &options.user_agent {
        return ua.clone();
    }
    match renderer {
        Some(name) => format!("Mozilla/5.0 (compatible; gridshot; {name})"),
        None => "Mozilla/5.0 (compatible; gridshot)".to_string(),
    }
}

/// HTTP fetcher with retry, cookie/referer propagation, per-domain proxy
/// routing and a streaming guard for unbounded media bodies.
pub struct HttpFetcher {
    options: FetchOptions,
    streaming_budget: Duration,
    direct: reqwest::Client,
    aut: Option<reqwest::Client>,
    generic: Option<reqwest::Client>,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self> {
        let direct = reqwest::Client::builder().build()?;
        let aut = match &options.aut_proxy {
            Some(aut) => Some(
                reqwest::Client::builder()
                    .proxy(reqwest::Proxy::all(&aut.url)?)
                    .build()?,
            ),
            None => None,
        };
        let generic = match &options.proxy {
            Some(url) => Some(
                reqwest::Client::builder()
                    .proxy(reqwest::Proxy::all(url)?)
                    .build()?,
            ),
            None => None,
        };
        Ok(Self {
            options,
            streaming_budget: STREAMING_BODY_BUDGET,
            direct,
            aut,
            generic,
        })
    }

    /// Override the streaming-body budget. Mainly for tests against
    /// deliberately slow servers.
    pub fn with_streaming_budget(mut self, budget: Duration) -> Self {
        self.streaming_budget = budget;
        self
    }

    fn client_for(&self, url: &str) -> &reqwest::Client {
        match route_for(&self.options, url) {
            ProxyRoute::Aut => self.aut.as_ref().unwrap_or(&self.direct),
            ProxyRoute::Generic => self.generic.as_ref().unwrap_or(&self.direct),
            ProxyRoute::Direct => &self.direct,
        }
    }

    async fn consume(&self, url: &str, response: reqwest::Response) -> Resource {
        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "fetch answered non-2xx");
            return Resource::failed(url, status.as_u16());
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

        let unbounded_media = response.content_length().is_none()
            && (content_type.starts_with("audio/") || content_type.starts_with("video/"));

        let bytes = if unbounded_media {
            // One slow stream must not stall the whole pipeline; dropping
            // the body future aborts the in-flight request.
            match timeout(self.streaming_budget, response.bytes()).await {
                Ok(Ok(bytes)) => bytes,
                Ok(Err(err)) => {
                    warn!(url, %err, "media body failed");
                    return Resource::failed(url, TRANSPORT_FAILURE_STATUS);
                }
                Err(_) => {
                    warn!(url, "media body outlived streaming budget");
                    return Resource::failed(url, STREAMING_FAILURE_STATUS);
                }
            }
        } else {
            match response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(url, %err, "body read failed");
                    return Resource::failed(url, TRANSPORT_FAILURE_STATUS);
                }
            }
        };

        Resource::from_content(content_type, bytes.to_vec())
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, renderer: Option<&str>) -> Resource {
        let client = self.client_for(url);

        for attempt in 1..=FETCH_ATTEMPTS {
            let mut request = client
                .get(url)
                .header(reqwest::header::USER_AGENT, user_agent_for(&self.options, renderer));
            if let Some(referer) = &self.options.referer {
                request = request.header(reqwest::header::REFERER, referer);
            }
            if let Some(cookie) = cookie_header(&self.options.cookies, url) {
                request = request.header(reqwest::header::COOKIE, cookie);
            }

            match request.send().await {
                Ok(response) => return self.consume(url, response).await,
                Err(err) => {
                    warn!(url, attempt, %err, "fetch transport failure");
                }
            }
        }

        debug!(url, "fetch attempts exhausted");
        Resource::failed(url, TRANSPORT_FAILURE_STATUS)
    }
}
