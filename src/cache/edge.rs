//! Client for the external edge cache tier.
//!
//! Every site owns a cache host at `wp-cache-{site_uid}.wp-{account_uid}`.
//! A whole-site flush is a `PURGE` request carrying the site token; a targeted
//! purge is a `GET` against `_cache/delete_regex` whose `url` parameter is an
//! anchored alternation of the affected paths. Both are fire-and-forget.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use reqwest::{Client, Method};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::edge";
const METRIC_EDGE_DISPATCH_TOTAL: &str = "cachectl_edge_dispatch_total";
pub const PURGE_TOKEN_HEADER: &str = "X-Cache-Purge";
pub const DEFAULT_EDGE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("invalid edge url: {0}")]
    Url(#[from] url::ParseError),
}

/// Identity of the site on the edge network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeTarget {
    pub site_uid: String,
    pub account_uid: String,
    pub site_token: String,
}

impl EdgeTarget {
    fn cache_host(&self) -> Result<Url, EdgeError> {
        Ok(Url::parse(&format!(
            "http://wp-cache-{}.wp-{}/",
            self.site_uid, self.account_uid
        ))?)
    }

    fn web_origin_pattern(&self) -> String {
        format!(
            "^https?://wp-web-{}\\.wp-{}",
            self.site_uid, self.account_uid
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeRequest {
    Flush { url: Url, token: String },
    Purge { url: Url },
}

impl EdgeRequest {
    pub fn flush(target: &EdgeTarget) -> Result<Self, EdgeError> {
        Ok(EdgeRequest::Flush {
            url: target.cache_host()?,
            token: target.site_token.clone(),
        })
    }

    /// Build one batched purge for `urls`; `None` when no usable path remains.
    pub fn purge<S: AsRef<str>>(target: &EdgeTarget, urls: &[S]) -> Result<Option<Self>, EdgeError> {
        // The origin pattern matches either scheme, so paths alone decide uniqueness.
        let mut seen = HashSet::new();
        let alternation: Vec<String> = urls
            .iter()
            .filter_map(|raw| purge_path(raw.as_ref()))
            .filter(|path| seen.insert(path.clone()))
            .map(|path| format!("({})$", regex::escape(&path)))
            .collect();

        if alternation.is_empty() {
            return Ok(None);
        }

        let pattern = format!("{}{}", target.web_origin_pattern(), alternation.join("|"));
        let mut url = target.cache_host()?.join("_cache/delete_regex")?;
        url.query_pairs_mut().append_pair("url", &pattern);

        Ok(Some(EdgeRequest::Purge { url }))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EdgeRequest::Flush { .. } => "flush",
            EdgeRequest::Purge { .. } => "purge",
        }
    }

    pub fn url(&self) -> &Url {
        match self {
            EdgeRequest::Flush { url, .. } | EdgeRequest::Purge { url } => url,
        }
    }

    /// The decoded `url` pattern of a purge request.
    pub fn purge_pattern(&self) -> Option<String> {
        match self {
            EdgeRequest::Purge { url } => url
                .query_pairs()
                .find(|(key, _)| key == "url")
                .map(|(_, value)| value.into_owned()),
            EdgeRequest::Flush { .. } => None,
        }
    }
}

/// Path of `raw` with a trailing slash, as the edge stores it.
fn purge_path(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    let path = parsed.path();
    if path.ends_with('/') {
        Some(path.to_string())
    } else {
        Some(format!("{path}/"))
    }
}

/// Outbound channel to the edge; implementations must not block the caller.
pub trait EdgeTransport: Send + Sync {
    fn dispatch(&self, request: EdgeRequest);
}

/// Sends edge requests on detached tokio tasks with a hard timeout.
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
    inflight: Mutex<Vec<JoinHandle<()>>>,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            timeout,
            inflight: Mutex::new(Vec::new()),
        })
    }

    /// Wait for requests still in flight; each is bounded by the transport timeout.
    pub async fn settle(&self) {
        let pending: Vec<JoinHandle<()>> =
            mutex_lock(&self.inflight, SOURCE, "settle").drain(..).collect();
        if pending.is_empty() {
            return;
        }
        debug!(pending = pending.len(), "Waiting for edge requests to settle");
        join_all(pending).await;
    }

    fn build(&self, request: &EdgeRequest) -> Option<reqwest::RequestBuilder> {
        let builder = match request {
            EdgeRequest::Flush { url, token } => {
                let method = match Method::from_bytes(b"PURGE") {
                    Ok(method) => method,
                    Err(err) => {
                        warn!(error = %err, "PURGE method rejected by http client");
                        return None;
                    }
                };
                self.client
                    .request(method, url.clone())
                    .header(PURGE_TOKEN_HEADER, token)
            }
            EdgeRequest::Purge { url } => self.client.get(url.clone()),
        };
        Some(builder.timeout(self.timeout))
    }
}

impl EdgeTransport for ReqwestTransport {
    fn dispatch(&self, request: EdgeRequest) {
        counter!(METRIC_EDGE_DISPATCH_TOTAL, "kind" => request.kind()).increment(1);

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(kind = request.kind(), "No async runtime; edge request dropped");
                return;
            }
        };
        let Some(builder) = self.build(&request) else {
            return;
        };

        let kind = request.kind();
        let target = request.url().host_str().unwrap_or_default().to_string();
        let handle = runtime.spawn(async move {
            match builder.send().await {
                Ok(response) => debug!(
                    kind,
                    host = %target,
                    status = response.status().as_u16(),
                    "Edge request completed"
                ),
                Err(err) => debug!(kind, host = %target, error = %err, "Edge request failed"),
            }
        });

        let mut inflight = mutex_lock(&self.inflight, SOURCE, "dispatch");
        inflight.retain(|pending| !pending.is_finished());
        inflight.push(handle);
    }
}
