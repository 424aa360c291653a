//! Forwards CLI flushes of process-local tiers to the running service.
//!
//! The object and opcode caches live inside the long-running server, so a
//! flush issued from the command line only clears the CLI's own copy. The
//! relay replays those tiers against the service's REST route.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url, header};
use tracing::{debug, info, warn};

use crate::cache::{CacheEvent, CacheObserver, EventKind};
use crate::config::SiteConfig;
use crate::domain::cache_type::CacheType;

const RELAYED_TYPES: [CacheType; 2] = [CacheType::Object, CacheType::Opcode];

pub struct RestRelay {
    client: Client,
    endpoint: Url,
    site_token: String,
}

impl RestRelay {
    pub fn new(site: &SiteConfig, timeout: Duration) -> Result<Self, RelayError> {
        let mut endpoint = Url::parse(&site.default_site_url)?;
        endpoint
            .path_segments_mut()
            .map_err(|()| RelayError::Base(site.default_site_url.clone()))?
            .pop_if_empty()
            .extend(["wp-json", site.site_uid.as_str(), "v1", "cache"]);

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            site_token: site.site_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn relay(&self, kind: CacheType) {
        let method = match Method::from_bytes(b"FLUSH") {
            Ok(method) => method,
            Err(err) => {
                warn!(error = %err, "FLUSH method rejected by http client");
                return;
            }
        };
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("types", kind.as_str());

        let result = self
            .client
            .request(method, url)
            .header(header::AUTHORIZATION, format!("Token {}", self.site_token))
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(cache_type = %kind, "Flush relayed to the site");
            }
            Ok(response) => {
                warn!(
                    cache_type = %kind,
                    status = response.status().as_u16(),
                    "Site refused relayed flush"
                );
            }
            Err(err) => warn!(cache_type = %kind, error = %err, "Flush relay failed"),
        }
    }
}

#[async_trait]
impl CacheObserver for RestRelay {
    async fn on_event(&self, event: &CacheEvent) {
        let EventKind::Flushed(outcomes) = &event.kind else {
            return;
        };
        for kind in RELAYED_TYPES {
            if outcomes.contains_key(&kind) {
                self.relay(kind).await;
            } else {
                debug!(cache_type = %kind, "Nothing to relay");
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid site url: {0}")]
    Url(#[from] url::ParseError),
    #[error("site url `{0}` cannot carry a path")]
    Base(String),
    #[error("failed to build relay client: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use httpmock::MockServer;

    use super::*;
    use crate::cache::FlushOutcome;

    const SITE_UID: &str = "6f1c2a9e-3b4d-4c5e-8f70-112233445566";
    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    fn site(base: String) -> SiteConfig {
        SiteConfig {
            site_uid: SITE_UID.to_string(),
            account_uid: "acct".to_string(),
            site_token: TOKEN.to_string(),
            default_site_url: base,
            api_url: None,
            extra: BTreeMap::new(),
        }
    }

    fn flushed(types: &[CacheType]) -> CacheEvent {
        CacheEvent::new(EventKind::Flushed(
            types
                .iter()
                .map(|kind| (*kind, FlushOutcome::Flushed))
                .collect(),
        ))
    }

    #[tokio::test]
    async fn relays_object_and_opcode_once_each() {
        let server = MockServer::start();
        let path = format!("/wp-json/{SITE_UID}/v1/cache");
        let object = server.mock(|when, then| {
            when.method("FLUSH")
                .path(path.as_str())
                .query_param("types", "object")
                .header("authorization", format!("Token {TOKEN}"));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"object":true}"#);
        });
        let opcode = server.mock(|when, then| {
            when.method("FLUSH")
                .path(path.as_str())
                .query_param("types", "opcode");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"opcode":true}"#);
        });

        let relay = RestRelay::new(&site(server.base_url()), Duration::from_secs(5))
            .expect("relay");
        relay
            .on_event(&flushed(&[
                CacheType::Http,
                CacheType::Object,
                CacheType::Opcode,
                CacheType::Transient,
            ]))
            .await;

        object.assert();
        opcode.assert();
    }

    #[tokio::test]
    async fn other_tiers_and_purges_are_not_relayed() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.method("FLUSH");
            then.status(200);
        });

        let relay = RestRelay::new(&site(server.base_url()), Duration::from_secs(5))
            .expect("relay");
        relay.on_event(&flushed(&[CacheType::Transient])).await;
        relay
            .on_event(&CacheEvent::new(EventKind::Purged(vec![
                "https://example.com/".to_string(),
            ])))
            .await;

        any.assert_calls(0);
    }

    #[tokio::test]
    async fn refused_relay_does_not_fail() {
        let server = MockServer::start();
        let refused = server.mock(|when, then| {
            when.method("FLUSH");
            then.status(404);
        });

        let relay = RestRelay::new(&site(server.base_url()), Duration::from_secs(5))
            .expect("relay");
        relay.on_event(&flushed(&[CacheType::Object])).await;
        refused.assert();
    }

    #[test]
    fn endpoint_keeps_site_subdirectory() {
        let relay = RestRelay::new(
            &site("https://example.com/blog/".to_string()),
            Duration::from_secs(1),
        )
        .expect("relay");
        assert_eq!(
            relay.endpoint().as_str(),
            format!("https://example.com/blog/wp-json/{SITE_UID}/v1/cache")
        );
    }
}
