use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::CookieJar;

use crate::application::auth::TokenAuthenticator;
use crate::application::links::LinkResolver;
use crate::application::nonce::NonceService;
use crate::cache::CacheState;
use crate::config::{OperatorSettings, SiteConfig, WebSettings};

#[derive(Clone)]
pub struct HttpState {
    pub cache: CacheState,
    pub auth: Arc<TokenAuthenticator>,
    pub nonces: Arc<NonceService>,
    pub operators: Arc<OperatorDirectory>,
    pub links: Arc<dyn LinkResolver>,
    pub site: Arc<SiteConfig>,
    /// Echoed in `X-MWP2-Version-ID`.
    pub version_id: u64,
}

impl FromRef<HttpState> for CacheState {
    fn from_ref(state: &HttpState) -> Self {
        state.cache.clone()
    }
}

/// Operator sessions, keyed by session cookie value.
#[derive(Debug, Clone, Default)]
pub struct OperatorDirectory {
    cookie: String,
    capability: String,
    sessions: HashMap<String, OperatorSettings>,
}

impl OperatorDirectory {
    pub fn from_settings(web: &WebSettings) -> Self {
        Self {
            cookie: web.session_cookie.clone(),
            capability: web.capability.clone(),
            sessions: web
                .operators
                .iter()
                .map(|operator| (operator.session.clone(), operator.clone()))
                .collect(),
        }
    }

    /// The operator behind the session cookie, if they may flush caches.
    pub fn authorized(&self, jar: &CookieJar) -> Option<&OperatorSettings> {
        let session = jar.get(&self.cookie)?;
        self.sessions.get(session.value()).filter(|operator| {
            operator
                .capabilities
                .iter()
                .any(|granted| granted == &self.capability)
        })
    }
}
