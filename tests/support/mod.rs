#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cachectl::application::auth::{SsoVerifier, TokenAuthenticator};
use cachectl::application::links::{LinkConfig, LinkResolver, PermalinkResolver, TemplateCache};
use cachectl::application::nonce::NonceService;
use cachectl::application::repos::LocalCache;
use cachectl::cache::drivers::{
    CachedOptionStore, HttpDriver, ObjectDriver, ObjectStore, OpcodeDriver, TransientDriver,
};
use cachectl::cache::{CacheState, DriverSet, EdgeRequest, EdgeTarget, EdgeTransport};
use cachectl::config::{OperatorSettings, SiteConfig, WebSettings};
use cachectl::domain::content::{Author, Comment, Post, Term};
use cachectl::infra::http::{HttpState, OperatorDirectory};
use cachectl::infra::memory::{MemoryContent, MemoryOptions};
use time::macros::datetime;

pub const SITE_UID: &str = "6f1c2a9e-3b4d-4c5e-8f70-112233445566";
pub const ACCOUNT_UID: &str = "acct";
pub const SITE_TOKEN: &str = "0123456789abcdef0123456789abcdef";
pub const HOME: &str = "https://example.com";
pub const OPERATOR_SESSION: &str = "operator-session";
pub const OPERATOR_ID: u64 = 1;

#[derive(Default)]
pub struct CapturedTransport {
    requests: Mutex<Vec<EdgeRequest>>,
}

impl CapturedTransport {
    pub fn requests(&self) -> Vec<EdgeRequest> {
        self.requests.lock().expect("captured requests").clone()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.kind() == kind)
            .count()
    }
}

impl EdgeTransport for CapturedTransport {
    fn dispatch(&self, request: EdgeRequest) {
        self.requests.lock().expect("captured requests").push(request);
    }
}

pub struct StaticSso(pub bool);

#[async_trait]
impl SsoVerifier for StaticSso {
    async fn verify(&self, _token: &str) -> bool {
        self.0
    }
}

/// Every tier wired to in-memory host tables and a captured edge.
pub struct Fixture {
    pub options: Arc<MemoryOptions>,
    pub content: Arc<MemoryContent>,
    pub transport: Arc<CapturedTransport>,
    pub object_store: Arc<ObjectStore>,
    pub templates: Arc<TemplateCache>,
    pub drivers: Arc<DriverSet>,
    pub links: Arc<dyn LinkResolver>,
}

impl Fixture {
    pub fn new() -> Self {
        let options = Arc::new(MemoryOptions::default());
        options.insert("home", format!("{HOME}/"));
        options.insert("permalink_structure", "/%year%/%monthnum%/%postname%/");
        let content = Arc::new(MemoryContent::default());
        let transport = Arc::new(CapturedTransport::default());
        let object_store = Arc::new(ObjectStore::new(
            std::num::NonZeroUsize::new(64).expect("non-zero"),
        ));
        let templates = Arc::new(TemplateCache::default());

        let links: Arc<dyn LinkResolver> = Arc::new(PermalinkResolver::new(
            Arc::new(CachedOptionStore::new(options.clone(), object_store.clone())),
            content.clone(),
            templates.clone(),
            LinkConfig {
                default_home: HOME.to_string(),
                archive_post_types: Default::default(),
            },
        ));

        let compiled: Arc<dyn LocalCache> = templates.clone();
        let drivers = DriverSet::new()
            .with(HttpDriver::new(edge_target(), transport.clone()))
            .with(ObjectDriver::new(object_store.clone(), options.clone()))
            .with(OpcodeDriver::new(Some(compiled)))
            .with(TransientDriver::new(options.clone()));

        Self {
            options,
            content,
            transport,
            object_store,
            templates,
            drivers: Arc::new(drivers),
            links,
        }
    }

    pub fn http_state(&self, sso: bool) -> HttpState {
        HttpState {
            cache: CacheState::new(self.drivers.clone()),
            auth: Arc::new(TokenAuthenticator::new(
                SITE_TOKEN,
                Arc::new(StaticSso(sso)),
            )),
            nonces: Arc::new(nonces()),
            operators: Arc::new(OperatorDirectory::from_settings(&web_settings())),
            links: self.links.clone(),
            site: Arc::new(site_config()),
            version_id: 42,
        }
    }
}

pub fn edge_target() -> EdgeTarget {
    EdgeTarget {
        site_uid: SITE_UID.to_string(),
        account_uid: ACCOUNT_UID.to_string(),
        site_token: SITE_TOKEN.to_string(),
    }
}

pub fn site_config() -> SiteConfig {
    SiteConfig {
        site_uid: SITE_UID.to_string(),
        account_uid: ACCOUNT_UID.to_string(),
        site_token: SITE_TOKEN.to_string(),
        default_site_url: HOME.to_string(),
        api_url: None,
        extra: BTreeMap::new(),
    }
}

pub fn nonces() -> NonceService {
    NonceService::new("nonce-secret", Duration::from_secs(86_400))
}

pub fn web_settings() -> WebSettings {
    WebSettings {
        capability: "install_plugins".to_string(),
        nonce_lifetime: Duration::from_secs(86_400),
        session_cookie: "mwp_session".to_string(),
        nonce_secret: Some("nonce-secret".to_string()),
        operators: vec![
            OperatorSettings {
                user_id: OPERATOR_ID,
                session: OPERATOR_SESSION.to_string(),
                capabilities: vec!["install_plugins".to_string()],
            },
            OperatorSettings {
                user_id: 2,
                session: "editor-session".to_string(),
                capabilities: vec!["edit_posts".to_string()],
            },
        ],
    }
}

/// Published on 2021-03-15 in category "news" by author "jordan".
pub fn news_post(id: u64, slug: &str) -> Post {
    Post {
        id,
        post_type: "post".to_string(),
        slug: slug.to_string(),
        status: "publish".to_string(),
        parent: 0,
        date: datetime!(2021-03-15 09:30:00),
        date_gmt: datetime!(2021-03-15 14:30:00 UTC),
        author: Author {
            id: 7,
            nicename: "jordan".to_string(),
        },
        terms: vec![Term {
            term_id: 3,
            taxonomy: "category".to_string(),
            slug: "news".to_string(),
        }],
    }
}

pub fn comment(id: u64, post_id: u64) -> Comment {
    Comment { id, post_id }
}

pub fn news_post_urls(slug: &str) -> Vec<String> {
    vec![
        HOME.to_string(),
        format!("{HOME}/2021/03/{slug}/"),
        format!("{HOME}/"),
        format!("{HOME}/2021/"),
        format!("{HOME}/2021/03/"),
        format!("{HOME}/2021/03/15/"),
        format!("{HOME}/author/jordan/"),
        format!("{HOME}/category/news/"),
    ]
}
