//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::BTreeSet,
    env,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;
mod site;

pub use cli::{
    CacheArgs, CacheCommand, CliArgs, Command, FlushArgs, PurgeArgs, ServeArgs, ServeOverrides,
    SiteOverrides,
};
pub use site::{SiteConfig, load_site_config, site_config_candidates};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cachectl";
const ENV_PREFIX: &str = "CACHECTL";
const VERSION_ID_ENV: &str = "MWP2_VERSION_ID";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_TABLE_PREFIX: &str = "wp_";
const DEFAULT_CONTENT_DIR: &str = "wp-content";
const DEFAULT_EDGE_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_OBJECT_CACHE_LIMIT: u64 = 10_000;
const DEFAULT_RELAY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_CAPABILITY: &str = "install_plugins";
const DEFAULT_NONCE_LIFETIME_SECS: u64 = 86_400;
const DEFAULT_SESSION_COOKIE: &str = "mwp_session";
const DEFAULT_IDENTITY_TIMEOUT_SECS: u64 = 5;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub site: SiteSettings,
    pub cache: CacheSettings,
    pub web: WebSettings,
    pub identity: IdentitySettings,
    pub links: LinkSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
    /// Deployment revision echoed in `X-MWP2-Version-ID`.
    pub version_id: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub table_prefix: String,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub config_path: Option<PathBuf>,
    pub content_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub edge_timeout: Duration,
    pub object_cache_limit: NonZeroUsize,
    /// Bound on each flush the CLI relays to the running service.
    pub relay_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct WebSettings {
    pub capability: String,
    pub nonce_lifetime: Duration,
    pub session_cookie: String,
    /// Falls back to the site token when unset.
    pub nonce_secret: Option<String>,
    pub operators: Vec<OperatorSettings>,
}

/// An operator session known to the web trigger.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperatorSettings {
    pub user_id: u64,
    pub session: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LinkSettings {
    pub archive_post_types: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("site document `{path}` is unreadable: {reason}")]
    SiteDocument { path: String, reason: String },
    #[error("no site document found (searched: {searched})")]
    MissingSiteDocument { searched: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Cache(args)) => raw.apply_site_overrides(&args.site),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    site: RawSiteSettings,
    cache: RawCacheSettings,
    web: RawWebSettings,
    identity: RawIdentitySettings,
    links: RawLinkSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(timeout) = overrides.cache_edge_timeout_ms {
            self.cache.edge_timeout_ms = Some(timeout);
        }

        self.apply_site_overrides(&overrides.site);
    }

    fn apply_site_overrides(&mut self, overrides: &SiteOverrides) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(path) = overrides.site_config.as_ref() {
            self.site.config_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            site,
            cache,
            web,
            identity,
            links,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            site: build_site_settings(site),
            cache: build_cache_settings(cache)?,
            web: build_web_settings(web)?,
            identity: build_identity_settings(identity)?,
            links: build_link_settings(links),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    let version_id = match server.version_id {
        Some(id) => id,
        None => env::var(VERSION_ID_ENV)
            .ok()
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0),
    };

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
        version_id,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let table_prefix = database
        .table_prefix
        .unwrap_or_else(|| DEFAULT_TABLE_PREFIX.to_string());
    if table_prefix.is_empty()
        || !table_prefix
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(LoadError::invalid(
            "database.table_prefix",
            "must be non-empty and contain only ASCII letters, digits or underscores",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        table_prefix,
    })
}

fn build_site_settings(site: RawSiteSettings) -> SiteSettings {
    SiteSettings {
        config_path: site.config_path.filter(|path| !path.as_os_str().is_empty()),
        content_dir: site
            .content_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR)),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let edge_timeout_ms = cache.edge_timeout_ms.unwrap_or(DEFAULT_EDGE_TIMEOUT_MS);
    if edge_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.edge_timeout_ms",
            "must be greater than zero",
        ));
    }

    let limit = cache
        .object_cache_limit
        .unwrap_or(DEFAULT_OBJECT_CACHE_LIMIT);
    let object_cache_limit = usize::try_from(limit)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid("cache.object_cache_limit", "must be a positive size")
        })?;

    let relay_timeout_ms = cache.relay_timeout_ms.unwrap_or(DEFAULT_RELAY_TIMEOUT_MS);
    if relay_timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.relay_timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        edge_timeout: Duration::from_millis(edge_timeout_ms),
        object_cache_limit,
        relay_timeout: Duration::from_millis(relay_timeout_ms),
    })
}

fn build_web_settings(web: RawWebSettings) -> Result<WebSettings, LoadError> {
    let capability = web
        .capability
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CAPABILITY.to_string());
    if capability.is_empty() {
        return Err(LoadError::invalid("web.capability", "must not be empty"));
    }

    let lifetime = web
        .nonce_lifetime_seconds
        .unwrap_or(DEFAULT_NONCE_LIFETIME_SECS);
    if lifetime < 2 {
        return Err(LoadError::invalid(
            "web.nonce_lifetime_seconds",
            "must be at least two seconds",
        ));
    }

    let session_cookie = web
        .session_cookie
        .unwrap_or_else(|| DEFAULT_SESSION_COOKIE.to_string());
    if session_cookie.is_empty() {
        return Err(LoadError::invalid("web.session_cookie", "must not be empty"));
    }

    if web.operators.iter().any(|operator| operator.session.is_empty()) {
        return Err(LoadError::invalid(
            "web.operators",
            "every operator needs a session value",
        ));
    }

    Ok(WebSettings {
        capability,
        nonce_lifetime: Duration::from_secs(lifetime),
        session_cookie,
        nonce_secret: web.nonce_secret.filter(|secret| !secret.is_empty()),
        operators: web.operators,
    })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let seconds = identity
        .timeout_seconds
        .unwrap_or(DEFAULT_IDENTITY_TIMEOUT_SECS);
    if seconds == 0 {
        return Err(LoadError::invalid(
            "identity.timeout_seconds",
            "must be greater than zero",
        ));
    }
    Ok(IdentitySettings {
        timeout: Duration::from_secs(seconds),
    })
}

fn build_link_settings(links: RawLinkSettings) -> LinkSettings {
    LinkSettings {
        archive_post_types: links
            .archive_post_types
            .into_iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
    version_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    table_prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    config_path: Option<PathBuf>,
    content_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    edge_timeout_ms: Option<u64>,
    object_cache_limit: Option<u64>,
    relay_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWebSettings {
    capability: Option<String>,
    nonce_lifetime_seconds: Option<u64>,
    session_cookie: Option<String>,
    nonce_secret: Option<String>,
    operators: Vec<OperatorSettings>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLinkSettings {
    archive_post_types: Vec<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
