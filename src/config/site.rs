//! The read-only site document provisioned by the hosting platform.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{LoadError, SiteSettings};

const PLATFORM_SITE_DOCUMENT: &str = "/site/private/site.json";
const LOCAL_SITE_DOCUMENT: &str = "config-local.json";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SiteConfig {
    pub site_uid: String,
    pub account_uid: String,
    pub site_token: String,
    pub default_site_url: String,
    #[serde(default)]
    pub api_url: Option<String>,
    /// Keys this crate does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl SiteConfig {
    /// Lookup for keys outside the typed fields.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    fn validate(self, path: &str) -> Result<Self, LoadError> {
        let invalid = |reason: &str| LoadError::SiteDocument {
            path: path.to_string(),
            reason: reason.to_string(),
        };
        if self.site_uid.trim().is_empty() {
            return Err(invalid("`site_uid` must not be empty"));
        }
        if self.account_uid.trim().is_empty() {
            return Err(invalid("`account_uid` must not be empty"));
        }
        if self.site_token.is_empty() {
            return Err(invalid("`site_token` must not be empty"));
        }
        Url::parse(&self.default_site_url)
            .map_err(|err| invalid(&format!("`default_site_url` is not a URL: {err}")))?;
        Ok(self)
    }
}

/// Search order: explicit path, platform location, then the content directory.
pub fn site_config_candidates(settings: &SiteSettings) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(3);
    if let Some(path) = settings.config_path.as_ref() {
        paths.push(path.clone());
    }
    paths.push(PathBuf::from(PLATFORM_SITE_DOCUMENT));
    paths.push(settings.content_dir.join(LOCAL_SITE_DOCUMENT));
    paths
}

/// Load the first readable site document.
pub fn load_site_config(settings: &SiteSettings) -> Result<SiteConfig, LoadError> {
    let candidates = site_config_candidates(settings);
    for path in &candidates {
        let shown = path.display().to_string();
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                debug!(path = %shown, error = %err, "Site document not readable; trying next");
                continue;
            }
            Err(err) => {
                return Err(LoadError::SiteDocument {
                    path: shown,
                    reason: err.to_string(),
                });
            }
        };

        let document: SiteConfig =
            serde_json::from_str(&contents).map_err(|err| LoadError::SiteDocument {
                path: shown.clone(),
                reason: err.to_string(),
            })?;
        return document.validate(&shown);
    }

    Err(LoadError::MissingSiteDocument {
        searched: candidates
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}
