//! Per-execution bookkeeping of tiers already flushed and URLs already purged.

use std::collections::{BTreeSet, HashSet};

use url::Url;

use crate::domain::cache_type::CacheType;

/// Tiers already dispatched in the current execution.
#[derive(Debug, Default)]
pub struct FlushLedger {
    flushed: BTreeSet<CacheType>,
}

impl FlushLedger {
    /// The subset of `requested` not yet flushed, in canonical order.
    pub fn pending(&self, requested: &BTreeSet<CacheType>) -> Vec<CacheType> {
        requested.difference(&self.flushed).copied().collect()
    }

    pub fn record(&mut self, kinds: impl IntoIterator<Item = CacheType>) {
        self.flushed.extend(kinds);
    }

    pub fn contains(&self, kind: CacheType) -> bool {
        self.flushed.contains(&kind)
    }
}

/// Normalized URLs already sent to the edge in the current execution.
#[derive(Debug, Default)]
pub struct PurgeLedger {
    purged: HashSet<String>,
}

impl PurgeLedger {
    pub fn fresh(&self, urls: Vec<String>) -> Vec<String> {
        urls.into_iter()
            .filter(|url| !self.purged.contains(url))
            .collect()
    }

    pub fn record(&mut self, urls: &[String]) {
        self.purged.extend(urls.iter().cloned());
    }
}

/// Canonical form used for purge de-duplication.
///
/// Scheme and host are lowercased by the parser, default ports dropped, the
/// fragment removed and the path given a trailing slash. Anything that is not
/// an absolute http(s) URL yields `None`.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return None;
    }
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Some(url.into())
}

/// Normalize a batch, dropping invalid entries and keeping first occurrences.
pub fn normalize_urls<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter_map(|raw| normalize_url(raw.as_ref()))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
