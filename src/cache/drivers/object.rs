use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::application::repos::{LocalCache, OptionStore, RepoError};
use crate::cache::lock::mutex_lock;

use super::FlushOutcome;

const SOURCE: &str = "cache::drivers::object";
const METRIC_OBJECT_HIT_TOTAL: &str = "cachectl_object_cache_hit_total";
const METRIC_OBJECT_MISS_TOTAL: &str = "cachectl_object_cache_miss_total";

/// Option recording when the object tier was last cleared.
pub const LAST_OBJECT_CACHE_FLUSH_OPTION: &str = "mwp_system_last_object_cache_flush";

/// In-process object cache with LRU eviction.
pub struct ObjectStore {
    entries: Mutex<LruCache<String, String>>,
}

impl ObjectStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = mutex_lock(&self.entries, SOURCE, "get").get(key).cloned();
        match value {
            Some(_) => counter!(METRIC_OBJECT_HIT_TOTAL).increment(1),
            None => counter!(METRIC_OBJECT_MISS_TOTAL).increment(1),
        }
        value
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        mutex_lock(&self.entries, SOURCE, "insert").put(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LocalCache for ObjectStore {
    fn label(&self) -> &'static str {
        "object"
    }

    fn clear(&self) -> usize {
        let mut entries = mutex_lock(&self.entries, SOURCE, "clear");
        let held = entries.len();
        entries.clear();
        held
    }
}

/// Read-through option cache backed by an [`ObjectStore`].
pub struct CachedOptionStore {
    inner: Arc<dyn OptionStore>,
    cache: Arc<ObjectStore>,
}

impl CachedOptionStore {
    pub fn new(inner: Arc<dyn OptionStore>, cache: Arc<ObjectStore>) -> Self {
        Self { inner, cache }
    }

    fn key(name: &str) -> String {
        format!("options:{name}")
    }
}

#[async_trait]
impl OptionStore for CachedOptionStore {
    async fn get_option(&self, name: &str) -> Result<Option<String>, RepoError> {
        if let Some(value) = self.cache.get(&Self::key(name)) {
            return Ok(Some(value));
        }
        let value = self.inner.get_option(name).await?;
        if let Some(value) = value.as_ref() {
            self.cache.insert(Self::key(name), value.clone());
        }
        Ok(value)
    }

    async fn update_option(&self, name: &str, value: &str) -> Result<(), RepoError> {
        self.inner.update_option(name, value).await?;
        self.cache.insert(Self::key(name), value);
        Ok(())
    }
}

/// Object tier: clears the in-process caches and records the flush time.
pub struct ObjectDriver {
    primary: Arc<dyn LocalCache>,
    user_cache: Option<Arc<dyn LocalCache>>,
    options: Arc<dyn OptionStore>,
}

impl ObjectDriver {
    pub fn new(primary: Arc<dyn LocalCache>, options: Arc<dyn OptionStore>) -> Self {
        Self {
            primary,
            user_cache: None,
            options,
        }
    }

    pub fn with_user_cache(mut self, cache: Arc<dyn LocalCache>) -> Self {
        self.user_cache = Some(cache);
        self
    }

    pub async fn flush(&self) -> FlushOutcome {
        let cleared = self.primary.clear();
        debug!(cache = self.primary.label(), cleared, "Local cache cleared");

        if let Some(user_cache) = self.user_cache.as_ref() {
            let cleared = user_cache.clear();
            debug!(cache = user_cache.label(), cleared, "Local cache cleared");
        }

        let now = OffsetDateTime::now_utc().unix_timestamp().to_string();
        if let Err(err) = self
            .options
            .update_option(LAST_OBJECT_CACHE_FLUSH_OPTION, &now)
            .await
        {
            warn!(
                option = LAST_OBJECT_CACHE_FLUSH_OPTION,
                error = %err,
                "Failed to record object cache flush time"
            );
        }

        FlushOutcome::Flushed
    }
}
