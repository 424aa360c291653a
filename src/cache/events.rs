//! Notifications fired after the registry does work.

use std::collections::BTreeMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::cache_type::CacheType;

use super::drivers::FlushOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// One or more tiers were flushed, with the outcome of each.
    Flushed(BTreeMap<CacheType, FlushOutcome>),
    /// URLs were sent to the edge for purge.
    Purged(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CacheEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: OffsetDateTime,
}

impl CacheEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Receives registry events. Observers run inline, after the work is done.
#[async_trait]
pub trait CacheObserver: Send + Sync {
    async fn on_event(&self, event: &CacheEvent);
}
