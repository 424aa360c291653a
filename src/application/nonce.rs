//! Short-lived, single-use tokens guarding the web flush trigger.

use std::time::Duration;

use dashmap::{DashMap, mapref::entry::Entry};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use time::OffsetDateTime;
use url::Url;

pub const ACTION_PARAM: &str = "mwp-action";
pub const NONCE_PARAM: &str = "_wpnonce";
pub const FLUSH_ACTION: &str = "cache_flush";

const NONCE_LEN: usize = 20;

pub struct NonceService {
    secret: String,
    half_life: u64,
    consumed: DashMap<String, u64>,
}

impl NonceService {
    pub fn new(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            secret: secret.into(),
            half_life: (lifetime.as_secs() / 2).max(1),
            consumed: DashMap::new(),
        }
    }

    pub fn create(&self, action: &str, user_id: u64) -> String {
        self.create_at(action, user_id, now())
    }

    /// Accept the nonce once if it was issued in this tick or the previous one.
    pub fn consume(&self, nonce: &str, action: &str, user_id: u64) -> bool {
        self.consume_at(nonce, action, user_id, now())
    }

    /// A link to `base` that triggers a full flush for this operator.
    pub fn flush_url(&self, base: &Url, user_id: u64) -> Url {
        let mut url = base.clone();
        url.query_pairs_mut()
            .append_pair(ACTION_PARAM, FLUSH_ACTION)
            .append_pair(NONCE_PARAM, &self.create(FLUSH_ACTION, user_id));
        url
    }

    fn tick(&self, now: u64) -> u64 {
        now.div_ceil(self.half_life)
    }

    fn create_at(&self, action: &str, user_id: u64, now: u64) -> String {
        self.digest(self.tick(now), action, user_id)
    }

    fn consume_at(&self, nonce: &str, action: &str, user_id: u64, now: u64) -> bool {
        if nonce.len() != NONCE_LEN {
            return false;
        }
        let tick = self.tick(now);
        let Some(issued) = [tick, tick.saturating_sub(1)].into_iter().find(|candidate| {
            bool::from(
                self.digest(*candidate, action, user_id)
                    .as_bytes()
                    .ct_eq(nonce.as_bytes()),
            )
        }) else {
            return false;
        };

        self.consumed
            .retain(|_, used_tick| used_tick.saturating_add(2) >= tick);
        match self.consumed.entry(nonce.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(issued);
                true
            }
        }
    }

    fn digest(&self, tick: u64, action: &str, user_id: u64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("{tick}|{action}|{user_id}|{}", self.secret).as_bytes());
        let mut value = hex::encode(hasher.finalize());
        value.truncate(NONCE_LEN);
        value
    }
}

fn now() -> u64 {
    u64::try_from(OffsetDateTime::now_utc().unix_timestamp()).unwrap_or_default()
}
