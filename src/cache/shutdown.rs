//! End-of-execution repeats.
//!
//! Every tier flushed during an execution is flushed once more when the
//! execution ends, so a concurrent writer that repopulated it in between
//! does not leave stale entries behind.

use crate::domain::cache_type::CacheType;

#[derive(Debug, Default)]
pub struct DeferredQueue {
    entries: Vec<CacheType>,
    drained: bool,
}

impl DeferredQueue {
    /// Append a repeat. Ignored once the queue has been drained.
    pub fn push(&mut self, kind: CacheType) -> bool {
        if self.drained {
            return false;
        }
        self.entries.push(kind);
        true
    }

    /// Take all entries in append order; later calls return nothing.
    pub fn drain(&mut self) -> Vec<CacheType> {
        if self.drained {
            return Vec::new();
        }
        self.drained = true;
        std::mem::take(&mut self.entries)
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_once_in_append_order() {
        let mut queue = DeferredQueue::default();
        queue.push(CacheType::Transient);
        queue.push(CacheType::Http);

        assert_eq!(queue.drain(), vec![CacheType::Transient, CacheType::Http]);
        assert!(queue.drain().is_empty());
        assert!(!queue.push(CacheType::Object));
        assert!(queue.is_empty());
    }
}
