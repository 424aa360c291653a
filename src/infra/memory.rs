//! In-process stand-ins for the host's tables.
//!
//! Used by `serve` and the CLI when no database URL is configured, and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::application::repos::{ContentRepo, OptionStore, RepoError, TransientStore};
use crate::cache::lock::mutex_lock;
use crate::domain::content::{Comment, Post};

const TRANSIENT_MARKER: &str = "_transient_";

#[derive(Debug, Default)]
pub struct MemoryOptions {
    rows: Mutex<BTreeMap<String, String>>,
    fail_transient_deletes: AtomicBool,
}

impl MemoryOptions {
    pub fn insert(&self, name: impl Into<String>, value: impl Into<String>) {
        mutex_lock(&self.rows, "infra::memory", "insert").insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.rows, "infra::memory", "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next bulk transient deletes fail, as a broken table would.
    pub fn fail_transient_deletes(&self, fail: bool) {
        self.fail_transient_deletes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl OptionStore for MemoryOptions {
    async fn get_option(&self, name: &str) -> Result<Option<String>, RepoError> {
        Ok(mutex_lock(&self.rows, "infra::memory", "get_option")
            .get(name)
            .cloned())
    }

    async fn update_option(&self, name: &str, value: &str) -> Result<(), RepoError> {
        self.insert(name, value);
        Ok(())
    }
}

#[async_trait]
impl TransientStore for MemoryOptions {
    async fn delete_transients(&self) -> Result<u64, RepoError> {
        if self.fail_transient_deletes.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("options table is unavailable"));
        }
        let mut rows = mutex_lock(&self.rows, "infra::memory", "delete_transients");
        let before = rows.len();
        rows.retain(|name, _| !name.contains(TRANSIENT_MARKER));
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryContent {
    posts: Mutex<HashMap<u64, Post>>,
    comments: Mutex<HashMap<u64, Comment>>,
}

impl MemoryContent {
    pub fn insert_post(&self, post: Post) {
        mutex_lock(&self.posts, "infra::memory", "insert_post").insert(post.id, post);
    }

    pub fn insert_comment(&self, comment: Comment) {
        mutex_lock(&self.comments, "infra::memory", "insert_comment").insert(comment.id, comment);
    }
}

#[async_trait]
impl ContentRepo for MemoryContent {
    async fn find_post(&self, id: u64) -> Result<Option<Post>, RepoError> {
        Ok(mutex_lock(&self.posts, "infra::memory", "find_post")
            .get(&id)
            .cloned())
    }

    async fn find_comment(&self, id: u64) -> Result<Option<Comment>, RepoError> {
        Ok(mutex_lock(&self.comments, "infra::memory", "find_comment")
            .get(&id)
            .copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transient_delete_matches_marker_anywhere_in_name() {
        let options = MemoryOptions::default();
        options.insert("_site_transient_update_core", "x");
        options.insert("_transient_doing_cron", "1");
        options.insert("transient", "kept");

        assert_eq!(options.delete_transients().await.expect("delete"), 2);
        assert_eq!(
            options.get_option("transient").await.expect("read").as_deref(),
            Some("kept")
        );
    }

    #[tokio::test]
    async fn missing_comment_is_none() {
        let content = MemoryContent::default();
        content.insert_comment(Comment { id: 4, post_id: 9 });

        assert_eq!(
            content.find_comment(4).await.expect("find"),
            Some(Comment { id: 4, post_id: 9 })
        );
        assert!(content.find_comment(5).await.expect("find").is_none());
    }
}
