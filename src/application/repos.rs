//! Ports describing the host runtime's storage.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::content::{Comment, Post};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Durable key/value options owned by the host.
#[async_trait]
pub trait OptionStore: Send + Sync {
    async fn get_option(&self, name: &str) -> Result<Option<String>, RepoError>;

    /// Insert or overwrite; concurrent writers resolve last-writer-wins.
    async fn update_option(&self, name: &str, value: &str) -> Result<(), RepoError>;
}

/// Bulk access to persisted transients.
#[async_trait]
pub trait TransientStore: Send + Sync {
    /// Delete every option whose name contains `_transient_`, returning the row count.
    async fn delete_transients(&self) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait ContentRepo: Send + Sync {
    async fn find_post(&self, id: u64) -> Result<Option<Post>, RepoError>;

    async fn find_comment(&self, id: u64) -> Result<Option<Comment>, RepoError>;
}

/// In-process cache that can be reset wholesale.
pub trait LocalCache: Send + Sync {
    fn label(&self) -> &'static str;

    /// Drop every entry, returning how many were held.
    fn clear(&self) -> usize;
}
