use async_trait::async_trait;

use crate::application::repos::{OptionStore, RepoError, TransientStore};

use super::{PostgresHost, map_sqlx_error};

/// `_` is a LIKE wildcard; both must match literally.
const TRANSIENT_PATTERN: &str = "%\\_transient\\_%";

#[async_trait]
impl OptionStore for PostgresHost {
    async fn get_option(&self, name: &str) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar::<_, Option<String>>(&self.sql.get_option)
            .bind(name)
            .fetch_optional(self.pool())
            .await
            .map(Option::flatten)
            .map_err(map_sqlx_error)
    }

    async fn update_option(&self, name: &str, value: &str) -> Result<(), RepoError> {
        sqlx::query(&self.sql.upsert_option)
            .bind(name)
            .bind(value)
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl TransientStore for PostgresHost {
    async fn delete_transients(&self) -> Result<u64, RepoError> {
        let result = sqlx::query(&self.sql.delete_transients)
            .bind(TRANSIENT_PATTERN)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
