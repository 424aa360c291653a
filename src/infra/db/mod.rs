//! Postgres adapters over the host's tables.
//!
//! The schema belongs to the host; table names share a configurable prefix.

mod content;
mod options;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::application::repos::RepoError;

/// Statements rendered once for a table prefix.
#[derive(Debug)]
struct Statements {
    get_option: String,
    upsert_option: String,
    delete_transients: String,
    find_post: String,
    post_terms: String,
    find_comment: String,
}

impl Statements {
    fn new(prefix: &str) -> Self {
        let options = format!("{prefix}options");
        let posts = format!("{prefix}posts");
        let users = format!("{prefix}users");
        let comments = format!("{prefix}comments");
        let terms = format!("{prefix}terms");
        let term_taxonomy = format!("{prefix}term_taxonomy");
        let term_relationships = format!("{prefix}term_relationships");

        Self {
            get_option: format!("SELECT option_value FROM {options} WHERE option_name = $1"),
            upsert_option: format!(
                "INSERT INTO {options} (option_name, option_value, autoload) \
                 VALUES ($1, $2, 'no') \
                 ON CONFLICT (option_name) DO UPDATE SET option_value = EXCLUDED.option_value"
            ),
            delete_transients: format!("DELETE FROM {options} WHERE option_name LIKE $1"),
            find_post: format!(
                "SELECT p.id, p.post_type, p.post_name, p.post_status, p.post_parent, \
                        p.post_date, p.post_date_gmt, p.post_author, \
                        COALESCE(u.user_nicename, '') AS user_nicename \
                 FROM {posts} p \
                 LEFT JOIN {users} u ON u.id = p.post_author \
                 WHERE p.id = $1"
            ),
            post_terms: format!(
                "SELECT t.term_id, tt.taxonomy, t.slug \
                 FROM {term_relationships} tr \
                 INNER JOIN {term_taxonomy} tt ON tt.term_taxonomy_id = tr.term_taxonomy_id \
                 INNER JOIN {terms} t ON t.term_id = tt.term_id \
                 WHERE tr.object_id = $1 \
                 ORDER BY tt.taxonomy, t.term_id"
            ),
            find_comment: format!(
                "SELECT comment_id, comment_post_id FROM {comments} WHERE comment_id = $1"
            ),
        }
    }
}

#[derive(Clone)]
pub struct PostgresHost {
    pool: Arc<PgPool>,
    sql: Arc<Statements>,
}

impl PostgresHost {
    /// `table_prefix` must already be validated as `[A-Za-z0-9_]+`.
    pub fn new(pool: PgPool, table_prefix: &str) -> Self {
        Self {
            pool: Arc::new(pool),
            sql: Arc::new(Statements::new(table_prefix)),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }
}

fn to_u64(value: i64, column: &str) -> Result<u64, RepoError> {
    u64::try_from(value)
        .map_err(|_| RepoError::from_persistence(format!("negative value in `{column}`")))
}

fn to_i64(value: u64) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::InvalidInput {
        message: format!("id {value} exceeds supported range"),
    })
}
