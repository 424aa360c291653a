use async_trait::async_trait;
use time::PrimitiveDateTime;

use crate::application::repos::{ContentRepo, RepoError};
use crate::domain::content::{Author, Comment, Post, Term};

use super::{PostgresHost, map_sqlx_error, to_i64, to_u64};

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    post_type: String,
    post_name: String,
    post_status: String,
    post_parent: i64,
    post_date: PrimitiveDateTime,
    post_date_gmt: PrimitiveDateTime,
    post_author: i64,
    user_nicename: String,
}

#[derive(sqlx::FromRow)]
struct TermRow {
    term_id: i64,
    taxonomy: String,
    slug: String,
}

#[derive(sqlx::FromRow)]
struct CommentRow {
    comment_id: i64,
    comment_post_id: i64,
}

impl PostRow {
    fn into_post(self, terms: Vec<Term>) -> Result<Post, RepoError> {
        Ok(Post {
            id: to_u64(self.id, "id")?,
            post_type: self.post_type,
            slug: self.post_name,
            status: self.post_status,
            parent: to_u64(self.post_parent, "post_parent")?,
            date: self.post_date,
            date_gmt: self.post_date_gmt.assume_utc(),
            author: Author {
                id: to_u64(self.post_author, "post_author")?,
                nicename: self.user_nicename,
            },
            terms,
        })
    }
}

impl TryFrom<TermRow> for Term {
    type Error = RepoError;

    fn try_from(row: TermRow) -> Result<Self, Self::Error> {
        Ok(Term {
            term_id: to_u64(row.term_id, "term_id")?,
            taxonomy: row.taxonomy,
            slug: row.slug,
        })
    }
}

#[async_trait]
impl ContentRepo for PostgresHost {
    async fn find_post(&self, id: u64) -> Result<Option<Post>, RepoError> {
        let id = to_i64(id)?;
        let Some(row) = sqlx::query_as::<_, PostRow>(&self.sql.find_post)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
        else {
            return Ok(None);
        };

        let terms = sqlx::query_as::<_, TermRow>(&self.sql.post_terms)
            .bind(id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .into_iter()
            .map(Term::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        row.into_post(terms).map(Some)
    }

    async fn find_comment(&self, id: u64) -> Result<Option<Comment>, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(&self.sql.find_comment)
            .bind(to_i64(id)?)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(|row| {
            Ok(Comment {
                id: to_u64(row.comment_id, "comment_id")?,
                post_id: to_u64(row.comment_post_id, "comment_post_id")?,
            })
        })
        .transpose()
    }
}
