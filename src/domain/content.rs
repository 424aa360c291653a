//! Content records read from the host's tables.

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, PrimitiveDateTime};

pub const REVISION_POST_TYPE: &str = "revision";
pub const PAGE_POST_TYPE: &str = "page";
pub const POST_POST_TYPE: &str = "post";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    pub nicename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    pub term_id: u64,
    pub taxonomy: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: u64,
    pub post_type: String,
    pub slug: String,
    pub status: String,
    pub parent: u64,
    /// Publication date in the site's local time.
    pub date: PrimitiveDateTime,
    /// Publication date in UTC; archive links are derived from this one.
    pub date_gmt: OffsetDateTime,
    pub author: Author,
    pub terms: Vec<Term>,
}

impl Post {
    pub fn is_revision(&self) -> bool {
        self.post_type == REVISION_POST_TYPE
    }

    pub fn is_page(&self) -> bool {
        self.post_type == PAGE_POST_TYPE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub post_id: u64,
}
