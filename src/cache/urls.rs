//! URLs under which a content item may be cached at the edge.

use std::collections::HashSet;

use tracing::warn;

use crate::application::links::{LinkResolver, untrailingslashit};
use crate::application::repos::RepoError;
use crate::domain::content::Post;

/// Best-guess list of every page a post can appear on.
///
/// Order: home, permalink, post type archive, year, month and day archives
/// (from the UTC date), author archive, then one link per attached term.
/// Links that do not exist or fail to resolve are dropped and duplicates
/// removed. Revisions have no public URLs.
pub async fn content_urls(post: &Post, links: &dyn LinkResolver) -> Vec<String> {
    if post.is_revision() {
        return Vec::new();
    }

    let date = post.date_gmt;
    let (year, month, day) = (date.year(), u8::from(date.month()), date.day());

    let mut candidates = vec![
        links
            .home_url()
            .await
            .map(|home| Some(untrailingslashit(&home).to_string())),
        links.permalink(post).await,
        links.post_type_archive(&post.post_type).await,
        links.year_link(year).await,
        links.month_link(year, month).await,
        links.day_link(year, month, day).await,
        links.author_link(&post.author).await,
    ];
    for term in &post.terms {
        candidates.push(links.term_link(term).await);
    }

    collect_links(post.id, candidates)
}

fn collect_links(post_id: u64, candidates: Vec<Result<Option<String>, RepoError>>) -> Vec<String> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter_map(|candidate| match candidate {
            Ok(link) => link,
            Err(err) => {
                warn!(post_id, error = %err, "Skipping unresolvable content link");
                None
            }
        })
        .filter(|link| !link.is_empty())
        .filter(|link| seen.insert(link.clone()))
        .collect()
}
