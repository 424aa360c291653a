//! Public link resolution for content items.
//!
//! Mirrors how the host builds permalinks and archive links from its
//! permalink settings, both for plain (`?p=12`) and pretty
//! (`/2021/03/hello/`) link styles.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::application::repos::{ContentRepo, LocalCache, OptionStore, RepoError};
use crate::cache::lock::mutex_lock;
use crate::domain::content::{Author, POST_POST_TYPE, Post, Term};

const SOURCE: &str = "application::links";
const MAX_PAGE_DEPTH: usize = 16;
const CATEGORY_TAXONOMY: &str = "category";
const TAG_TAXONOMY: &str = "post_tag";
const DEFAULT_CATEGORY_SLUG: &str = "uncategorized";

/// Resolves the public URLs a content item can appear under.
///
/// `Ok(None)` means the link does not exist for this site configuration.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    async fn home_url(&self) -> Result<String, RepoError>;
    async fn permalink(&self, post: &Post) -> Result<Option<String>, RepoError>;
    async fn post_type_archive(&self, post_type: &str) -> Result<Option<String>, RepoError>;
    async fn year_link(&self, year: i32) -> Result<Option<String>, RepoError>;
    async fn month_link(&self, year: i32, month: u8) -> Result<Option<String>, RepoError>;
    async fn day_link(&self, year: i32, month: u8, day: u8) -> Result<Option<String>, RepoError>;
    async fn author_link(&self, author: &Author) -> Result<Option<String>, RepoError>;
    async fn term_link(&self, term: &Term) -> Result<Option<String>, RepoError>;
}

/// Static link configuration that does not live in the options table.
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    /// Used when the `home` option is missing.
    pub default_home: String,
    /// Custom post types that have a public archive.
    pub archive_post_types: BTreeSet<String>,
}

/// Option-backed link settings, loaded per resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSettings {
    pub home: String,
    pub permalink_structure: String,
    pub category_base: String,
    pub tag_base: String,
    pub show_on_front: String,
    pub page_on_front: u64,
    pub page_for_posts: u64,
}

impl LinkSettings {
    pub async fn load(options: &dyn OptionStore, default_home: &str) -> Result<Self, RepoError> {
        let text = |value: Option<String>| value.unwrap_or_default().trim().to_string();
        let id = |value: Option<String>| {
            value
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .unwrap_or_default()
        };

        let home = text(options.get_option("home").await?);
        let home = if home.is_empty() {
            default_home.to_string()
        } else {
            home
        };

        Ok(Self {
            home: untrailingslashit(&home).to_string(),
            permalink_structure: text(options.get_option("permalink_structure").await?),
            category_base: text(options.get_option("category_base").await?),
            tag_base: text(options.get_option("tag_base").await?),
            show_on_front: text(options.get_option("show_on_front").await?),
            page_on_front: id(options.get_option("page_on_front").await?),
            page_for_posts: id(options.get_option("page_for_posts").await?),
        })
    }

    fn pretty(&self) -> bool {
        !self.permalink_structure.is_empty()
    }

    fn static_front(&self) -> bool {
        self.show_on_front == "page"
    }

    fn slashed(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        let trailing = self.permalink_structure.ends_with('/');
        match (path.is_empty(), trailing) {
            (true, _) => format!("{}/", self.home),
            (false, true) => format!("{}/{path}/", self.home),
            (false, false) => format!("{}/{path}", self.home),
        }
    }

    fn query(&self, key: &str, value: impl std::fmt::Display) -> String {
        format!("{}/?{key}={value}", self.home)
    }
}

pub fn untrailingslashit(value: &str) -> &str {
    value.trim_end_matches(['/', '\\'])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Year,
    Monthnum,
    Day,
    Hour,
    Minute,
    Second,
    PostId,
    Postname,
    Category,
    Author,
}

impl Tag {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "year" => Tag::Year,
            "monthnum" => Tag::Monthnum,
            "day" => Tag::Day,
            "hour" => Tag::Hour,
            "minute" => Tag::Minute,
            "second" => Tag::Second,
            "post_id" => Tag::PostId,
            "postname" => Tag::Postname,
            "category" => Tag::Category,
            "author" => Tag::Author,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Tag(Tag),
}

/// A parsed permalink structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
    front: String,
    date_front: String,
}

impl Template {
    pub fn compile(structure: &str) -> Self {
        let mut segments = Vec::new();
        let mut rest = structure;
        while let Some(start) = rest.find('%') {
            let Some(len) = rest[start + 1..].find('%') else {
                break;
            };
            let name = &rest[start + 1..start + 1 + len];
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            match Tag::parse(name) {
                Some(tag) => segments.push(Segment::Tag(tag)),
                None => segments.push(Segment::Literal(format!("%{name}%"))),
            }
            rest = &rest[start + len + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        let front = match structure.find('%') {
            Some(index) if index > 0 => structure[..index].to_string(),
            _ => "/".to_string(),
        };
        // Numeric permalinks would collide with date archives, so those move under `date/`.
        let numeric = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Tag(tag) => Some(*tag),
                Segment::Literal(_) => None,
            })
            .take(3)
            .any(|tag| tag == Tag::PostId);
        let date_front = if numeric {
            format!("{front}date/")
        } else {
            front.clone()
        };

        Self {
            segments,
            front,
            date_front,
        }
    }

    fn render(&self, post: &Post, category: &str) -> String {
        let date = post.date;
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Tag(Tag::Year) => format!("{:04}", date.year()),
                Segment::Tag(Tag::Monthnum) => format!("{:02}", u8::from(date.month())),
                Segment::Tag(Tag::Day) => format!("{:02}", date.day()),
                Segment::Tag(Tag::Hour) => format!("{:02}", date.hour()),
                Segment::Tag(Tag::Minute) => format!("{:02}", date.minute()),
                Segment::Tag(Tag::Second) => format!("{:02}", date.second()),
                Segment::Tag(Tag::PostId) => post.id.to_string(),
                Segment::Tag(Tag::Postname) => post.slug.clone(),
                Segment::Tag(Tag::Category) => category.to_string(),
                Segment::Tag(Tag::Author) => post.author.nicename.clone(),
            })
            .collect()
    }
}

/// Compiled permalink templates, reset by the opcode tier.
#[derive(Default)]
pub struct TemplateCache {
    compiled: Mutex<HashMap<String, Arc<Template>>>,
}

impl TemplateCache {
    pub fn get_or_compile(&self, structure: &str) -> Arc<Template> {
        let mut compiled = mutex_lock(&self.compiled, SOURCE, "get_or_compile");
        compiled
            .entry(structure.to_string())
            .or_insert_with(|| Arc::new(Template::compile(structure)))
            .clone()
    }
}

impl LocalCache for TemplateCache {
    fn label(&self) -> &'static str {
        "permalink_templates"
    }

    fn clear(&self) -> usize {
        let mut compiled = mutex_lock(&self.compiled, SOURCE, "clear");
        let held = compiled.len();
        compiled.clear();
        held
    }
}

pub struct PermalinkResolver {
    options: Arc<dyn OptionStore>,
    content: Arc<dyn ContentRepo>,
    templates: Arc<TemplateCache>,
    config: LinkConfig,
}

impl PermalinkResolver {
    pub fn new(
        options: Arc<dyn OptionStore>,
        content: Arc<dyn ContentRepo>,
        templates: Arc<TemplateCache>,
        config: LinkConfig,
    ) -> Self {
        Self {
            options,
            content,
            templates,
            config,
        }
    }

    async fn settings(&self) -> Result<LinkSettings, RepoError> {
        LinkSettings::load(self.options.as_ref(), &self.config.default_home).await
    }

    async fn page_path(&self, page: &Post) -> Result<String, RepoError> {
        let mut slugs = vec![page.slug.clone()];
        let mut parent = page.parent;
        while parent != 0 && slugs.len() < MAX_PAGE_DEPTH {
            match self.content.find_post(parent).await? {
                Some(ancestor) => {
                    slugs.push(ancestor.slug.clone());
                    parent = ancestor.parent;
                }
                None => break,
            }
        }
        slugs.reverse();
        Ok(slugs.join("/"))
    }

    async fn link_for(&self, settings: &LinkSettings, post: &Post) -> Result<String, RepoError> {
        if post.is_page() && settings.static_front() && settings.page_on_front == post.id {
            return Ok(format!("{}/", settings.home));
        }

        if !settings.pretty() {
            return Ok(match post.post_type.as_str() {
                POST_POST_TYPE => settings.query("p", post.id),
                "page" => settings.query("page_id", post.id),
                other => settings.query(other, &post.slug),
            });
        }

        match post.post_type.as_str() {
            POST_POST_TYPE => {
                let template = self.templates.get_or_compile(&settings.permalink_structure);
                let category = post
                    .terms
                    .iter()
                    .filter(|term| term.taxonomy == CATEGORY_TAXONOMY)
                    .min_by_key(|term| term.term_id)
                    .map(|term| term.slug.as_str())
                    .unwrap_or(DEFAULT_CATEGORY_SLUG);
                Ok(settings.slashed(&template.render(post, category)))
            }
            "page" => Ok(settings.slashed(&self.page_path(post).await?)),
            other => Ok(settings.slashed(&format!("{other}/{}", post.slug))),
        }
    }

    fn date_front(&self, settings: &LinkSettings) -> String {
        self.templates
            .get_or_compile(&settings.permalink_structure)
            .date_front
            .clone()
    }
}

#[async_trait]
impl LinkResolver for PermalinkResolver {
    async fn home_url(&self) -> Result<String, RepoError> {
        Ok(format!("{}/", self.settings().await?.home))
    }

    async fn permalink(&self, post: &Post) -> Result<Option<String>, RepoError> {
        let settings = self.settings().await?;
        Ok(Some(self.link_for(&settings, post).await?))
    }

    async fn post_type_archive(&self, post_type: &str) -> Result<Option<String>, RepoError> {
        let settings = self.settings().await?;

        if post_type == POST_POST_TYPE {
            if settings.static_front() && settings.page_for_posts != 0 {
                if let Some(page) = self.content.find_post(settings.page_for_posts).await? {
                    return Ok(Some(self.link_for(&settings, &page).await?));
                }
            }
            return Ok(Some(format!("{}/", settings.home)));
        }

        if !self.config.archive_post_types.contains(post_type) {
            return Ok(None);
        }
        Ok(Some(if settings.pretty() {
            settings.slashed(post_type)
        } else {
            settings.query("post_type", post_type)
        }))
    }

    async fn year_link(&self, year: i32) -> Result<Option<String>, RepoError> {
        let settings = self.settings().await?;
        Ok(Some(if settings.pretty() {
            settings.slashed(&format!("{}{year:04}", self.date_front(&settings)))
        } else {
            settings.query("m", format!("{year:04}"))
        }))
    }

    async fn month_link(&self, year: i32, month: u8) -> Result<Option<String>, RepoError> {
        let settings = self.settings().await?;
        Ok(Some(if settings.pretty() {
            settings.slashed(&format!(
                "{}{year:04}/{month:02}",
                self.date_front(&settings)
            ))
        } else {
            settings.query("m", format!("{year:04}{month:02}"))
        }))
    }

    async fn day_link(&self, year: i32, month: u8, day: u8) -> Result<Option<String>, RepoError> {
        let settings = self.settings().await?;
        Ok(Some(if settings.pretty() {
            settings.slashed(&format!(
                "{}{year:04}/{month:02}/{day:02}",
                self.date_front(&settings)
            ))
        } else {
            settings.query("m", format!("{year:04}{month:02}{day:02}"))
        }))
    }

    async fn author_link(&self, author: &Author) -> Result<Option<String>, RepoError> {
        let settings = self.settings().await?;
        if author.id == 0 {
            return Ok(None);
        }
        Ok(Some(if settings.pretty() {
            let front = self
                .templates
                .get_or_compile(&settings.permalink_structure)
                .front
                .clone();
            settings.slashed(&format!("{front}author/{}", author.nicename))
        } else {
            settings.query("author", author.id)
        }))
    }

    async fn term_link(&self, term: &Term) -> Result<Option<String>, RepoError> {
        let settings = self.settings().await?;

        if !settings.pretty() {
            return Ok(Some(match term.taxonomy.as_str() {
                CATEGORY_TAXONOMY => settings.query("cat", term.term_id),
                TAG_TAXONOMY => settings.query("tag", &term.slug),
                other => settings.query(other, &term.slug),
            }));
        }

        let front = self
            .templates
            .get_or_compile(&settings.permalink_structure)
            .front
            .clone();
        let base = match term.taxonomy.as_str() {
            CATEGORY_TAXONOMY if settings.category_base.is_empty() => format!("{front}category"),
            CATEGORY_TAXONOMY => settings.category_base.clone(),
            TAG_TAXONOMY if settings.tag_base.is_empty() => format!("{front}tag"),
            TAG_TAXONOMY => settings.tag_base.clone(),
            other => other.to_string(),
        };
        Ok(Some(settings.slashed(&format!(
            "{}/{}",
            base.trim_matches('/'),
            term.slug
        ))))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::infra::memory::{MemoryContent, MemoryOptions};

    fn post(id: u64, post_type: &str, slug: &str) -> Post {
        Post {
            id,
            post_type: post_type.to_string(),
            slug: slug.to_string(),
            status: "publish".to_string(),
            parent: 0,
            date: datetime!(2021-03-15 09:30:00),
            date_gmt: datetime!(2021-03-15 14:30:00 UTC),
            author: Author {
                id: 7,
                nicename: "jordan".to_string(),
            },
            terms: vec![Term {
                term_id: 3,
                taxonomy: CATEGORY_TAXONOMY.to_string(),
                slug: "news".to_string(),
            }],
        }
    }

    async fn resolver(
        structure: &str,
        extra: &[(&str, &str)],
    ) -> (PermalinkResolver, Arc<MemoryContent>) {
        let options = Arc::new(MemoryOptions::default());
        options.insert("home", "https://example.com/");
        options.insert("permalink_structure", structure);
        for (name, value) in extra {
            options.insert(*name, *value);
        }
        let content = Arc::new(MemoryContent::default());
        let resolver = PermalinkResolver::new(
            options,
            content.clone(),
            Arc::new(TemplateCache::default()),
            LinkConfig {
                default_home: "https://fallback.example".to_string(),
                archive_post_types: ["product".to_string()].into_iter().collect(),
            },
        );
        (resolver, content)
    }

    #[test]
    fn template_detects_front_and_numeric_structures() {
        let dated = Template::compile("/blog/%year%/%postname%/");
        assert_eq!(dated.front, "/blog/");
        assert_eq!(dated.date_front, "/blog/");

        let numeric = Template::compile("/archives/%post_id%");
        assert_eq!(numeric.front, "/archives/");
        assert_eq!(numeric.date_front, "/archives/date/");
    }

    #[tokio::test]
    async fn pretty_links_follow_structure() {
        let (resolver, _) = resolver("/%year%/%monthnum%/%postname%/", &[]).await;
        let item = post(12, "post", "hello");

        assert_eq!(
            resolver.permalink(&item).await.expect("permalink").as_deref(),
            Some("https://example.com/2021/03/hello/")
        );
        assert_eq!(
            resolver.day_link(2021, 3, 15).await.expect("day").as_deref(),
            Some("https://example.com/2021/03/15/")
        );
        assert_eq!(
            resolver.author_link(&item.author).await.expect("author").as_deref(),
            Some("https://example.com/author/jordan/")
        );
        assert_eq!(
            resolver.term_link(&item.terms[0]).await.expect("term").as_deref(),
            Some("https://example.com/category/news/")
        );
    }

    #[tokio::test]
    async fn plain_links_use_query_arguments() {
        let (resolver, _) = resolver("", &[]).await;
        let item = post(12, "post", "hello");

        assert_eq!(
            resolver.permalink(&item).await.expect("permalink").as_deref(),
            Some("https://example.com/?p=12")
        );
        assert_eq!(
            resolver.month_link(2021, 3).await.expect("month").as_deref(),
            Some("https://example.com/?m=202103")
        );
        assert_eq!(
            resolver.term_link(&item.terms[0]).await.expect("term").as_deref(),
            Some("https://example.com/?cat=3")
        );
    }

    #[tokio::test]
    async fn custom_bases_and_hierarchical_pages() {
        let (resolver, content) =
            resolver("/%postname%/", &[("tag_base", "topics")]).await;
        let mut parent = post(20, "page", "about");
        parent.terms.clear();
        let mut child = post(21, "page", "team");
        child.parent = 20;
        content.insert_post(parent);

        assert_eq!(
            resolver.permalink(&child).await.expect("permalink").as_deref(),
            Some("https://example.com/about/team/")
        );
        let tag = Term {
            term_id: 9,
            taxonomy: TAG_TAXONOMY.to_string(),
            slug: "rust".to_string(),
        };
        assert_eq!(
            resolver.term_link(&tag).await.expect("tag").as_deref(),
            Some("https://example.com/topics/rust/")
        );
    }

    #[tokio::test]
    async fn post_archive_points_at_posts_page_on_static_front() {
        let (resolver, content) = resolver(
            "/%postname%/",
            &[("show_on_front", "page"), ("page_for_posts", "40")],
        )
        .await;
        content.insert_post(post(40, "page", "blog"));

        assert_eq!(
            resolver.post_type_archive("post").await.expect("archive").as_deref(),
            Some("https://example.com/blog/")
        );
        assert_eq!(
            resolver.post_type_archive("product").await.expect("archive").as_deref(),
            Some("https://example.com/product/")
        );
        assert_eq!(resolver.post_type_archive("event").await.expect("archive"), None);
    }

    #[tokio::test]
    async fn template_cache_compiles_once_until_cleared() {
        let cache = TemplateCache::default();
        let first = cache.get_or_compile("/%postname%/");
        let second = cache.get_or_compile("/%postname%/");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.clear(), 1);
        assert!(!Arc::ptr_eq(&first, &cache.get_or_compile("/%postname%/")));
    }
}
