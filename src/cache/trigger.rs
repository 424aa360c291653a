//! Mapping from host lifecycle events and option changes to cache tiers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::{debug, warn};

use crate::application::links::LinkResolver;
use crate::application::repos::{ContentRepo, RepoError};
use crate::domain::cache_type::CacheType::{Http, Object, Opcode, Transient};
use crate::domain::cache_type::{CacheType, TypeSelection};
use crate::domain::content::Post;

use super::control::{CacheControl, FlushReport};
use super::urls::content_urls;

const EVERY_TIER: &[CacheType] = &[Http, Object, Opcode, Transient];
const PAGE_TIERS: &[CacheType] = &[Object, Http];
const CODE_TIERS: &[CacheType] = &[Object, Opcode, Transient];

const ACTIONS: &[(&str, &[CacheType])] = &[
    ("_core_updated_successfully", EVERY_TIER),
    ("activated_plugin", EVERY_TIER),
    ("deactivated_plugin", EVERY_TIER),
    ("switch_theme", EVERY_TIER),
    ("upgrader_process_complete", EVERY_TIER),
    ("customize_save", PAGE_TIERS),
    ("wp_delete_nav_menu", PAGE_TIERS),
    ("wp_update_nav_menu", PAGE_TIERS),
    ("deleted_plugin", CODE_TIERS),
    ("pre_uninstall_plugin", CODE_TIERS),
];

const LAYOUT_OPTIONS: &[&str] = &[
    "blogdescription",
    "blogname",
    "category_base",
    "comments_per_page",
    "date_format",
    "gmt_offset",
    "permalink_structure",
    "posts_per_page",
    "rewrite_rules",
    "tag_base",
    "time_format",
    "timezone_string",
    "WPLANG",
];

const EDITOR_OPTIONS: &[&str] = &["hack_file", "recently_edited"];

const DISPLAY_OPTIONS: &[&str] = &[
    "avatar_default",
    "avatar_rating",
    "blog_public",
    "category_children",
    "close_comments_days_old",
    "close_comments_for_old_posts",
    "comment_order",
    "comment_registration",
    "default_comments_page",
    "link_manager_enabled",
    "links_updated_date_format",
    "page_comments",
    "page_for_posts",
    "page_on_front",
    "posts_per_rss",
    "require_name_email",
    "rss_use_excerpt",
    "show_avatars",
    "show_on_front",
    "sidebars_widgets",
    "site_icon",
    "start_of_week",
    "sticky_posts",
    "thread_comments",
    "thread_comments_depth",
    "use_smilies",
    "users_can_register",
    "wp_user_roles",
];

const OPTION_PREFIXES: &[&str] = &["widget_", "theme_mods_"];

static STANDARD: Lazy<Arc<TriggerMap>> = Lazy::new(|| Arc::new(TriggerMap::build()));

/// Immutable trigger tables.
#[derive(Debug)]
pub struct TriggerMap {
    actions: HashMap<&'static str, BTreeSet<CacheType>>,
    options: HashMap<&'static str, BTreeSet<CacheType>>,
    prefixes: Vec<(&'static str, BTreeSet<CacheType>)>,
}

impl TriggerMap {
    /// The process-wide standard tables.
    pub fn standard() -> Arc<TriggerMap> {
        STANDARD.clone()
    }

    fn build() -> Self {
        let set = |tiers: &[CacheType]| tiers.iter().copied().collect::<BTreeSet<_>>();

        let actions = ACTIONS
            .iter()
            .map(|(name, tiers)| (*name, set(tiers)))
            .collect();

        let mut options = HashMap::new();
        for (names, tiers) in [
            (LAYOUT_OPTIONS, &[Object, Http, Transient][..]),
            (EDITOR_OPTIONS, &[Object, Http, Opcode][..]),
            (DISPLAY_OPTIONS, PAGE_TIERS),
        ] {
            for name in names {
                options.insert(*name, set(tiers));
            }
        }

        let prefixes = OPTION_PREFIXES
            .iter()
            .map(|prefix| (*prefix, set(PAGE_TIERS)))
            .collect();

        Self {
            actions,
            options,
            prefixes,
        }
    }

    pub fn for_action(&self, action: &str) -> Option<&BTreeSet<CacheType>> {
        self.actions.get(action)
    }

    /// Exact option names win over prefix rules.
    pub fn for_option(&self, option: &str) -> Option<&BTreeSet<CacheType>> {
        self.options.get(option).or_else(|| {
            self.prefixes
                .iter()
                .find(|(prefix, _)| option.starts_with(prefix))
                .map(|(_, tiers)| tiers)
        })
    }

    pub fn actions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.keys().copied()
    }
}

/// Host event handlers bound to one execution's registry.
pub struct CacheHooks {
    map: Arc<TriggerMap>,
    control: Arc<CacheControl>,
    content: Arc<dyn ContentRepo>,
    links: Arc<dyn LinkResolver>,
}

impl CacheHooks {
    pub fn new(
        map: Arc<TriggerMap>,
        control: Arc<CacheControl>,
        content: Arc<dyn ContentRepo>,
        links: Arc<dyn LinkResolver>,
    ) -> Self {
        Self {
            map,
            control,
            content,
            links,
        }
    }

    pub async fn on_action(&self, action: &str) -> Option<FlushReport> {
        let Some(tiers) = self.map.for_action(action) else {
            debug!(action, "Action has no cache mapping");
            return None;
        };
        Some(self.control.flush(&TypeSelection::Only(tiers.clone())).await)
    }

    /// Values are compared structurally; identical rewrites are common and free.
    pub async fn on_option_updated(
        &self,
        option: &str,
        old_value: &Value,
        new_value: &Value,
    ) -> Option<FlushReport> {
        if old_value == new_value {
            return None;
        }
        let tiers = self.map.for_option(option)?;
        Some(self.control.flush(&TypeSelection::Only(tiers.clone())).await)
    }

    /// A post's cache was cleared: flush the object tier, then purge its URLs.
    pub async fn on_post_cache_cleared(&self, post: &Post) -> Vec<String> {
        let urls = content_urls(post, self.links.as_ref()).await;
        if urls.is_empty() {
            return Vec::new();
        }
        self.control.flush(&TypeSelection::only([Object])).await;
        self.control.purge(&urls).await
    }

    /// A comment's cache was cleared: purge the URLs of its parent post.
    pub async fn on_comment_cache_cleared(&self, comment_id: u64) -> Result<Vec<String>, RepoError> {
        let Some(comment) = self.content.find_comment(comment_id).await? else {
            debug!(comment_id, "Comment not found; nothing to purge");
            return Ok(Vec::new());
        };
        let Some(post) = self.content.find_post(comment.post_id).await? else {
            warn!(comment_id, post_id = comment.post_id, "Comment has no parent post");
            return Ok(Vec::new());
        };
        let urls = content_urls(&post, self.links.as_ref()).await;
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.control.purge(&urls).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiers(list: &[CacheType]) -> BTreeSet<CacheType> {
        list.iter().copied().collect()
    }

    #[test]
    fn lifecycle_actions_map_to_expected_tiers() {
        let map = TriggerMap::standard();
        assert_eq!(map.for_action("switch_theme"), Some(&tiers(EVERY_TIER)));
        assert_eq!(map.for_action("wp_update_nav_menu"), Some(&tiers(&[Object, Http])));
        assert_eq!(
            map.for_action("pre_uninstall_plugin"),
            Some(&tiers(&[Object, Opcode, Transient]))
        );
        assert_eq!(map.for_action("save_post"), None);
        assert_eq!(map.actions().count(), 10);
    }

    #[test]
    fn options_resolve_exact_names_before_prefixes() {
        let map = TriggerMap::standard();
        assert_eq!(
            map.for_option("permalink_structure"),
            Some(&tiers(&[Object, Http, Transient]))
        );
        assert_eq!(map.for_option("hack_file"), Some(&tiers(&[Object, Http, Opcode])));
        assert_eq!(map.for_option("sticky_posts"), Some(&tiers(&[Object, Http])));
        assert_eq!(map.for_option("widget_text"), Some(&tiers(&[Object, Http])));
        assert_eq!(map.for_option("theme_mods_twentytwenty"), Some(&tiers(&[Object, Http])));
        assert_eq!(map.for_option("admin_email"), None);
        assert_eq!(map.for_option("wplang"), None);
    }

    #[test]
    fn standard_map_is_shared() {
        assert!(Arc::ptr_eq(&TriggerMap::standard(), &TriggerMap::standard()));
    }
}
