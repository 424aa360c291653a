//! Domain types shared by the cache engine and its adapters.

pub mod cache_type;
pub mod content;
