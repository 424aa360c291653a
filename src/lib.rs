//! Multi-tier cache control for hosted CMS sites.
//!
//! The [`cache`] module owns the engine: four tier drivers behind an
//! execution-scoped registry, the trigger map and URL derivation. The other
//! modules adapt it to a host (storage ports, HTTP and CLI surfaces, config).

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
