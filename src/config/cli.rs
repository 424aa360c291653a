use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::application::cache_commands::OutputFormat;

/// Command-line arguments for the cachectl binary.
#[derive(Debug, Parser)]
#[command(name = "cachectl", version, about = "Multi-tier cache control for hosted sites")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CACHECTL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the REST cache route and the web flush trigger.
    Serve(Box<ServeArgs>),
    /// Flush or purge caches from the command line.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SiteOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Read the site document from this path before the standard locations.
    #[arg(long = "site-config", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub site_config: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub site: SiteOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the edge request timeout.
    #[arg(long = "cache-edge-timeout-ms", value_name = "MILLIS")]
    pub cache_edge_timeout_ms: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub site: SiteOverrides,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Flush one or more cache tiers (defaults to the object cache).
    Flush(FlushArgs),
    /// Purge URLs from the edge cache (defaults to the home URL).
    Purge(PurgeArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct FlushArgs {
    /// Tiers to flush: http, object, opcode, transient. Commas are accepted.
    #[arg(value_name = "TYPE")]
    pub types: Vec<String>,

    /// Flush every tier.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub all: bool,
}

#[derive(Debug, Args, Clone, Default)]
pub struct PurgeArgs {
    /// Absolute URLs to purge. Commas are accepted.
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// Purge every URL a post appears on.
    #[arg(long = "post_ids", value_name = "IDS")]
    pub post_ids: Vec<String>,

    /// Purge every URL the posts of these comments appear on.
    #[arg(long = "comment_ids", value_name = "IDS")]
    pub comment_ids: Vec<String>,

    /// Output format for the purged URL list.
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}
