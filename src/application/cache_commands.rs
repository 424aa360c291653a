//! Operator commands behind `cachectl cache flush` and `cachectl cache purge`.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::application::links::LinkResolver;
use crate::application::repos::{ContentRepo, RepoError};
use crate::cache::{CacheControl, FlushOutcome, FlushReport, content_urls};
use crate::domain::cache_type::{CacheType, TypeSelection, parse_names};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unable to flush cache.")]
    NothingFlushed,
    #[error("There are no URLs to purge.")]
    NothingToPurge,
    /// A tier failed; `completed` holds the lines for tiers flushed before it.
    #[error("{message}")]
    Driver {
        kind: CacheType,
        message: String,
        completed: Vec<String>,
    },
    #[error("Unable to resolve content: {0}")]
    Repo(#[from] RepoError),
    #[error("Unable to render output: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
    Yaml,
}

#[derive(Debug, Clone, Default)]
pub struct FlushCommand {
    pub types: Vec<String>,
    pub all: bool,
}

impl FlushCommand {
    /// `--all` wins; otherwise unknown names are ignored and an empty result means object.
    pub fn selection(&self) -> TypeSelection {
        if self.all {
            return TypeSelection::All;
        }
        match parse_names(&self.types) {
            Some(types) if !types.is_empty() => TypeSelection::Only(types),
            _ => TypeSelection::only([CacheType::Object]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PurgeCommand {
    pub urls: Vec<String>,
    pub post_ids: Vec<String>,
    pub comment_ids: Vec<String>,
}

impl PurgeCommand {
    fn is_empty(&self) -> bool {
        split_values(&self.urls).is_empty()
            && split_values(&self.post_ids).is_empty()
            && split_values(&self.comment_ids).is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRow {
    pub url: String,
}

pub struct CacheCommands {
    control: Arc<CacheControl>,
    content: Arc<dyn ContentRepo>,
    links: Arc<dyn LinkResolver>,
}

impl CacheCommands {
    pub fn new(
        control: Arc<CacheControl>,
        content: Arc<dyn ContentRepo>,
        links: Arc<dyn LinkResolver>,
    ) -> Self {
        Self {
            control,
            content,
            links,
        }
    }

    /// Flush and return one success line per tier, in tier order.
    pub async fn flush(&self, command: &FlushCommand) -> Result<Vec<String>, CommandError> {
        let report = self.control.flush(&command.selection()).await;
        flush_lines(&report)
    }

    /// Purge literal URLs plus the URLs of the given posts and comments' posts.
    pub async fn purge(&self, command: &PurgeCommand) -> Result<Vec<UrlRow>, CommandError> {
        let mut urls = split_values(&command.urls);

        if command.is_empty() {
            urls.push(self.links.home_url().await?);
        }

        let mut post_ids: BTreeSet<u64> = parse_ids(&command.post_ids);
        for comment_id in parse_ids(&command.comment_ids) {
            match self.content.find_comment(comment_id).await? {
                Some(comment) => {
                    post_ids.insert(comment.post_id);
                }
                None => debug!(comment_id, "Comment not found; skipping"),
            }
        }
        for post_id in post_ids {
            match self.content.find_post(post_id).await? {
                Some(post) => urls.extend(content_urls(&post, self.links.as_ref()).await),
                None => debug!(post_id, "Post not found; skipping"),
            }
        }

        let dispatched = self.control.purge(&urls).await;
        if dispatched.is_empty() {
            return Err(CommandError::NothingToPurge);
        }
        Ok(dispatched.into_iter().map(|url| UrlRow { url }).collect())
    }
}

/// Operator-facing lines for a flush, failing on the first tier that errored.
pub fn flush_lines(report: &FlushReport) -> Result<Vec<String>, CommandError> {
    if report.is_empty() && !report.has_errors() {
        return Err(CommandError::NothingFlushed);
    }

    let mut kinds: BTreeSet<CacheType> = report.outcomes.keys().copied().collect();
    kinds.extend(report.errors.keys().copied());

    let mut lines = Vec::with_capacity(kinds.len());
    for kind in kinds {
        if let Some(err) = report.errors.get(&kind) {
            return Err(CommandError::Driver {
                kind,
                message: err.to_string(),
                completed: lines,
            });
        }
        if let Some(outcome) = report.outcomes.get(&kind) {
            lines.push(success_line(kind, *outcome));
        }
    }
    Ok(lines)
}

fn success_line(kind: CacheType, outcome: FlushOutcome) -> String {
    match (kind, outcome) {
        (CacheType::Transient, FlushOutcome::Removed(0)) => {
            "Success: No transients found.".to_string()
        }
        (CacheType::Transient, FlushOutcome::Removed(count)) => {
            format!("Success: {count} transient(s) deleted from the database.")
        }
        (CacheType::Http, _) => "Success: The HTTP cache was flushed.".to_string(),
        (kind, _) => format!("Success: The {kind} cache was flushed."),
    }
}

pub fn render_rows(rows: &[UrlRow], format: OutputFormat) -> Result<String, CommandError> {
    match format {
        OutputFormat::Table => Ok(render_table(rows)),
        OutputFormat::Csv => Ok(render_csv(rows)),
        OutputFormat::Json => {
            serde_json::to_string(rows).map_err(|err| CommandError::Render(err.to_string()))
        }
        OutputFormat::Yaml => {
            serde_yaml::to_string(rows).map_err(|err| CommandError::Render(err.to_string()))
        }
    }
}

fn render_table(rows: &[UrlRow]) -> String {
    let width = rows
        .iter()
        .map(|row| row.url.chars().count())
        .max()
        .unwrap_or(0)
        .max("url".len());
    let rule = format!("+{}+", "-".repeat(width + 2));

    let mut out = String::new();
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "| {:<width$} |", "url");
    let _ = writeln!(out, "{rule}");
    for row in rows {
        let _ = writeln!(out, "| {:<width$} |", row.url);
    }
    let _ = write!(out, "{rule}");
    out
}

fn render_csv(rows: &[UrlRow]) -> String {
    let mut out = String::from("url");
    for row in rows {
        out.push('\n');
        if row.url.contains([',', '"', '\n']) {
            let _ = write!(out, "\"{}\"", row.url.replace('"', "\"\""));
        } else {
            out.push_str(&row.url);
        }
    }
    out
}

fn split_values(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_ids(values: &[String]) -> BTreeSet<u64> {
    split_values(values)
        .into_iter()
        .filter_map(|value| match value.parse::<u64>() {
            Ok(id) if id > 0 => Some(id),
            _ => {
                debug!(value = %value, "Ignoring invalid content id");
                None
            }
        })
        .collect()
}
