use super::{
    command::{render, run_ok},
    detect_vcs, parse_timestamp, tagged, untagged, DeriveOptions, Vcs,
};
use crate::{error::VcsError, version::Version};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::path::Path;

const PIJUL: &str = "pijul";

/// A change in `pijul log --output-format json`.
#[derive(Debug, Deserialize)]
struct Change {
    hash: String,
    timestamp: String,
}

/// One entry of `pijul tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Tag {
    state: String,
    timestamp: Option<DateTime<Utc>>,
    message: String,
}

pub(super) fn derive(options: &DeriveOptions) -> Result<Version, VcsError> {
    let directory = options.directory()?;
    detect_vcs(Some(Vcs::Pijul), &directory)?;

    let dirty = Some(!run_ok(PIJUL, &["diff", "--short"], &directory)?.is_empty());

    let channels = run_ok(PIJUL, &["channel"], &directory)?;
    let branch = channels
        .lines()
        .find_map(|line| line.strip_prefix("* "))
        .unwrap_or("main")
        .to_owned();
    let branch = Some(branch);

    let latest = log(&["log", "--limit", "1", "--output-format", "json"], &directory)?;
    let Some(change) = latest.into_iter().next() else {
        return options.fallback(Version {
            dirty,
            branch,
            ..untagged()
        });
    };
    let commit = Some(options.truncate_commit(change.hash));
    let timestamp = Some(parse_timestamp(PIJUL, &["log"], &change.timestamp)?);

    let listing = run_ok(PIJUL, &["tag"], &directory)?;
    let tags = parse_tags(&listing);
    if tags.is_empty() {
        let changes = log(&["log", "--output-format", "json"], &directory)?;
        return options.fallback(Version {
            distance: changes.len() as u64,
            commit,
            dirty,
            branch,
            timestamp,
            ..untagged()
        });
    }

    let mut newest_first = tags.clone();
    newest_first.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let messages = newest_first
        .iter()
        .map(|tag| tag.message.as_str())
        .collect::<Vec<_>>();
    let matched = options.match_tags(&messages)?;

    // Several tags may share a message; the newest wins.
    let state = newest_first
        .iter()
        .find(|tag| tag.message == matched.tag)
        .map(|tag| tag.state.clone())
        .unwrap_or_default();

    let channel_changes = log(&["log", "--output-format", "json"], &directory)?;
    let tag_changes = log(
        &["log", "--output-format", "json", "--state", &state],
        &directory,
    )?;
    let distance = channel_changes.len().saturating_sub(tag_changes.len()) as u64;

    Ok(Version {
        distance,
        commit,
        dirty,
        branch,
        timestamp,
        ..tagged(matched)
    })
}

fn log(args: &[&str], directory: &Path) -> Result<Vec<Change>, VcsError> {
    let output = run_ok(PIJUL, args, directory)?;
    if output.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&output).map_err(|e| VcsError::UnexpectedOutput {
        command: render(PIJUL, args),
        reason: e.to_string(),
    })
}

/// Parses the blocks printed by `pijul tag`:
///
/// ```text
/// State 2ZNT5HC3MFN...
/// Author: dynver
/// Date: 2023-01-01 12:00:00.123456 UTC
///
///     v0.1.0
/// ```
fn parse_tags(listing: &str) -> Vec<Tag> {
    let mut tags = Vec::new();
    let mut current: Option<Tag> = None;
    for line in listing.lines() {
        if let Some(state) = line.strip_prefix("State ") {
            tags.extend(current.take().filter(|tag| !tag.message.is_empty()));
            current = Some(Tag {
                state: state.trim().to_owned(),
                timestamp: None,
                message: String::new(),
            });
        } else if let Some(tag) = current.as_mut() {
            if let Some(date) = line.strip_prefix("Date:") {
                tag.timestamp = parse_tag_date(date.trim());
            } else if let Some(message) = line.strip_prefix("    ") {
                tag.message.push_str(message);
            }
        }
    }
    tags.extend(current.filter(|tag| !tag.message.is_empty()));
    tags
}

fn parse_tag_date(date: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = date.strip_suffix(" UTC").unwrap_or(date);
    NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|datetime| datetime.and_utc())
}
