use super::{
    command::run_ok,
    detect_vcs, find_higher_file, parse_timestamp, tagged, untagged, DeriveOptions, Vcs,
};
use crate::{error::VcsError, version::Version};
use std::{fs, path::Path};
use tracing::debug;

const HG: &str = "hg";

pub(super) const ARCHIVAL_FILE: &str = ".hg_archival.txt";

/// Length of the `{id|short}` abbreviation.
const SHORT_NODE_LENGTH: usize = 12;

pub(super) fn derive(options: &DeriveOptions) -> Result<Version, VcsError> {
    let directory = options.directory()?;

    if let Some(archival) = find_higher_file(ARCHIVAL_FILE, &directory, &[".hg"]) {
        return from_archival(&archival, &directory, options);
    }

    detect_vcs(Some(Vcs::Mercurial), &directory)?;

    let summary = run_ok(HG, &["summary"], &directory)?;
    let dirty = Some(!summary.lines().any(|line| line == "commit: (clean)"));

    let branch = Some(run_ok(HG, &["branch"], &directory)?);

    let id = run_ok(HG, &["id", "--template", "{id}"], &directory)?;
    // The null revision of an empty repository is all zeros.
    let node = (!id.is_empty() && !id.chars().all(|c| c == '0')).then_some(id);
    let commit = node.as_deref().map(|node| display_commit(node, options));

    let timestamp_args = ["log", "--limit", "1", "--template", "{date|rfc3339date}"];
    let raw_timestamp = run_ok(HG, &timestamp_args, &directory)?;
    let timestamp = if raw_timestamp.is_empty() {
        None
    } else {
        Some(parse_timestamp(HG, &timestamp_args, &raw_timestamp)?)
    };

    let revset = match &node {
        Some(node) => format!("sort(tag() and ancestors({node}), -rev)"),
        None => "sort(tag(), -rev)".to_owned(),
    };
    let listing = run_ok(
        HG,
        &["log", "-r", &revset, "--template", "{join(tags, ':')}\\n"],
        &directory,
    )?;
    let tags = listing
        .lines()
        .flat_map(|line| line.split(':'))
        .filter(|tag| !tag.is_empty() && *tag != "tip")
        .collect::<Vec<_>>();

    if tags.is_empty() {
        let distance = run_ok(HG, &["id", "--num", "--rev", "tip"], &directory)
            .ok()
            .and_then(|tip| tip.parse::<i64>().ok())
            .map_or(0, |tip| (tip + 1).max(0) as u64);
        return options.fallback(Version {
            distance,
            commit,
            dirty,
            branch,
            timestamp,
            ..untagged()
        });
    }

    let matched = options.match_tags(&tags)?;

    let target = node.as_deref().unwrap_or(".");
    let tag = quote_revset(&matched.tag);
    let range = format!("{tag}::{target} - {tag}");
    let distance_args = ["log", "-r", range.as_str(), "--template", "."];
    let dots = run_ok(HG, &distance_args, &directory)?;
    // Tagging creates a commit of its own, which is not counted.
    let distance = dots.len().saturating_sub(1) as u64;

    Ok(Version {
        distance,
        commit,
        dirty,
        branch,
        timestamp,
        ..tagged(matched)
    })
}

/// The commit id to report for a full node: abbreviated like `{id|short}` unless a full or
/// truncated id was requested.
fn display_commit(node: &str, options: &DeriveOptions) -> String {
    if options.wants_full_commit() {
        options.truncate_commit(node.to_owned())
    } else {
        node.chars().take(SHORT_NODE_LENGTH).collect()
    }
}

/// Quotes a tag name for use as a revset symbol.
fn quote_revset(tag: &str) -> String {
    format!("'{}'", tag.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Reads `.hg_archival.txt`, plus `.hgtags` for the full tag list when it is present.
fn from_archival(
    path: &Path,
    directory: &Path,
    options: &DeriveOptions,
) -> Result<Version, VcsError> {
    let content = fs::read_to_string(path).map_err(|e| VcsError::Archival {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let entries = parse_archival(&content);
    let get = |key: &str| {
        entries
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
    };

    // An archive of a tagged revision lists `tag` instead of `latesttag`.
    let tag = get("latesttag").or_else(|| get("tag")).filter(|tag| *tag != "null");
    // The distance is 1 on a new repository or on a tagged commit.
    let distance = get("latesttagdistance")
        .and_then(|distance| distance.parse::<u64>().ok())
        .unwrap_or(1)
        .saturating_sub(1);
    let commit = get("node").map(|node| options.truncate_commit(node.to_owned()));
    let branch = get("branch").map(str::to_owned);

    let Some(tag) = tag else {
        return options.fallback(Version {
            distance,
            commit,
            branch,
            ..untagged()
        });
    };

    let all_tags = match find_higher_file(".hgtags", directory, &[".hg"]) {
        Some(hgtags) => {
            let content = fs::read_to_string(&hgtags).map_err(|e| VcsError::Archival {
                path: hgtags.clone(),
                reason: e.to_string(),
            })?;
            parse_hgtags(&content)
        }
        None => vec![tag.to_owned()],
    };
    debug!(tags = ?all_tags, "Read tags from archive");

    let matched = options.match_tags(&all_tags)?;
    Ok(Version {
        distance,
        commit,
        branch,
        ..tagged(matched)
    })
}

fn parse_archival(content: &str) -> Vec<(&str, &str)> {
    content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim(), value.trim()))
        .collect()
}

/// Tag names from `.hgtags`, newest first. Later lines are newer.
fn parse_hgtags(content: &str) -> Vec<String> {
    content
        .lines()
        .rev()
        .filter_map(|line| line.split_once(' '))
        .map(|(_, tag)| tag.to_owned())
        .collect()
}
