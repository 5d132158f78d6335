use super::{
    command::run_ok, detect_vcs, parse_timestamp, tagged, untagged, DeriveOptions, Vcs,
};
use crate::{error::VcsError, version::Version};
use regex::Regex;
use std::{cmp::Reverse, path::Path};
use tracing::debug;

const SVN: &str = "svn";

/// A tag directory and the revisions that define it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SvnTag {
    name: String,
    /// The revision the tag was copied from.
    source: u64,
    /// The revision that created the tag.
    revision: u64,
}

pub(super) fn derive(options: &DeriveOptions) -> Result<Version, VcsError> {
    let directory = options.directory()?;
    detect_vcs(Some(Vcs::Subversion), &directory)?;
    let tag_dir = options.tag_dir.trim_matches('/');

    let dirty = Some(!run_ok(SVN, &["status"], &directory)?.is_empty());

    let url = run_ok(SVN, &["info", "--show-item", "repos-root-url"], &directory)?;
    let url = url.trim_end_matches('/');

    let revision = run_ok(SVN, &["info", "--show-item", "revision"], &directory)?;
    let Some(current) = revision.parse::<u64>().ok().filter(|revision| *revision > 0) else {
        // Revision 0 is an empty repository.
        return options.fallback(Version { dirty, ..untagged() });
    };
    let commit = Some(current.to_string());

    let date_args = ["info", "--show-item", "last-changed-date"];
    let timestamp = Some(parse_timestamp(
        SVN,
        &date_args,
        &run_ok(SVN, &date_args, &directory)?,
    )?);

    let tags_url = format!("{url}/{tag_dir}");
    let revision_arg = current.to_string();
    let listing = run_ok(
        SVN,
        &["ls", "-v", "-r", &revision_arg, &tags_url],
        &directory,
    )?;
    let tag_revisions = parse_listing(&listing);
    if tag_revisions.is_empty() {
        return options.fallback(Version {
            distance: current,
            commit,
            dirty,
            timestamp,
            ..untagged()
        });
    }

    let mut tags = Vec::new();
    for (name, revision) in tag_revisions {
        if let Some(source) = copy_source(&tags_url, tag_dir, &name, &directory)? {
            tags.push(SvnTag {
                name,
                source,
                revision,
            });
        }
    }
    tags.sort_by_key(|tag| Reverse((tag.source, tag.revision)));
    debug!(?tags, "Subversion tags by source revision");

    let names = tags.iter().map(|tag| tag.name.as_str()).collect::<Vec<_>>();
    let matched = options.match_tags(&names)?;
    let source = tags
        .iter()
        .find(|tag| tag.name == matched.tag)
        .map_or(0, |tag| tag.source);
    // Creating the tag is a commit of its own.
    let distance = current.saturating_sub(1).saturating_sub(source);

    Ok(Version {
        distance,
        commit,
        dirty,
        timestamp,
        ..tagged(matched)
    })
}

/// Tag names and the revision that last changed them, from `svn ls -v`. The first line is the
/// tag directory itself.
fn parse_listing(listing: &str) -> Vec<(String, u64)> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let revision = line.split_whitespace().next()?.parse().ok()?;
            let name = line.split_whitespace().last()?.trim_end_matches('/');
            Some((name.to_owned(), revision))
        })
        .collect()
}

/// The revision a tag directory was copied from, found in its first log entry.
fn copy_source(
    tags_url: &str,
    tag_dir: &str,
    tag: &str,
    directory: &Path,
) -> Result<Option<u64>, VcsError> {
    let tag_url = format!("{tags_url}/{tag}");
    let log = run_ok(SVN, &["log", "-v", &tag_url, "--stop-on-copy"], directory)?;
    Ok(parse_copy_source(&log, tag_dir, tag))
}

fn parse_copy_source(log: &str, tag_dir: &str, tag: &str) -> Option<u64> {
    let pattern = format!(
        r"A /{}/{} \(from .+?:(\d+)\)",
        regex::escape(tag_dir),
        regex::escape(tag)
    );
    let regex = Regex::new(&pattern).ok()?;
    log.lines()
        .filter_map(|line| regex.captures(line))
        .filter_map(|captures| captures.get(1)?.as_str().parse().ok())
        .last()
}
