use super::{
    command::{parse_count, run_cmd, run_ok},
    detect_vcs, find_higher_file, parse_timestamp, tagged, untagged, DeriveOptions, Vcs,
};
use crate::{
    error::VcsError,
    version::{Concern, Version},
};
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use serde::Deserialize;
use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashMap},
    fs,
    path::Path,
    sync::LazyLock,
};
use tracing::debug;

const GIT: &str = "git";

pub(super) const ARCHIVAL_FILE: &str = ".git_archival.json";

static GIT_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"git version (\d+(?:\.\d+)*)").unwrap());

static DESCRIBE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<tag>.+)-(?P<distance>\d+)-g[0-9a-f]+$").unwrap());

/// Separates the fields printed for each tag by `for-each-ref`. Git forbids it in ref names.
const FIELD_SEPARATOR: &str = "@{";

const TAG_FORMAT: &str = "--format=%(refname)@{%(objectname)@{%(creatordate:iso-strict)@{%(*committerdate:iso-strict)@{%(taggerdate:iso-strict)";

pub(super) fn derive(options: &DeriveOptions) -> Result<Version, VcsError> {
    let directory = options.directory()?;

    if let Some(archival) = find_higher_file(ARCHIVAL_FILE, &directory, &[".git"]) {
        if let Some(version) = from_archival(&archival, options)? {
            return Ok(version);
        }
    }

    detect_vcs(Some(Vcs::Git), &directory)?;
    let git_version = git_version(&directory)?;

    let mut concerns = BTreeSet::new();
    if is_shallow(&directory, &git_version)? {
        concerns.insert(Concern::ShallowRepository);
    }
    if options.strict && !concerns.is_empty() {
        return Err(VcsError::Concerns(concerns.into_iter().collect()));
    }

    let (code, branch) = run_cmd(
        GIT,
        &["symbolic-ref", "--short", "HEAD"],
        &directory,
        &[0, 128],
    )?;
    let branch = (code == 0).then_some(branch);

    let commit_format = if options.wants_full_commit() {
        "--format=format:%H"
    } else {
        "--format=format:%h"
    };
    let (code, commit) = run_cmd(GIT, &["log", "-n", "1", commit_format], &directory, &[0, 128])?;
    if code == 128 {
        // No commits yet.
        return options.fallback(Version {
            dirty: Some(true),
            branch,
            concerns,
            ..untagged()
        });
    }
    let commit = Some(options.truncate_commit(commit));

    let timestamp_args = ["log", "-n", "1", "--pretty=format:%cI"];
    let timestamp = Some(parse_timestamp(
        GIT,
        &timestamp_args,
        &run_ok(GIT, &timestamp_args, &directory)?,
    )?);

    let dirty = Some(is_dirty(&directory, options.ignore_untracked)?);

    if git_version.as_slice() < [2, 7].as_slice() {
        return derive_legacy(options, &directory, Version {
            commit,
            dirty,
            branch,
            timestamp,
            concerns,
            ..untagged()
        });
    }

    let tag_branch = options.tag_branch.as_deref().unwrap_or("HEAD");
    let listing = run_ok(
        GIT,
        &["for-each-ref", "refs/tags", "--merged", tag_branch, TAG_FORMAT],
        &directory,
    )?;
    if listing.is_empty() {
        return options.fallback(Version {
            distance: commit_count(&directory),
            commit,
            dirty,
            branch,
            timestamp,
            concerns,
            ..untagged()
        });
    }

    let topo_order = tag_topo_order(tag_branch, &git_version, &directory)?;
    let mut refs = listing.lines().filter_map(TagRef::parse).collect::<Vec<_>>();
    refs.sort_by_cached_key(|tag| Reverse(tag.sort_key(&topo_order)));
    let tags = refs.iter().map(TagRef::name).collect::<Vec<_>>();

    let matched = options.match_tags(&tags)?;
    let range = format!("refs/tags/{}..HEAD", matched.tag);
    let distance_args = ["rev-list", "--count", range.as_str()];
    let distance = parse_count(
        GIT,
        &distance_args,
        &run_ok(GIT, &distance_args, &directory)?,
    )?;

    Ok(Version {
        distance,
        commit,
        dirty,
        branch,
        timestamp,
        concerns,
        ..tagged(matched)
    })
}

/// Git before 2.7 cannot list tags with their dates, so only the nearest tag from `describe` is
/// considered.
fn derive_legacy(
    options: &DeriveOptions,
    directory: &Path,
    state: Version,
) -> Result<Version, VcsError> {
    let (code, description) = run_cmd(
        GIT,
        &["describe", "--tags", "--long"],
        directory,
        &[0, 128],
    )?;
    if code == 128 {
        return options.fallback(Version {
            distance: commit_count(directory),
            ..state
        });
    }

    let (tag, distance) = split_describe(&description);
    let matched = options.match_tags(&[tag])?;
    Ok(Version {
        distance,
        commit: state.commit,
        dirty: state.dirty,
        branch: state.branch,
        timestamp: state.timestamp,
        concerns: state.concerns,
        ..tagged(matched)
    })
}

/// Splits `git describe --long` output into the tag and the distance.
fn split_describe(description: &str) -> (&str, u64) {
    match DESCRIBE_RE.captures(description) {
        Some(captures) => {
            let tag = captures.name("tag").map_or(description, |m| m.as_str());
            let distance = captures
                .name("distance")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            (tag, distance)
        }
        None => (description, 0),
    }
}

fn commit_count(directory: &Path) -> u64 {
    run_ok(GIT, &["rev-list", "--count", "HEAD"], directory)
        .ok()
        .and_then(|count| count.parse().ok())
        .unwrap_or(0)
}

/// The installed Git's version, such as `[2, 39, 2]`. Empty when it cannot be determined.
fn git_version(directory: &Path) -> Result<Vec<u64>, VcsError> {
    let output = run_ok(GIT, &["version"], directory)?;
    Ok(parse_git_version(&output))
}

fn parse_git_version(output: &str) -> Vec<u64> {
    GIT_VERSION_RE
        .captures(output)
        .and_then(|captures| captures.get(1))
        .map(|version| {
            version
                .as_str()
                .split('.')
                .filter_map(|part| part.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn is_shallow(directory: &Path, git_version: &[u64]) -> Result<bool, VcsError> {
    if git_version < [2, 15].as_slice() {
        let git_dir = run_ok(GIT, &["rev-parse", "--git-dir"], directory)?;
        return Ok(directory.join(git_dir).join("shallow").exists());
    }
    let output = run_ok(GIT, &["rev-parse", "--is-shallow-repository"], directory)?;
    Ok(output == "true")
}

fn is_dirty(directory: &Path, ignore_untracked: bool) -> Result<bool, VcsError> {
    let args: &[&str] = if ignore_untracked {
        &["status", "--porcelain", "--untracked-files=no"]
    } else {
        &["status", "--porcelain"]
    };
    Ok(!run_ok(GIT, args, directory)?.is_empty())
}

/// Maps each full tag ref reachable from `tag_branch` to its position in a topological walk, so
/// that tags closer to the tip sort first.
fn tag_topo_order(
    tag_branch: &str,
    git_version: &[u64],
    directory: &Path,
) -> Result<HashMap<String, usize>, VcsError> {
    let mut args = vec!["log", "--simplify-by-decoration", "--topo-order", "--decorate=full"];
    if git_version >= [2, 16].as_slice() {
        args.push("--decorate-refs=refs/tags/*");
    }
    args.extend([tag_branch, "--"]);
    let output = run_ok(GIT, &args, directory)?;

    let mut lookup = HashMap::new();
    let headers = output.lines().filter(|line| line.starts_with("commit "));
    for (offset, line) in headers.enumerate() {
        for tag in decorated_tags(line) {
            lookup.entry(tag.to_owned()).or_insert(offset);
        }
    }
    Ok(lookup)
}

/// The tag refs in a decorated `git log` header like
/// `commit 1a2b (HEAD -> refs/heads/main, tag: refs/tags/v1.0.0)`.
fn decorated_tags(header: &str) -> Vec<&str> {
    let Some((_, decorations)) = header.split_once(" (") else {
        return Vec::new();
    };
    let decorations = decorations.strip_suffix(')').unwrap_or(decorations);
    decorations
        .split(", ")
        .filter_map(|item| item.strip_prefix("tag: "))
        .collect()
}

/// One line of `for-each-ref` output.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TagRef {
    full_ref: String,
    creator_date: Option<DateTime<FixedOffset>>,
    committer_date: Option<DateTime<FixedOffset>>,
    tagger_date: Option<DateTime<FixedOffset>>,
}

impl TagRef {
    fn parse(line: &str) -> Option<Self> {
        let fields = line.split(FIELD_SEPARATOR).collect::<Vec<_>>();
        let [full_ref, _object, creator, committer, tagger] = fields.as_slice() else {
            debug!(line, "Skipping unrecognized tag listing");
            return None;
        };
        let date = |text: &str| DateTime::parse_from_rfc3339(text).ok();
        Some(Self {
            full_ref: (*full_ref).to_owned(),
            creator_date: date(creator),
            committer_date: date(committer),
            tagger_date: date(tagger),
        })
    }

    fn name(&self) -> &str {
        self.full_ref
            .strip_prefix("refs/tags/")
            .unwrap_or(&self.full_ref)
    }

    /// Annotated tags carry a tagger date; lightweight tags fall back to the tagged commit.
    fn best_date(&self) -> Option<DateTime<FixedOffset>> {
        self.tagger_date
            .or(self.committer_date)
            .or(self.creator_date)
    }

    /// Larger keys are newer: closer to the tip first, then the most recent date.
    fn sort_key(&self, topo_order: &HashMap<String, usize>) -> (Reverse<usize>, Option<DateTime<Utc>>) {
        let offset = topo_order.get(&self.full_ref).copied().unwrap_or(usize::MAX);
        (
            Reverse(offset),
            self.best_date().map(|date| date.with_timezone(&Utc)),
        )
    }
}

/// Contents of `.git_archival.json` once `git archive` has expanded its placeholders.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Archival {
    hash_full: Option<String>,
    hash_short: Option<String>,
    timestamp: Option<String>,
    refs: Option<String>,
    describe: Option<String>,
}

/// Reads an archival file. `None` means the file was never expanded and the repository itself
/// should be asked instead.
fn from_archival(path: &Path, options: &DeriveOptions) -> Result<Option<Version>, VcsError> {
    let invalid = |reason: String| VcsError::Archival {
        path: path.to_path_buf(),
        reason,
    };
    let content = fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    if content.contains("$Format:") {
        debug!(path = %path.display(), "Ignoring unexpanded archival file");
        return Ok(None);
    }
    let data: Archival = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    let commit = if options.wants_full_commit() {
        data.hash_full
    } else {
        data.hash_short
    };
    let commit = commit
        .filter(|commit| !commit.is_empty())
        .map(|commit| options.truncate_commit(commit));

    let timestamp = match data.timestamp.as_deref().filter(|t| !t.is_empty()) {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| invalid(format!("invalid timestamp '{raw}': {e}")))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    // "HEAD -> main, tag: v1.0.0, origin/main"
    let branch = data
        .refs
        .as_deref()
        .and_then(|refs| refs.split_once(" -> "))
        .and_then(|(_, rest)| rest.split(", ").next())
        .map(str::to_owned);

    let mut dirty = None;
    let mut described = None;
    if let Some(describe) = data.describe.as_deref().filter(|d| !d.is_empty()) {
        let describe = match describe.strip_suffix("-dirty") {
            Some(clean) => {
                dirty = Some(true);
                clean
            }
            None => {
                dirty = Some(false);
                describe
            }
        };
        described = Some(split_describe(describe));
    }

    let Some((tag, distance)) = described else {
        return options
            .fallback(Version {
                commit,
                dirty,
                branch,
                timestamp,
                ..untagged()
            })
            .map(Some);
    };

    let matched = options.match_tags(&[tag])?;
    Ok(Some(Version {
        distance,
        commit,
        dirty,
        branch,
        timestamp,
        ..tagged(matched)
    }))
}
