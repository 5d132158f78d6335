//! Deriving a [`Version`] from the tags and history of a version control system.
//!
//! Every backend shells out to the VCS's own command line program; nothing is linked in. Each one
//! lives in its own module and exposes a single `derive` function, dispatched from
//! [`Version::from_vcs`].

pub(crate) mod command;

mod bazaar;
mod darcs;
mod fossil;
mod git;
mod mercurial;
mod pijul;
mod subversion;

#[cfg(test)]
pub(crate) mod sandbox;

use crate::{
    error::VcsError,
    pattern::{match_version_pattern, MatchedPattern, Pattern},
    version::Version,
};
use chrono::{DateTime, Utc};
use command::run_cmd;
use core::{
    fmt::{self, Display},
    str::FromStr,
};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A version control system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vcs {
    /// Detect the system automatically.
    Any,
    Git,
    Mercurial,
    Darcs,
    Subversion,
    Bazaar,
    Fossil,
    Pijul,
}

impl Vcs {
    /// Every concrete system, in the order they are probed by [`Vcs::Any`].
    pub const BACKENDS: [Vcs; 7] = [
        Vcs::Git,
        Vcs::Mercurial,
        Vcs::Darcs,
        Vcs::Subversion,
        Vcs::Bazaar,
        Vcs::Fossil,
        Vcs::Pijul,
    ];

    /// The lowercase name used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Vcs::Any => "any",
            Vcs::Git => "git",
            Vcs::Mercurial => "mercurial",
            Vcs::Darcs => "darcs",
            Vcs::Subversion => "subversion",
            Vcs::Bazaar => "bazaar",
            Vcs::Fossil => "fossil",
            Vcs::Pijul => "pijul",
        }
    }

    /// The name used in messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Vcs::Any => "any",
            Vcs::Git => "Git",
            Vcs::Mercurial => "Mercurial",
            Vcs::Darcs => "Darcs",
            Vcs::Subversion => "Subversion",
            Vcs::Bazaar => "Bazaar",
            Vcs::Fossil => "Fossil",
            Vcs::Pijul => "Pijul",
        }
    }

    /// The executable and the arguments of a cheap command that exits with 0 only inside a
    /// project controlled by this system.
    fn probe(&self) -> Option<(&'static str, &'static [&'static str])> {
        match self {
            Vcs::Any => None,
            Vcs::Git => Some(("git", &["status"])),
            Vcs::Mercurial => Some(("hg", &["status"])),
            Vcs::Darcs => Some(("darcs", &["log", "--last", "1"])),
            Vcs::Subversion => Some(("svn", &["info"])),
            Vcs::Bazaar => Some(("bzr", &["status"])),
            Vcs::Fossil => Some(("fossil", &["status"])),
            Vcs::Pijul => Some(("pijul", &["channel"])),
        }
    }
}

impl FromStr for Vcs {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        std::iter::once(Vcs::Any)
            .chain(Vcs::BACKENDS)
            .find(|vcs| vcs.name() == s)
            .ok_or_else(|| format!("unknown version control system: {s}"))
    }
}

impl Display for Vcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options shared by every backend.
///
/// ```
/// use dynver::DeriveOptions;
///
/// let options = DeriveOptions::default()
///     .with_pattern("default-unprefixed")
///     .with_latest_tag(true)
///     .with_path("/tmp");
/// assert_eq!("tags", options.tag_dir);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeriveOptions {
    /// Regular expression or preset name used to pick a tag. See [`crate::Pattern`].
    pub pattern: String,
    /// Text inserted after the pattern's leading `^`.
    pub pattern_prefix: Option<String>,
    /// Only consider the newest tag, failing if it does not match.
    pub latest_tag: bool,
    /// Subversion only: the directory holding tags, relative to the repository root.
    pub tag_dir: String,
    /// Git only: the branch whose history is searched for tags, `HEAD` when unset.
    pub tag_branch: Option<String>,
    /// Use the full commit id instead of the abbreviated one.
    pub full_commit: bool,
    /// Fail instead of falling back to `0.0.0`, and treat concerns as errors.
    pub strict: bool,
    /// The directory to inspect, the current directory when unset.
    pub path: Option<PathBuf>,
    /// Truncate the full commit id to this many characters. Implies `full_commit`.
    pub commit_length: Option<usize>,
    /// Git only: untracked files do not make the working tree dirty.
    pub ignore_untracked: bool,
}

impl Default for DeriveOptions {
    fn default() -> Self {
        Self {
            pattern: Pattern::Default.name().to_owned(),
            pattern_prefix: None,
            latest_tag: false,
            tag_dir: "tags".to_owned(),
            tag_branch: None,
            full_commit: false,
            strict: false,
            path: None,
            commit_length: None,
            ignore_untracked: false,
        }
    }
}

impl DeriveOptions {
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn with_pattern_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pattern_prefix = Some(prefix.into());
        self
    }

    pub fn with_latest_tag(mut self, latest_tag: bool) -> Self {
        self.latest_tag = latest_tag;
        self
    }

    pub fn with_tag_dir(mut self, tag_dir: impl Into<String>) -> Self {
        self.tag_dir = tag_dir.into();
        self
    }

    pub fn with_tag_branch(mut self, tag_branch: impl Into<String>) -> Self {
        self.tag_branch = Some(tag_branch.into());
        self
    }

    pub fn with_full_commit(mut self, full_commit: bool) -> Self {
        self.full_commit = full_commit;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_commit_length(mut self, commit_length: usize) -> Self {
        self.commit_length = Some(commit_length);
        self
    }

    pub fn with_ignore_untracked(mut self, ignore_untracked: bool) -> Self {
        self.ignore_untracked = ignore_untracked;
        self
    }

    /// The directory to inspect.
    pub fn directory(&self) -> Result<PathBuf, VcsError> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir().map_err(VcsError::CurrentDirectory),
        }
    }

    /// Whether the backend should ask for the full commit id.
    pub(crate) fn wants_full_commit(&self) -> bool {
        self.full_commit || self.commit_length.is_some()
    }

    /// Applies `commit_length` to a commit id.
    pub(crate) fn truncate_commit(&self, commit: String) -> String {
        match self.commit_length {
            Some(length) => commit.chars().take(length).collect(),
            None => commit,
        }
    }

    /// Matches `tags`, ordered newest first, against the configured pattern.
    pub(crate) fn match_tags<S: AsRef<str>>(&self, tags: &[S]) -> Result<MatchedPattern, VcsError> {
        debug!(
            tags = ?tags.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            "Matching tag candidates"
        );
        Ok(match_version_pattern(
            &self.pattern,
            tags,
            self.latest_tag,
            self.pattern_prefix.as_deref(),
        )?)
    }

    /// Returns `version` unless strict mode forbids a version without a tag.
    pub(crate) fn fallback(&self, version: Version) -> Result<Version, VcsError> {
        if self.strict {
            return Err(VcsError::Strict(
                "No tags available and fallbacks disallowed by strict mode",
            ));
        }
        debug!(distance = version.distance, "No usable tags, falling back to 0.0.0");
        Ok(version)
    }
}

/// The starting point for a version when no tag is usable.
pub(crate) fn untagged() -> Version {
    Version::new("0.0.0")
}

/// Builds a version from the tag a pattern matched. The caller fills in the repository state.
pub(crate) fn tagged(matched: MatchedPattern) -> Version {
    let MatchedPattern {
        tag,
        base,
        stage,
        newer_unmatched_tags,
        tagged_metadata,
        epoch,
    } = matched;

    let (stage, revision) = match stage {
        Some((stage, revision)) => (Some(stage), revision),
        None => (None, None),
    };
    Version {
        stage,
        revision,
        tagged_metadata,
        epoch,
        ..Version::new(base)
    }
    .with_matched_tag(tag, newer_unmatched_tags)
}

/// Parses an RFC 3339 timestamp printed by `program` and converts it to UTC.
pub(crate) fn parse_timestamp(
    program: &'static str,
    args: &[&str],
    text: &str,
) -> Result<DateTime<Utc>, VcsError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|e| VcsError::UnexpectedOutput {
            command: command::render(program, args),
            reason: format!("invalid timestamp '{text}': {e}"),
        })
}

/// Looks for the file `name` in `start` and then in each parent directory, stopping without a
/// result at the first directory containing one of `limits`.
pub(crate) fn find_higher_file(name: &str, start: &Path, limits: &[&str]) -> Option<PathBuf> {
    for level in start.ancestors() {
        let candidate = level.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if limits.iter().any(|limit| level.join(limit).exists()) {
            return None;
        }
    }
    None
}

/// Identifies a VCS from an archival file left behind by `git archive` or `hg archive`.
pub fn detect_vcs_from_archival(directory: &Path) -> Option<Vcs> {
    if find_higher_file(git::ARCHIVAL_FILE, directory, &[".git"]).is_some() {
        Some(Vcs::Git)
    } else if find_higher_file(mercurial::ARCHIVAL_FILE, directory, &[".hg"]).is_some() {
        Some(Vcs::Mercurial)
    } else {
        None
    }
}

/// Confirms that `expected` controls `directory`, or finds the VCS that does.
///
/// # Errors
///
/// - [`VcsError::ProgramNotFound`] if `expected` is a concrete VCS whose program is missing.
/// - [`VcsError::NotAProject`] if `expected` is a concrete VCS that does not control the
///   directory.
/// - [`VcsError::Undetected`] if `expected` is [`Vcs::Any`] or `None` and no probe succeeds.
pub fn detect_vcs(expected: Option<Vcs>, directory: &Path) -> Result<Vcs, VcsError> {
    if let Some((program, args)) = expected.and_then(|vcs| vcs.probe()) {
        let (code, _) = run_cmd(program, args, directory, &[])?;
        return match expected {
            Some(vcs) if code == 0 => Ok(vcs),
            Some(vcs) => Err(VcsError::NotAProject {
                vcs_name: vcs.display_name(),
            }),
            None => Err(VcsError::Undetected),
        };
    }

    if let Some(vcs) = detect_vcs_from_archival(directory) {
        debug!(%vcs, "Detected from archival file");
        return Ok(vcs);
    }

    for vcs in Vcs::BACKENDS {
        let Some((program, args)) = vcs.probe() else {
            continue;
        };
        match run_cmd(program, args, directory, &[]) {
            Ok((0, _)) => {
                debug!(%vcs, "Detected");
                return Ok(vcs);
            }
            Ok(_) | Err(VcsError::ProgramNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Err(VcsError::Undetected)
}

impl Version {
    /// Derives a version from the given VCS. [`Vcs::Any`] detects it first.
    pub fn from_vcs(vcs: Vcs, options: &DeriveOptions) -> Result<Self, VcsError> {
        let version = match vcs {
            Vcs::Any => return Self::from_any_vcs(options),
            Vcs::Git => git::derive(options),
            Vcs::Mercurial => mercurial::derive(options),
            Vcs::Darcs => darcs::derive(options),
            Vcs::Subversion => subversion::derive(options),
            Vcs::Bazaar => bazaar::derive(options),
            Vcs::Fossil => fossil::derive(options),
            Vcs::Pijul => pijul::derive(options),
        }?;

        for concern in &version.concerns {
            warn!("{concern}");
        }
        debug!(
            matched_tag = ?version.matched_tag(),
            newer_unmatched_tags = ?version.newer_unmatched_tags(),
            "Derived {} from {}",
            version,
            vcs.display_name()
        );
        Ok(version)
    }

    /// Detects the VCS controlling the configured directory and derives a version from it.
    pub fn from_any_vcs(options: &DeriveOptions) -> Result<Self, VcsError> {
        let vcs = detect_vcs(None, &options.directory()?)?;
        Self::from_vcs(vcs, options)
    }

    /// Derives a version from Git. An expanded `.git_archival.json` is used when present.
    pub fn from_git(options: &DeriveOptions) -> Result<Self, VcsError> {
        Self::from_vcs(Vcs::Git, options)
    }

    /// Derives a version from Mercurial. An `.hg_archival.txt` is used when present.
    pub fn from_mercurial(options: &DeriveOptions) -> Result<Self, VcsError> {
        Self::from_vcs(Vcs::Mercurial, options)
    }

    /// Derives a version from Darcs.
    pub fn from_darcs(options: &DeriveOptions) -> Result<Self, VcsError> {
        Self::from_vcs(Vcs::Darcs, options)
    }

    /// Derives a version from Subversion, treating each directory under
    /// [`DeriveOptions::tag_dir`] as a tag.
    pub fn from_subversion(options: &DeriveOptions) -> Result<Self, VcsError> {
        Self::from_vcs(Vcs::Subversion, options)
    }

    /// Derives a version from Bazaar.
    pub fn from_bazaar(options: &DeriveOptions) -> Result<Self, VcsError> {
        Self::from_vcs(Vcs::Bazaar, options)
    }

    /// Derives a version from Fossil.
    pub fn from_fossil(options: &DeriveOptions) -> Result<Self, VcsError> {
        Self::from_vcs(Vcs::Fossil, options)
    }

    /// Derives a version from Pijul.
    pub fn from_pijul(options: &DeriveOptions) -> Result<Self, VcsError> {
        Self::from_vcs(Vcs::Pijul, options)
    }
}
