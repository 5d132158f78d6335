use crate::{
    error::{BumpError, Error, StyleError},
    format::{Format, Placeholder},
    pattern::{match_version_pattern, Pattern},
    style::{serialize_pep440, serialize_pvp, serialize_semver, Style},
};
use chrono::{DateTime, Utc};
use core::{
    cmp::Ordering,
    fmt::{self, Display},
};
use itertools::Itertools;
use regex::Regex;
use std::{collections::BTreeSet, sync::LazyLock};

static POST_DEV_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.post(\d+)\.dev\d+").unwrap());

static DISTANCE_METADATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^d?(\d+)$").unwrap());

static COMMIT_METADATA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^g?([\da-z]+)$").unwrap());

/// A non-fatal problem noticed while deriving a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Concern {
    /// The repository is a shallow clone, so tags or history may be missing.
    ShallowRepository,
}

impl Concern {
    /// A message suitable for showing to the user.
    pub fn message(&self) -> &'static str {
        match self {
            Concern::ShallowRepository => {
                "This is a shallow repository, so Dynver may not produce the correct version."
            }
        }
    }
}

impl Display for Concern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Knobs for [`Version::serialize`]. The default produces plain PEP 440 with the commit included
/// only when the distance is non-zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializeOptions<'a> {
    /// `Some(true)` always includes the commit, `Some(false)` never includes any metadata, and
    /// `None` includes the commit only when the distance is non-zero.
    pub metadata: Option<bool>,
    /// Add `dirty` to the metadata when the working tree is dirty.
    pub dirty: bool,
    /// A custom template; see [`Format`]. It is only validated when `style` is also set.
    pub format: Option<&'a str>,
    /// The output grammar, PEP 440 when unset.
    pub style: Option<Style>,
    /// Preview the next release: bump the base (or the stage revision) when the distance is
    /// non-zero, and render the distance as a development/prerelease marker.
    pub bump: bool,
    /// Include the metadata captured from the tag.
    pub tagged_metadata: bool,
    /// Text to put in front of the commit id.
    pub commit_prefix: Option<&'a str>,
    /// Replacement for non-alphanumeric characters in `{branch_escaped}`. They are removed when
    /// unset.
    pub escape_with: Option<&'a str>,
}

/// A version derived from a version control system or parsed from a string.
///
/// Equality and ordering cover every public field except `concerns`. The tag that was matched
/// and the tags that were skipped are kept only for diagnostics.
///
/// # Examples
///
/// ```
/// use dynver::{SerializeOptions, Style, Version};
///
/// let version = Version::new("0.1.0")
///     .with_stage("alpha", Some(2))
///     .with_distance(3)
///     .with_commit("abc");
///
/// assert_eq!("0.1.0a2.post3.dev0+abc", version.serialize(&SerializeOptions::default()).unwrap());
///
/// let options = SerializeOptions { style: Some(Style::SemVer), ..Default::default() };
/// assert_eq!("0.1.0-alpha.2.post.3+abc", version.serialize(&options).unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Version {
    /// Release segment, such as `0.1.0`.
    pub base: String,
    /// Prerelease or post/dev stage, such as `rc`.
    pub stage: Option<String>,
    /// Revision within the stage. Ignored when there is no stage.
    pub revision: Option<u64>,
    /// Number of commits since the matched tag.
    pub distance: u64,
    /// Commit identifier.
    pub commit: Option<String>,
    /// Whether the working tree has uncommitted changes, when that could be determined.
    pub dirty: Option<bool>,
    /// Metadata captured from the tag itself.
    pub tagged_metadata: Option<String>,
    /// PEP 440 epoch.
    pub epoch: Option<u64>,
    /// Current branch.
    pub branch: Option<String>,
    /// Timestamp of the current commit, in UTC.
    pub timestamp: Option<DateTime<Utc>>,
    /// Non-fatal problems noticed while deriving the version.
    pub concerns: BTreeSet<Concern>,

    pub(crate) matched_tag: Option<String>,
    pub(crate) newer_unmatched_tags: Option<Vec<String>>,
    pub(crate) smart_bumped: bool,
}

impl Version {
    /// Creates a version with the given base and every other field unset.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            ..Default::default()
        }
    }

    /// Sets the stage and its revision.
    pub fn with_stage(mut self, stage: impl Into<String>, revision: Option<u64>) -> Self {
        self.stage = Some(stage.into());
        self.revision = revision;
        self
    }

    /// Sets the distance.
    pub fn with_distance(mut self, distance: u64) -> Self {
        self.distance = distance;
        self
    }

    /// Sets the commit.
    pub fn with_commit(mut self, commit: impl Into<String>) -> Self {
        self.commit = Some(commit.into());
        self
    }

    /// Sets the dirty flag.
    pub fn with_dirty(mut self, dirty: bool) -> Self {
        self.dirty = Some(dirty);
        self
    }

    /// Sets the tagged metadata.
    pub fn with_tagged_metadata(mut self, tagged_metadata: impl Into<String>) -> Self {
        self.tagged_metadata = Some(tagged_metadata.into());
        self
    }

    /// Sets the epoch.
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = Some(epoch);
        self
    }

    /// Sets the branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Sets the timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub(crate) fn with_matched_tag(mut self, tag: String, newer_unmatched_tags: Vec<String>) -> Self {
        self.matched_tag = Some(tag);
        self.newer_unmatched_tags = Some(newer_unmatched_tags);
        self
    }

    /// The tag this version was derived from, if any.
    pub fn matched_tag(&self) -> Option<&str> {
        self.matched_tag.as_deref()
    }

    /// Tags that were newer than the matched tag but were rejected by the pattern.
    pub fn newer_unmatched_tags(&self) -> Option<&[String]> {
        self.newer_unmatched_tags.as_deref()
    }

    /// Creates a version from a string that was previously produced by [`Version::serialize`] or
    /// that looks like one.
    ///
    /// Metadata segments are interpreted, in order, as the dirty flag (`dirty`/`clean`), the
    /// distance (`7` or `d7`) and the commit (`b6a9020` or `gb6a9020`); anything left over becomes
    /// the tagged metadata. A `.devN` stage is folded into the distance.
    ///
    /// Text that cannot be understood becomes the base of a version with nothing else set.
    ///
    /// ```
    /// use dynver::Version;
    ///
    /// assert_eq!(
    ///     Version::new("1.2.3").with_stage("a", Some(3)).with_distance(7).with_commit("b6a9020"),
    ///     Version::parse("1.2.3a3+d7.gb6a9020"),
    /// );
    /// assert_eq!(Version::new("foo"), Version::parse("foo"));
    /// ```
    pub fn parse(version: &str) -> Self {
        let normalized = if version.starts_with('v') {
            version.to_owned()
        } else {
            format!("v{version}")
        };

        let Ok(matched) = match_version_pattern(Pattern::Default.name(), &[normalized], true, None)
        else {
            let replaced = POST_DEV_RE.replacen(version, 1, ".dev$1");
            if replaced != version {
                let alternative = Version::parse(&replaced);
                if alternative.base != replaced {
                    return alternative;
                }
            }
            return Version::new(version);
        };

        let mut distance = None;
        let mut commit = None;
        let mut dirty = None;
        let mut tagged_metadata = matched.tagged_metadata;

        if let Some(metadata) = tagged_metadata.take() {
            let mut remaining = Vec::new();
            for part in metadata.split('.') {
                if dirty.is_none() && (part == "dirty" || part == "clean") {
                    dirty = Some(part == "dirty");
                    continue;
                }
                if distance.is_none() {
                    if let Some(value) = DISTANCE_METADATA_RE
                        .captures(part)
                        .and_then(|c| c[1].parse::<u64>().ok())
                    {
                        distance = Some(value);
                        continue;
                    }
                }
                if commit.is_none() {
                    if let Some(captures) = COMMIT_METADATA_RE.captures(part) {
                        commit = Some(captures[1].to_owned());
                        continue;
                    }
                }
                remaining.push(part);
            }
            let remaining = remaining.join(".");
            if !remaining.trim().is_empty() {
                tagged_metadata = Some(remaining);
            }
        }

        let mut distance = distance.unwrap_or(0);
        let (mut stage, mut revision) = match matched.stage {
            Some((name, revision)) => (Some(name), revision),
            None => (None, None),
        };
        if let (Some("dev"), Some(dev)) = (stage.as_deref(), revision) {
            let Some(total) = distance.checked_add(dev) else {
                return Version::new(version);
            };
            distance = total;
            stage = None;
            revision = None;
        }

        Version {
            base: matched.base,
            stage,
            revision,
            distance,
            commit,
            dirty,
            tagged_metadata,
            epoch: matched.epoch,
            ..Default::default()
        }
    }

    /// Returns a new version with the base or the stage revision incremented.
    ///
    /// Without a stage, the base component at `index` is bumped (see [`bump_version`]). With a
    /// stage, the revision is increased by `increment`, or set to 2 if it was unset.
    ///
    /// ```
    /// use dynver::Version;
    ///
    /// assert_eq!("1.3.0", Version::new("1.2.3").bump(-2, 1).unwrap().base);
    /// assert_eq!(Some(2), Version::new("1.2.3").with_stage("a", None).bump(-1, 1).unwrap().revision);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`BumpError`] if the base cannot be bumped at `index`, or the revision would
    /// overflow.
    pub fn bump(&self, index: isize, increment: u64) -> Result<Self, BumpError> {
        let mut bumped = self.clone();
        if self.stage.is_none() {
            bumped.base = bump_version(&self.base, index, increment)?;
        } else {
            bumped.revision = Some(match self.revision {
                None => 2,
                Some(revision) => BumpError::checked_add(revision, increment)?,
            });
        }
        Ok(bumped)
    }

    /// Like [`Version::bump`], but only when the distance is non-zero. The result remembers that
    /// it was bumped, so the distance serializes as a development release (`.devN` or `pre.N`)
    /// instead of a post release.
    ///
    /// # Errors
    ///
    /// Returns a [`BumpError`] if the base cannot be bumped at `index`.
    pub fn bump_smart(&self, index: isize, increment: u64) -> Result<Self, BumpError> {
        if self.distance == 0 {
            return Ok(self.clone());
        }
        let mut bumped = self.bump(index, increment)?;
        bumped.smart_bumped = true;
        Ok(bumped)
    }

    /// Serializes the version according to `options`.
    ///
    /// # Errors
    ///
    /// - [`StyleError`] if the output does not conform to the style, or the format is invalid.
    /// - [`BumpError`] if bumping was requested and the base is not numeric, or the development
    ///   number would overflow.
    pub fn serialize(&self, options: &SerializeOptions<'_>) -> Result<String, Error> {
        let (base, revision) = if options.bump {
            let bumped = self.bump_smart(-1, 1)?;
            (bumped.base, bumped.revision)
        } else {
            (self.base.clone(), self.revision)
        };
        let commit = self
            .commit
            .as_ref()
            .map(|commit| format!("{}{commit}", options.commit_prefix.unwrap_or_default()));

        if let Some(template) = options.format {
            let format = Format::parse(template)?;
            let out = format.render(|placeholder| {
                self.placeholder_value(placeholder, &base, revision, commit.as_deref(), options)
            });
            if let Some(style) = options.style {
                style.check(&out)?;
            }
            return Ok(out);
        }

        let mut meta_parts = Vec::new();
        if options.metadata != Some(false) {
            if options.tagged_metadata {
                if let Some(tagged_metadata) = &self.tagged_metadata {
                    meta_parts.push(tagged_metadata.clone());
                }
            }
            if options.metadata == Some(true) || self.distance > 0 {
                if let Some(commit) = &commit {
                    meta_parts.push(commit.clone());
                }
            }
            if options.dirty && self.dirty == Some(true) {
                meta_parts.push("dirty".to_owned());
            }
        }

        let bumping = options.bump || self.smart_bumped;
        let mut pre_parts = Vec::new();
        if let Some(stage) = &self.stage {
            pre_parts.push(stage.clone());
            if let Some(revision) = revision {
                pre_parts.push(revision.to_string());
            }
        }
        if self.distance > 0 {
            pre_parts.push(if bumping { "pre" } else { "post" }.to_owned());
            pre_parts.push(self.distance.to_string());
        }

        let meta_parts = meta_parts.iter().map(String::as_str).collect::<Vec<_>>();
        let pre_parts = pre_parts.iter().map(String::as_str).collect::<Vec<_>>();

        let out = match options.style.unwrap_or_default() {
            Style::Pep440 => {
                let mut stage = self.stage.as_deref();
                let mut post = None;
                let mut dev = None;
                match stage {
                    Some("post") => {
                        stage = None;
                        post = revision;
                    }
                    Some("dev") => {
                        stage = None;
                        dev = revision;
                    }
                    _ => {}
                }
                if self.distance > 0 {
                    if !bumping && post.is_none() && dev.is_none() {
                        post = Some(self.distance);
                        dev = Some(0);
                    } else {
                        dev = Some(BumpError::checked_add(dev.unwrap_or(0), self.distance)?);
                    }
                }
                serialize_pep440(&base, stage, revision, post, dev, self.epoch, &meta_parts)?
            }
            Style::SemVer => serialize_semver(&base, &pre_parts, &meta_parts)?,
            Style::Pvp => {
                let parts = pre_parts.iter().chain(&meta_parts).copied().collect::<Vec<_>>();
                serialize_pvp(&base, &parts)?
            }
        };

        Ok(out)
    }

    /// Serializes the version with a custom function, validating the result if `style` is set.
    ///
    /// ```
    /// use dynver::{Style, Version};
    ///
    /// let version = Version::new("1").with_stage("a", Some(2));
    /// let out = version.serialize_with(|v| format!("{}-{}", v.base, v.distance), None);
    /// assert_eq!(Ok("1-0".to_owned()), out);
    /// assert!(version.serialize_with(|v| format!("v{}", v.base), Some(Style::Pep440)).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a [`StyleError`] if the output does not conform to `style`.
    pub fn serialize_with<F>(&self, format: F, style: Option<Style>) -> Result<String, StyleError>
    where
        F: FnOnce(&Version) -> String,
    {
        let out = format(self);
        if let Some(style) = style {
            style.check(&out)?;
        }
        Ok(out)
    }

    fn placeholder_value(
        &self,
        placeholder: Placeholder,
        base: &str,
        revision: Option<u64>,
        commit: Option<&str>,
        options: &SerializeOptions<'_>,
    ) -> String {
        let blank = |value: Option<&str>| value.unwrap_or_default().to_owned();
        let base_part = |index: usize| blank(base.split('.').nth(index));

        match placeholder {
            Placeholder::Base => base.to_owned(),
            Placeholder::Stage => blank(self.stage.as_deref()),
            Placeholder::Revision => revision.map(|r| r.to_string()).unwrap_or_default(),
            Placeholder::Distance => self.distance.to_string(),
            Placeholder::Commit => blank(commit),
            Placeholder::Dirty => if self.dirty == Some(true) { "dirty" } else { "clean" }.to_owned(),
            Placeholder::TaggedMetadata => blank(self.tagged_metadata.as_deref()),
            Placeholder::Epoch => self.epoch.map(|e| e.to_string()).unwrap_or_default(),
            Placeholder::Branch => blank(self.branch.as_deref()),
            Placeholder::BranchEscaped => self
                .branch
                .as_deref()
                .map(|branch| escape_branch(branch, options.escape_with))
                .unwrap_or_default(),
            Placeholder::Timestamp => self
                .timestamp
                .map(|t| t.format("%Y%m%d%H%M%S").to_string())
                .unwrap_or_default(),
            Placeholder::Major => base_part(0),
            Placeholder::Minor => base_part(1),
            Placeholder::Patch => base_part(2),
        }
    }

    fn cmp_key(&self) -> (Option<u64>, Vec<BaseSegment<'_>>) {
        (self.epoch, base_key(&self.base))
    }
}

/// Replaces every character that is not an ASCII letter or digit.
fn escape_branch(branch: &str, escape_with: Option<&str>) -> String {
    let mut escaped = String::with_capacity(branch.len());
    for c in branch.chars() {
        if c.is_ascii_alphanumeric() {
            escaped.push(c);
        } else if let Some(replacement) = escape_with {
            escaped.push_str(replacement);
        }
    }
    escaped
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum BaseSegment<'a> {
    Number(u64),
    Text(&'a str),
}

/// Dotted-numeric sort key for a base: `0.10.0` sorts after `0.2.0`, and `1.0` equals `1`.
fn base_key(base: &str) -> Vec<BaseSegment<'_>> {
    let mut key = base
        .split('.')
        .map(|segment| match segment.parse() {
            Ok(number) => BaseSegment::Number(number),
            Err(_) => BaseSegment::Text(segment),
        })
        .collect::<Vec<_>>();
    while key.last() == Some(&BaseSegment::Number(0)) {
        key.pop();
    }
    key
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
            && self.stage == other.stage
            && self.revision == other.revision
            && self.distance == other.distance
            && self.commit == other.commit
            && self.dirty == other.dirty
            && self.tagged_metadata == other.tagged_metadata
            && self.epoch == other.epoch
            && self.branch == other.branch
            && self.timestamp == other.timestamp
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    /// Orders by epoch, then the base as dotted numbers, then stage, revision, distance, commit
    /// and dirty flag. Remaining fields only break ties so that ordering agrees with equality.
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key()
            .cmp(&other.cmp_key())
            .then_with(|| self.stage.cmp(&other.stage))
            .then_with(|| self.revision.cmp(&other.revision))
            .then_with(|| self.distance.cmp(&other.distance))
            .then_with(|| self.commit.cmp(&other.commit))
            .then_with(|| self.dirty.cmp(&other.dirty))
            .then_with(|| self.tagged_metadata.cmp(&other.tagged_metadata))
            .then_with(|| self.branch.cmp(&other.branch))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.base.cmp(&other.base))
    }
}

impl Display for Version {
    /// Displays the default PEP 440 serialization, or the raw base if that is not valid PEP 440.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.serialize(&SerializeOptions::default()) {
            Ok(serialized) => f.write_str(&serialized),
            Err(_) => f.write_str(&self.base),
        }
    }
}

/// Increments the component of a dotted-numeric base at `index` by `increment` and resets every
/// component after it to zero.
///
/// Negative indices count from the end, so `-1` is the last component.
///
/// ```
/// use dynver::bump_version;
///
/// assert_eq!(Ok("1.2.4".to_owned()), bump_version("1.2.3", -1, 1));
/// assert_eq!(Ok("2.0.0".to_owned()), bump_version("1.2.3", 0, 1));
/// assert_eq!(Ok("1.5.0".to_owned()), bump_version("1.2.3", -2, 3));
/// assert!(bump_version("1.2.3", 3, 1).is_err());
/// ```
///
/// # Errors
///
/// - [`BumpError::NonNumericComponent`] if a component is not a non-negative integer.
/// - [`BumpError::IndexOutOfRange`] if `index` does not address a component.
/// - [`BumpError::Overflow`] if the bumped component would exceed `u64::MAX`.
pub fn bump_version(base: &str, index: isize, increment: u64) -> Result<String, BumpError> {
    let mut components = base
        .split('.')
        .map(|component| {
            component
                .parse::<u64>()
                .map_err(|_| BumpError::NonNumericComponent {
                    base: base.to_owned(),
                    component: component.to_owned(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let len = components.len();
    let resolved = if index < 0 {
        len as isize + index
    } else {
        index
    };
    let resolved = usize::try_from(resolved)
        .ok()
        .filter(|&resolved| resolved < len)
        .ok_or_else(|| BumpError::IndexOutOfRange {
            index,
            base: base.to_owned(),
            len,
        })?;

    components[resolved] = BumpError::checked_add(components[resolved], increment)?;
    for component in &mut components[resolved + 1..] {
        *component = 0;
    }

    Ok(components.iter().join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::*;

    fn serialize(version: &Version, options: SerializeOptions<'_>) -> String {
        version.serialize(&options).unwrap()
    }

    #[fixture]
    fn prerelease() -> Version {
        Version::new("0.1.0")
            .with_stage("alpha", Some(2))
            .with_distance(3)
            .with_commit("abc")
            .with_dirty(true)
    }

    #[test]
    fn test_init() {
        let v = Version::new("1")
            .with_stage("a", Some(2))
            .with_distance(3)
            .with_commit("abc")
            .with_dirty(true)
            .with_tagged_metadata("def")
            .with_epoch(4);
        assert_eq!("1", v.base);
        assert_eq!(Some("a"), v.stage.as_deref());
        assert_eq!(Some(2), v.revision);
        assert_eq!(3, v.distance);
        assert_eq!(Some("abc"), v.commit.as_deref());
        assert_eq!(Some(true), v.dirty);
        assert_eq!(Some("def"), v.tagged_metadata.as_deref());
        assert_eq!(Some(4), v.epoch);
    }

    #[test]
    fn test_display() {
        let v = Version::new("1")
            .with_stage("a", Some(2))
            .with_distance(3)
            .with_commit("abc")
            .with_dirty(true);
        assert_eq!(serialize(&v, Default::default()), v.to_string());
        assert_eq!("foo", Version::new("foo").to_string());
    }

    #[test]
    fn test_ordering() {
        assert_eq!(
            Version::new("0.1.0").with_distance(2),
            Version::new("0.1.0").with_distance(2)
        );
        assert!(Version::new("0.2.0") > Version::new("0.1.0"));
        assert!(Version::new("0.10.0") > Version::new("0.2.0"));
        assert!(Version::new("0.1.0").with_epoch(1) > Version::new("0.2.0"));
        assert!(Version::new("0.1.0").with_distance(2) > Version::new("0.1.0").with_distance(1));
        assert_ne!(
            Version::new("0.1.0").with_commit("a"),
            Version::new("0.1.0").with_commit("b")
        );
        assert_eq!(
            Version::new("0.1.0").with_dirty(true),
            Version::new("0.1.0").with_dirty(true)
        );
        assert_ne!(
            Version::new("0.1.0").with_dirty(false),
            Version::new("0.1.0").with_dirty(true)
        );
        assert_ne!(Version::new("0.1.0"), Version::new("0.1.0").with_dirty(true));
        assert_ne!(Version::new("0.1.0"), Version::new("0.1.0").with_dirty(false));

        // equal by number, distinct by text
        assert_ne!(Version::new("1.0"), Version::new("1.0.0"));
        assert_ne!(
            Ordering::Equal,
            Version::new("1.0").cmp(&Version::new("1.0.0"))
        );
    }

    #[test]
    fn test_debug_fields_ignored_by_eq() {
        let plain = Version::new("0.1.0");
        let matched = Version::new("0.1.0").with_matched_tag("v0.1.0".to_owned(), vec![]);
        assert_eq!(plain, matched);
        assert_eq!(Some("v0.1.0"), matched.matched_tag());
        assert_eq!(None, plain.newer_unmatched_tags());
    }

    #[test]
    fn test_serialize_pep440() {
        let v = Version::new("1")
            .with_stage("a", Some(2))
            .with_distance(3)
            .with_commit("abc")
            .with_dirty(true);

        let args = [
            (SerializeOptions::default(), "1a2.post3.dev0+abc"),
            (
                SerializeOptions {
                    dirty: true,
                    ..Default::default()
                },
                "1a2.post3.dev0+abc.dirty",
            ),
            (
                SerializeOptions {
                    metadata: Some(false),
                    ..Default::default()
                },
                "1a2.post3.dev0",
            ),
            (
                SerializeOptions {
                    metadata: Some(false),
                    dirty: true,
                    ..Default::default()
                },
                "1a2.post3.dev0",
            ),
        ];
        for (options, expected) in args {
            assert_eq!(expected, serialize(&v, options));
        }

        let args = [
            (Version::new("0.1.0"), "0.1.0"),
            (
                Version::new("1")
                    .with_stage("a", Some(0))
                    .with_distance(3)
                    .with_commit("abc")
                    .with_dirty(false),
                "1a0.post3.dev0+abc",
            ),
            (
                Version::new("1")
                    .with_stage("a", Some(2))
                    .with_commit("abc")
                    .with_dirty(false),
                "1a2",
            ),
            (
                Version::new("1")
                    .with_stage("a", Some(2))
                    .with_distance(3)
                    .with_commit("000")
                    .with_dirty(false),
                "1a2.post3.dev0+000",
            ),
            (Version::new("1").with_stage("a", None), "1a0"),
            (Version::new("1").with_stage("b", Some(2)), "1b2"),
            (Version::new("1").with_stage("rc", Some(2)), "1rc2"),
            (Version::new("0.1.0").with_epoch(2), "2!0.1.0"),
            (Version::new("0.1.0").with_stage("post", Some(1)), "0.1.0.post1"),
            (
                Version::new("0.1.0")
                    .with_stage("post", Some(1))
                    .with_distance(3),
                "0.1.0.post1.dev3",
            ),
            (Version::new("0.1.0").with_stage("dev", Some(1)), "0.1.0.dev1"),
            (
                Version::new("0.1.0")
                    .with_stage("dev", Some(1))
                    .with_distance(3),
                "0.1.0.dev4",
            ),
        ];
        for (version, expected) in args {
            assert_eq!(expected, serialize(&version, Default::default()));
        }
    }

    #[rstest]
    #[case(Version::new("0.1.0"), "0.1.0")]
    #[case(Version::new("0.1.0").with_distance(3), "0.1.1.dev3")]
    #[case(Version::new("1").with_distance(3), "2.dev3")]
    #[case(Version::new("0.1.0").with_stage("a", None).with_distance(3), "0.1.0a2.dev3")]
    #[case(Version::new("0.1.0").with_stage("b", Some(2)).with_distance(3), "0.1.0b3.dev3")]
    #[case(Version::new("0.1.0").with_stage("post", Some(1)).with_distance(3), "0.1.0.post2.dev3")]
    #[case(Version::new("0.1.0").with_stage("dev", Some(1)).with_distance(3), "0.1.0.dev5")]
    fn test_serialize_pep440_bump(#[case] version: Version, #[case] expected: &str) {
        let options = SerializeOptions {
            bump: true,
            ..Default::default()
        };
        assert_eq!(expected, serialize(&version, options));
    }

    #[rstest]
    #[case(Style::SemVer, None, false, "0.1.0-alpha.2.post.3+abc")]
    #[case(Style::SemVer, None, true, "0.1.0-alpha.2.post.3+abc.dirty")]
    #[case(Style::SemVer, Some(false), false, "0.1.0-alpha.2.post.3")]
    #[case(Style::SemVer, Some(false), true, "0.1.0-alpha.2.post.3")]
    #[case(Style::Pvp, None, false, "0.1.0-alpha-2-post-3-abc")]
    #[case(Style::Pvp, None, true, "0.1.0-alpha-2-post-3-abc-dirty")]
    #[case(Style::Pvp, Some(false), false, "0.1.0-alpha-2-post-3")]
    #[case(Style::Pvp, Some(false), true, "0.1.0-alpha-2-post-3")]
    fn test_serialize_other_styles(
        prerelease: Version,
        #[case] style: Style,
        #[case] metadata: Option<bool>,
        #[case] dirty: bool,
        #[case] expected: &str,
    ) {
        let options = SerializeOptions {
            style: Some(style),
            metadata,
            dirty,
            ..Default::default()
        };
        assert_eq!(expected, serialize(&prerelease, options));
    }

    #[test]
    fn test_serialize_semver_and_pvp_shapes() {
        let args = [
            (Version::new("0.1.0"), "0.1.0", "0.1.0"),
            (
                Version::new("0.1.0")
                    .with_stage("alpha", Some(0))
                    .with_distance(3)
                    .with_commit("abc")
                    .with_dirty(false),
                "0.1.0-alpha.0.post.3+abc",
                "0.1.0-alpha-0-post-3-abc",
            ),
            (
                Version::new("0.1.0")
                    .with_stage("alpha", Some(2))
                    .with_commit("abc")
                    .with_dirty(false),
                "0.1.0-alpha.2",
                "0.1.0-alpha-2",
            ),
            (
                Version::new("0.1.0").with_stage("alpha", None),
                "0.1.0-alpha",
                "0.1.0-alpha",
            ),
            (
                Version::new("0.1.0").with_stage("beta", Some(2)),
                "0.1.0-beta.2",
                "0.1.0-beta-2",
            ),
            (
                Version::new("0.1.0").with_stage("rc", Some(2)),
                "0.1.0-rc.2",
                "0.1.0-rc-2",
            ),
            (Version::new("0.1.0").with_epoch(2), "0.1.0", "0.1.0"),
        ];

        for (version, semver, pvp) in args {
            let options = |style| SerializeOptions {
                style: Some(style),
                ..Default::default()
            };
            assert_eq!(semver, serialize(&version, options(Style::SemVer)));
            assert_eq!(pvp, serialize(&version, options(Style::Pvp)));
        }
    }

    #[test]
    fn test_serialize_semver_and_pvp_bump() {
        let args = [
            (Version::new("0.1.0"), "0.1.0", "0.1.0"),
            (Version::new("0.1.0").with_distance(3), "0.1.1-pre.3", "0.1.1-pre-3"),
            (
                Version::new("0.1.0")
                    .with_stage("alpha", None)
                    .with_distance(3),
                "0.1.0-alpha.2.pre.3",
                "0.1.0-alpha-2-pre-3",
            ),
            (
                Version::new("0.1.0")
                    .with_stage("beta", Some(2))
                    .with_distance(4),
                "0.1.0-beta.3.pre.4",
                "0.1.0-beta-3-pre-4",
            ),
        ];

        for (version, semver, pvp) in args {
            let options = |style| SerializeOptions {
                style: Some(style),
                bump: true,
                ..Default::default()
            };
            assert_eq!(semver, serialize(&version, options(Style::SemVer)));
            assert_eq!(pvp, serialize(&version, options(Style::Pvp)));
        }
    }

    #[test]
    fn test_serialize_metadata() {
        let tagged = Version::new("0.1.0").with_stage("a", Some(1)).with_commit("abc");
        let distant = Version::new("0.1.0").with_distance(1).with_commit("abc");
        let with_tagged_metadata = distant.clone().with_tagged_metadata("def");

        // (version, metadata, style, expected)
        let args = [
            (&tagged, None, Style::Pep440, "0.1.0a1"),
            (&tagged, Some(true), Style::Pep440, "0.1.0a1+abc"),
            (&tagged, Some(false), Style::Pep440, "0.1.0a1"),
            (&distant, None, Style::Pep440, "0.1.0.post1.dev0+abc"),
            (&distant, Some(true), Style::Pep440, "0.1.0.post1.dev0+abc"),
            (&distant, Some(false), Style::Pep440, "0.1.0.post1.dev0"),
            (&tagged, None, Style::SemVer, "0.1.0-a.1"),
            (&tagged, Some(true), Style::SemVer, "0.1.0-a.1+abc"),
            (&distant, None, Style::SemVer, "0.1.0-post.1+abc"),
            (&distant, Some(false), Style::SemVer, "0.1.0-post.1"),
            (&tagged, None, Style::Pvp, "0.1.0-a-1"),
            (&tagged, Some(true), Style::Pvp, "0.1.0-a-1-abc"),
            (&distant, None, Style::Pvp, "0.1.0-post-1-abc"),
            (&distant, Some(false), Style::Pvp, "0.1.0-post-1"),
        ];
        for (version, metadata, style, expected) in args {
            let options = SerializeOptions {
                metadata,
                style: Some(style),
                ..Default::default()
            };
            assert_eq!(expected, serialize(version, options));
        }

        for (style, expected) in [
            (Style::Pep440, "0.1.0.post1.dev0+def.abc"),
            (Style::SemVer, "0.1.0-post.1+def.abc"),
            (Style::Pvp, "0.1.0-post-1-def-abc"),
        ] {
            let options = SerializeOptions {
                style: Some(style),
                tagged_metadata: true,
                ..Default::default()
            };
            assert_eq!(expected, serialize(&with_tagged_metadata, options));
        }
    }

    #[test]
    fn test_serialize_dirty() {
        let dirty = Version::new("0.1.0").with_dirty(true);
        let clean = Version::new("0.1.0").with_dirty(false);

        for (style, suffix) in [
            (Style::Pep440, "+dirty"),
            (Style::SemVer, "+dirty"),
            (Style::Pvp, "-dirty"),
        ] {
            let options = |metadata, show_dirty| SerializeOptions {
                metadata,
                dirty: show_dirty,
                style: Some(style),
                ..Default::default()
            };
            let with_dirty = format!("0.1.0{suffix}");

            assert_eq!("0.1.0", serialize(&dirty, options(None, false)));
            assert_eq!(with_dirty, serialize(&dirty, options(None, true)));
            assert_eq!("0.1.0", serialize(&clean, options(None, false)));
            assert_eq!("0.1.0", serialize(&clean, options(None, true)));
            assert_eq!("0.1.0", serialize(&dirty, options(Some(true), false)));
            assert_eq!(with_dirty, serialize(&dirty, options(Some(true), true)));
            assert_eq!("0.1.0", serialize(&dirty, options(Some(false), false)));
            assert_eq!("0.1.0", serialize(&dirty, options(Some(false), true)));
        }
    }

    #[test]
    fn test_serialize_commit_prefix() {
        let v = Version::new("0.1.0").with_distance(1).with_commit("abc");
        let options = SerializeOptions {
            commit_prefix: Some("g"),
            ..Default::default()
        };
        assert_eq!("0.1.0.post1.dev0+gabc", serialize(&v, options));
    }

    #[test]
    fn test_serialize_format() {
        let format =
            "{base},{stage},{revision},{distance},{commit},{dirty},{branch},{branch_escaped},{timestamp}";
        let options = SerializeOptions {
            format: Some(format),
            ..Default::default()
        };
        assert_eq!(
            "0.1.0,,,0,,clean,,,",
            serialize(&Version::new("0.1.0"), options.clone())
        );

        let v = Version::new("1")
            .with_stage("a", Some(2))
            .with_distance(3)
            .with_commit("abc")
            .with_dirty(true)
            .with_branch("a/b")
            .with_timestamp(Utc.with_ymd_and_hms(2001, 2, 3, 4, 5, 6).unwrap());
        assert_eq!(
            "1,a,2,3,abc,dirty,a/b,ab,20010203040506",
            serialize(&v, options)
        );

        let options = SerializeOptions {
            format: Some("{branch_escaped}|{major}.{minor}.{patch}|{epoch}"),
            escape_with: Some("-"),
            ..Default::default()
        };
        assert_eq!("a-b|1..|", serialize(&v, options));

        let invalid = SerializeOptions {
            format: Some("v{base}"),
            style: Some(Style::Pep440),
            ..Default::default()
        };
        assert!(matches!(
            Version::new("0.1.0").serialize(&invalid),
            Err(Error::Style(StyleError::NonConforming { .. }))
        ));

        let unknown = SerializeOptions {
            format: Some("{nope}"),
            ..Default::default()
        };
        assert!(Version::new("0.1.0").serialize(&unknown).is_err());
    }

    #[test]
    fn test_serialize_format_bumps() {
        let options = SerializeOptions {
            format: Some("{base}+{distance}"),
            bump: true,
            ..Default::default()
        };
        assert_eq!(
            "0.1.1+3",
            serialize(&Version::new("0.1.0").with_distance(3), options)
        );
    }

    #[test]
    fn test_serialize_with() {
        let format = |v: &Version| {
            format!(
                "{},{},{}",
                v.base,
                v.stage.as_deref().unwrap_or("None"),
                v.revision.map_or("None".to_owned(), |r| r.to_string())
            )
        };
        assert_eq!(
            Ok("0.1.0,None,None".to_owned()),
            Version::new("0.1.0").serialize_with(format, None)
        );
        assert_eq!(
            Ok("1,a,2".to_owned()),
            Version::new("1")
                .with_stage("a", Some(2))
                .serialize_with(format, None)
        );
        assert!(Version::new("0.1.0")
            .serialize_with(|v| format!("v{}", v.base), Some(Style::Pep440))
            .is_err());
    }

    #[test]
    fn test_serialize_semver_leading_zeroes() {
        let options = || SerializeOptions {
            style: Some(Style::SemVer),
            ..Default::default()
        };
        assert!(Version::new("0.1.0--").serialize(&options()).is_ok());
        assert!(Version::new("0.1.0--.-").serialize(&options()).is_ok());
        assert!(Version::new("00.0.0").serialize(&options()).is_err());
        assert!(Version::new("0.01.0").serialize(&options()).is_err());
        assert!(Version::new("0.1.0-alpha.02").serialize(&options()).is_err());
        assert!(Version::new("0.1.0-alpha.02a").serialize(&options()).is_ok());
        assert!(Version::new("0.1.0-.").serialize(&options()).is_err());
        assert!(Version::new("0.1.0-a.").serialize(&options()).is_err());
        assert!(Version::new("0.1.0-.a").serialize(&options()).is_err());
    }

    #[test]
    fn test_bump() {
        let bump = |v: Version, index| serialize(&v.bump(index, 1).unwrap(), Default::default());
        assert_eq!("1.2.4", bump(Version::new("1.2.3"), -1));
        assert_eq!("1.3.0", bump(Version::new("1.2.3"), -2));
        assert_eq!("2.0.0", bump(Version::new("1.2.3"), 0));
        assert_eq!("1.2.3a2", bump(Version::new("1.2.3").with_stage("a", None), -1));
        assert_eq!("1.2.3a5", bump(Version::new("1.2.3").with_stage("a", Some(4)), -1));

        let tagged = Version::new("1.2.3");
        assert_eq!("1.2.4", bump(tagged.clone(), -1));
        assert_eq!(
            "1.2.3",
            serialize(&tagged.bump_smart(-1, 1).unwrap(), Default::default())
        );
        let bumping = SerializeOptions {
            bump: true,
            ..Default::default()
        };
        assert_eq!("1.2.3", serialize(&tagged, bumping.clone()));

        let distant = Version::new("1.2.3").with_distance(5);
        assert_eq!("1.2.4.post5.dev0", bump(distant.clone(), -1));
        assert_eq!(
            "1.2.4.dev5",
            serialize(&distant.bump_smart(-1, 1).unwrap(), Default::default())
        );
        assert_eq!("1.2.4.dev5", serialize(&distant, bumping));
    }

    #[test]
    fn test_bump_non_numeric() {
        let options = SerializeOptions {
            bump: true,
            ..Default::default()
        };
        assert!(matches!(
            Version::new("foo").with_distance(1).serialize(&options),
            Err(Error::Bump(BumpError::NonNumericComponent { .. }))
        ));
    }

    #[rstest]
    #[case("1.2.3", Version::new("1.2.3"))]
    #[case("1.2.3a", Version::new("1.2.3").with_stage("a", None))]
    #[case("1.2.3a3", Version::new("1.2.3").with_stage("a", Some(3)))]
    #[case("1.2.3+7", Version::new("1.2.3").with_distance(7))]
    #[case("1.2.3+d7", Version::new("1.2.3").with_distance(7))]
    #[case("1.2.3+b6a9020", Version::new("1.2.3").with_commit("b6a9020"))]
    #[case("1.2.3+gb6a9020", Version::new("1.2.3").with_commit("b6a9020"))]
    #[case("1.2.3+dirty", Version::new("1.2.3").with_dirty(true))]
    #[case("1.2.3+clean", Version::new("1.2.3").with_dirty(false))]
    #[case(
        "1.2.3a3+7.b6a9020.dirty",
        Version::new("1.2.3").with_stage("a", Some(3)).with_distance(7).with_commit("b6a9020").with_dirty(true)
    )]
    #[case(
        "1.2.3a3+7.b6a9020.dirty.linux",
        Version::new("1.2.3")
            .with_stage("a", Some(3))
            .with_distance(7)
            .with_commit("b6a9020")
            .with_dirty(true)
            .with_tagged_metadata("linux")
    )]
    #[case("2!1.2.3", Version::new("1.2.3").with_epoch(2))]
    #[case(
        "2!1.2.3a3+d7.gb6a9020.dirty.linux",
        Version::new("1.2.3")
            .with_stage("a", Some(3))
            .with_distance(7)
            .with_commit("b6a9020")
            .with_dirty(true)
            .with_tagged_metadata("linux")
            .with_epoch(2)
    )]
    #[case("foo", Version::new("foo"))]
    #[case("1.2.3.dev5", Version::new("1.2.3").with_distance(5))]
    #[case("1.2.3.post4", Version::new("1.2.3").with_stage("post", Some(4)))]
    #[case("1.2.3.post4+d6", Version::new("1.2.3").with_stage("post", Some(4)).with_distance(6))]
    #[case("1.2.3.post4.dev5", Version::new("1.2.3").with_distance(4))]
    #[case("1.2.3.post4.dev5+d6", Version::new("1.2.3").with_distance(10))]
    #[case("1.2.3.post4.dev5.blah6", Version::new("1.2.3.post4.dev5.blah6"))]
    #[case(
        "1.2.3.dev18446744073709551615+d1",
        Version::new("1.2.3.dev18446744073709551615+d1")
    )]
    fn test_parse(#[case] text: &str, #[case] expected: Version) {
        assert_eq!(expected, Version::parse(text));
    }

    #[rstest]
    #[case(Version::new("0.1.0"))]
    #[case(Version::new("1.2.3").with_stage("rc", Some(1)))]
    #[case(Version::new("1.2.3").with_epoch(3))]
    #[case(Version::new("1.2.3").with_distance(3).with_commit("abc1234").with_dirty(true))]
    #[case(Version::new("1.2.3").with_distance(3).with_commit("abc1234"))]
    #[case(Version::new("1.2.3").with_tagged_metadata("Linux").with_dirty(true))]
    #[case(
        Version::new("1.2.3")
            .with_distance(3)
            .with_commit("abc1234")
            .with_tagged_metadata("Linux")
    )]
    #[case(Version::new("1.2.3").with_epoch(2).with_distance(5).with_commit("abc1234"))]
    fn test_parse_round_trip(#[case] version: Version) {
        let serialized = serialize(
            &version,
            SerializeOptions {
                dirty: true,
                tagged_metadata: true,
                ..Default::default()
            },
        );
        assert_eq!(version, Version::parse(&serialized));
    }

    #[test]
    fn test_parse_clean_is_unset() {
        // A clean tree adds nothing to the metadata.
        let version = Version::new("1.2.3").with_distance(3).with_commit("abc1234").with_dirty(false);
        let options = SerializeOptions {
            dirty: true,
            ..Default::default()
        };
        let serialized = serialize(&version, options);
        assert_eq!("1.2.3.post3.dev0+abc1234", serialized);
        assert_eq!(
            Version {
                dirty: None,
                ..version
            },
            Version::parse(&serialized)
        );
        assert_eq!(Some(false), Version::parse("1.2.3+d3.gabc1234.clean").dirty);
    }

    #[test]
    fn test_overflow() {
        assert_eq!(
            Err(BumpError::Overflow {
                value: u64::MAX,
                increment: 1
            }),
            bump_version("18446744073709551615", 0, 1)
        );
        assert_eq!(
            Ok("18446744073709551615.0".to_owned()),
            bump_version("18446744073709551614.7", 0, 1)
        );
        assert!(matches!(
            Version::new("1").with_stage("rc", Some(u64::MAX)).bump(-1, 1),
            Err(BumpError::Overflow { .. })
        ));

        let version = Version::new("1").with_stage("dev", Some(u64::MAX)).with_distance(1);
        assert!(matches!(
            version.serialize(&SerializeOptions::default()),
            Err(Error::Bump(BumpError::Overflow { .. }))
        ));
        let options = SerializeOptions {
            bump: true,
            ..Default::default()
        };
        assert!(matches!(
            Version::new("1")
                .with_stage("dev", Some(1))
                .with_distance(u64::MAX)
                .serialize(&options),
            Err(Error::Bump(BumpError::Overflow { .. }))
        ));
    }

    #[test]
    fn test_bump_version() {
        let args = [
            ("1.2.3", -1, 1, "1.2.4"),
            ("1.2.3", 0, 1, "2.0.0"),
            ("1.2.3", 1, 1, "1.3.0"),
            ("1.2.3", 2, 1, "1.2.4"),
            ("1.2.3", -2, 1, "1.3.0"),
            ("1.2.3", -3, 1, "2.0.0"),
            ("1.2.3", -1, 3, "1.2.6"),
            ("1.2.3", 0, 3, "4.0.0"),
            ("1.2.3", 1, 3, "1.5.0"),
            ("1.2.3", 2, 3, "1.2.6"),
            ("1.2.3", -2, 3, "1.5.0"),
            ("1.2.3", -3, 3, "4.0.0"),
        ];
        for (base, index, increment, expected) in args {
            assert_eq!(Ok(expected.to_owned()), bump_version(base, index, increment));
        }

        assert!(matches!(
            bump_version("1.2.3", 3, 1),
            Err(BumpError::IndexOutOfRange { index: 3, len: 3, .. })
        ));
        assert!(matches!(
            bump_version("1.2.3", -4, 1),
            Err(BumpError::IndexOutOfRange { index: -4, .. })
        ));
        assert!(matches!(
            bump_version("foo", 0, 1),
            Err(BumpError::NonNumericComponent { .. })
        ));
    }

    #[test]
    fn test_concern_message() {
        assert!(Concern::ShallowRepository
            .to_string()
            .contains("shallow repository"));
    }
}
