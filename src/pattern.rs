use crate::error::PatternError;
use core::{
    fmt::{self, Display},
    str::FromStr,
};
use regex::Regex;
use tracing::debug;

/// The regular expression used when no pattern is given.
///
/// It accepts tags like `v1.2.3`, `v1!2.0`, `v0.1.0rc5`, `v0.1.0-beta.2` and `v1.0.0+linux`, and
/// exposes the named groups `epoch`, `base`, `stage`, `revision` and `tagged_metadata`.
pub const VERSION_SOURCE_PATTERN: &str = r"(?x)
    ^v((?P<epoch>\d+)!)?(?P<base>\d+(\.\d+)*)                 # v1.2.3 or v1!2000.1.2
    ([-._]?((?P<stage>[a-zA-Z]+)[-._]?(?P<revision>\d+)?))?   # b0
    (\+(?P<tagged_metadata>.+))?$                             # +linux
";

/// Named presets that can be used instead of a custom regular expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pattern {
    /// [`VERSION_SOURCE_PATTERN`]: tags must start with `v`.
    Default,
    /// Like [`Pattern::Default`], but the leading `v` is optional.
    DefaultUnprefixed,
}

impl Pattern {
    /// All presets, in the order they are documented.
    pub const ALL: [Pattern; 2] = [Pattern::Default, Pattern::DefaultUnprefixed];

    /// The name used to select this preset on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            Pattern::Default => "default",
            Pattern::DefaultUnprefixed => "default-unprefixed",
        }
    }

    /// Returns the regular expression for this preset, with `prefix` inserted after the start
    /// anchor if given.
    ///
    /// ```
    /// use dynver::Pattern;
    ///
    /// assert!(Pattern::DefaultUnprefixed.regex(None).contains("^v?"));
    /// assert!(Pattern::Default.regex(Some("foo-")).contains("^foo-v"));
    /// ```
    pub fn regex(&self, prefix: Option<&str>) -> String {
        let regex = match self {
            Pattern::Default => VERSION_SOURCE_PATTERN.to_owned(),
            Pattern::DefaultUnprefixed => VERSION_SOURCE_PATTERN.replacen("^v", "^v?", 1),
        };
        apply_prefix(&regex, prefix)
    }

    /// Resolves a user-supplied pattern into a regular expression.
    ///
    /// A pattern that contains a `base` capture group is used as-is (plus `prefix`). Otherwise it
    /// must be the name of a preset.
    ///
    /// # Errors
    ///
    /// - Returns [`PatternError::NotPatternOrPreset`] if the pattern has no `base` group and is not
    ///   a preset name.
    pub fn parse(pattern: &str, prefix: Option<&str>) -> Result<String, PatternError> {
        if pattern.contains("?P<base>") || pattern.contains("?<base>") {
            return Ok(apply_prefix(pattern, prefix));
        }
        pattern
            .parse::<Pattern>()
            .map(|preset| preset.regex(prefix))
            .map_err(|_| PatternError::NotPatternOrPreset {
                pattern: pattern.to_owned(),
            })
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| PatternError::NotPatternOrPreset {
                pattern: s.to_owned(),
            })
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn apply_prefix(pattern: &str, prefix: Option<&str>) -> String {
    match prefix {
        Some(prefix) if pattern.contains('^') => pattern.replacen('^', &format!("^{prefix}"), 1),
        _ => pattern.to_owned(),
    }
}

/// The outcome of matching a pattern against a list of tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPattern {
    /// The tag that was accepted.
    pub tag: String,
    /// The `base` group.
    pub base: String,
    /// The `stage` group and the parsed `revision` group, if there was a stage.
    pub stage: Option<(String, Option<u64>)>,
    /// Tags that were scanned and rejected before `tag`. Since candidates are ordered newest
    /// first, these are newer than the matched tag.
    pub newer_unmatched_tags: Vec<String>,
    /// The `tagged_metadata` group.
    pub tagged_metadata: Option<String>,
    /// The parsed `epoch` group.
    pub epoch: Option<u64>,
}

/// Finds the first candidate matched by `pattern`.
///
/// `pattern` may be a regular expression or a preset name (see [`Pattern::parse`]). `sources` must
/// be ordered from most to least preferred. With `latest_source`, only the first candidate is
/// considered.
///
/// # Errors
///
/// - [`PatternError::MissingBaseGroup`] if a candidate matches but the pattern has no `base`
///   group.
/// - [`PatternError::LatestTagMismatch`] / [`PatternError::NoMatch`] if nothing matches.
pub fn match_version_pattern<S: AsRef<str>>(
    pattern: &str,
    sources: &[S],
    latest_source: bool,
    prefix: Option<&str>,
) -> Result<MatchedPattern, PatternError> {
    let pattern = Pattern::parse(pattern, prefix)?;
    let regex = Regex::new(&pattern).map_err(|e| PatternError::InvalidRegex {
        message: e.to_string(),
    })?;
    let has_base = regex.capture_names().any(|name| name == Some("base"));
    let limit = if latest_source { 1 } else { sources.len() };

    let mut newer_unmatched_tags = Vec::new();
    for source in sources.iter().take(limit) {
        let source = source.as_ref();
        let Some(captures) = regex.captures(source) else {
            newer_unmatched_tags.push(source.to_owned());
            continue;
        };
        if !has_base {
            return Err(PatternError::MissingBaseGroup { pattern });
        }
        let group = |name: &str| {
            captures
                .name(name)
                .map(|m| m.as_str())
                .filter(|text| !text.is_empty())
        };
        let Some(base) = group("base") else {
            newer_unmatched_tags.push(source.to_owned());
            continue;
        };

        let stage = match group("stage") {
            Some(stage) => Some((
                stage.to_owned(),
                group("revision")
                    .map(|revision| parse_number("revision", revision))
                    .transpose()?,
            )),
            None => None,
        };
        let epoch = group("epoch")
            .map(|epoch| parse_number("epoch", epoch))
            .transpose()?;

        debug!(tag = source, unmatched = ?newer_unmatched_tags, "Pattern matched");
        return Ok(MatchedPattern {
            tag: source.to_owned(),
            base: base.to_owned(),
            stage,
            newer_unmatched_tags,
            tagged_metadata: group("tagged_metadata").map(str::to_owned),
            epoch,
        });
    }

    match sources.first() {
        Some(latest) if latest_source => Err(PatternError::LatestTagMismatch {
            pattern,
            tag: latest.as_ref().to_owned(),
        }),
        _ => Err(PatternError::NoMatch {
            pattern,
            tags: sources.iter().map(|s| s.as_ref().to_owned()).collect(),
        }),
    }
}

fn parse_number(group: &'static str, value: &str) -> Result<u64, PatternError> {
    value.parse().map_err(|_| PatternError::InvalidNumber {
        group,
        value: value.to_owned(),
    })
}
