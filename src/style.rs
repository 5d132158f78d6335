use crate::error::StyleError;
use core::{
    fmt::{self, Display},
    str::FromStr,
};
use regex::Regex;
use std::sync::LazyLock;

static PEP440_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d+!)?\d+(\.\d+)*((a|b|rc)\d+)?(\.post\d+)?(\.dev\d+)?(\+([a-zA-Z0-9]|[a-zA-Z0-9]{2}|[a-zA-Z0-9][a-zA-Z0-9.]+[a-zA-Z0-9]))?$",
    )
    .unwrap()
});

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\d+\.\d+\.\d+(\-[a-zA-Z0-9\-]+(\.[a-zA-Z0-9\-]+)*)?(\+[a-zA-Z0-9\-]+(\.[a-zA-Z0-9\-]+)*)?$",
    )
    .unwrap()
});

static PVP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*(-[a-zA-Z0-9]+)*$").unwrap());

static LEADING_ZERO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^0[0-9]+$").unwrap());

/// A canonical version grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Style {
    /// [PEP 440](https://peps.python.org/pep-0440/), e.g. `1!0.1.0a2.post3.dev0+abc`.
    #[default]
    Pep440,
    /// [Semantic Versioning](https://semver.org/), e.g. `0.1.0-alpha.2.post.3+abc`.
    SemVer,
    /// [Haskell PVP](https://pvp.haskell.org/), e.g. `0.1.0-alpha-2-post-3-abc`.
    Pvp,
}

impl Style {
    /// All styles.
    pub const ALL: [Style; 3] = [Style::Pep440, Style::SemVer, Style::Pvp];

    /// The identifier used on the command line: `pep440`, `semver` or `pvp`.
    pub fn name(&self) -> &'static str {
        match self {
            Style::Pep440 => "pep440",
            Style::SemVer => "semver",
            Style::Pvp => "pvp",
        }
    }

    /// The name used in error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            Style::Pep440 => "PEP 440",
            Style::SemVer => "Semantic Versioning",
            Style::Pvp => "PVP",
        }
    }

    /// Checks `version` against this style's grammar. See [`check_version`].
    pub fn check(&self, version: &str) -> Result<(), StyleError> {
        let conforms = match self {
            Style::Pep440 => PEP440_RE.is_match(version),
            Style::SemVer => {
                SEMVER_RE.is_match(version) && {
                    let release_and_pre = version.split('+').next().unwrap_or_default();
                    !release_and_pre
                        .split(['.', '-'])
                        .any(|identifier| LEADING_ZERO_RE.is_match(identifier))
                }
            }
            Style::Pvp => PVP_RE.is_match(version),
        };

        if conforms {
            Ok(())
        } else {
            Err(StyleError::NonConforming {
                version: version.to_owned(),
                style_name: self.display_name(),
            })
        }
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Style::ALL
            .into_iter()
            .find(|style| style.name() == s)
            .ok_or_else(|| format!("Unknown style '{s}'. Expected one of: pep440, semver, pvp"))
    }
}

impl Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Checks whether a version string conforms to a style.
///
/// SemVer additionally forbids leading zeros in numeric identifiers of the release and
/// prerelease parts.
///
/// ```
/// use dynver::{check_version, Style};
///
/// assert!(check_version("0.01.0", Style::Pep440).is_ok());
/// assert!(check_version("0.01.0", Style::SemVer).is_err());
/// ```
///
/// # Errors
///
/// Returns [`StyleError::NonConforming`] naming the version and the style.
pub fn check_version(version: &str, style: Style) -> Result<(), StyleError> {
    style.check(version)
}

/// Normalizes a prerelease stage for PEP 440: lowercased, with `alpha`, `beta`, `c`, `pre` and
/// `preview` mapped to their canonical spellings.
fn normalize_pep440_stage(stage: &str) -> String {
    let stage = stage.to_lowercase();
    match stage.as_str() {
        "alpha" => "a".to_owned(),
        "beta" => "b".to_owned(),
        "c" | "pre" | "preview" => "rc".to_owned(),
        _ => stage,
    }
}

/// Serializes version parts as PEP 440.
///
/// A stage without a revision gets revision 0, since PEP 440 requires one.
///
/// ```
/// use dynver::serialize_pep440;
///
/// assert_eq!(
///     Ok("0!1.2.3a4.post5.dev6+foo.bar".to_owned()),
///     serialize_pep440("1.2.3", Some("alpha"), Some(4), Some(5), Some(6), Some(0), &["foo", "bar"])
/// );
/// ```
///
/// # Errors
///
/// Returns [`StyleError::NonConforming`] if the result is not valid PEP 440.
pub fn serialize_pep440(
    base: &str,
    stage: Option<&str>,
    revision: Option<u64>,
    post: Option<u64>,
    dev: Option<u64>,
    epoch: Option<u64>,
    metadata: &[&str],
) -> Result<String, StyleError> {
    let mut out = String::new();

    if let Some(epoch) = epoch {
        out.push_str(&format!("{epoch}!"));
    }
    out.push_str(base);
    if let Some(stage) = stage {
        out.push_str(&normalize_pep440_stage(stage));
        out.push_str(&revision.unwrap_or(0).to_string());
    }
    if let Some(post) = post {
        out.push_str(&format!(".post{post}"));
    }
    if let Some(dev) = dev {
        out.push_str(&format!(".dev{dev}"));
    }
    if !metadata.is_empty() {
        out.push('+');
        out.push_str(&metadata.join("."));
    }

    Style::Pep440.check(&out)?;
    Ok(out)
}

/// Serializes version parts as Semantic Versioning: `base[-pre.parts][+metadata.parts]`.
///
/// # Errors
///
/// Returns [`StyleError::NonConforming`] if the result is not valid SemVer.
pub fn serialize_semver(base: &str, pre: &[&str], metadata: &[&str]) -> Result<String, StyleError> {
    let mut out = base.to_owned();
    if !pre.is_empty() {
        out.push('-');
        out.push_str(&pre.join("."));
    }
    if !metadata.is_empty() {
        out.push('+');
        out.push_str(&metadata.join("."));
    }

    Style::SemVer.check(&out)?;
    Ok(out)
}

/// Serializes version parts as PVP: `base[-metadata-parts]`.
///
/// # Errors
///
/// Returns [`StyleError::NonConforming`] if the result is not valid PVP.
pub fn serialize_pvp(base: &str, metadata: &[&str]) -> Result<String, StyleError> {
    let mut out = base.to_owned();
    if !metadata.is_empty() {
        out.push('-');
        out.push_str(&metadata.join("-"));
    }

    Style::Pvp.check(&out)?;
    Ok(out)
}
