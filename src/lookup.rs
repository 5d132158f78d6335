//! Picking a version for a named package from several sources, for callers that want a sensible
//! default without deriving from version control on every run.

use crate::version::Version;
use std::{env, ffi::OsStr};
use tracing::debug;

/// Environment variable that marks a development checkout. When set (to anything but an empty
/// string), callers usually want a live derivation as their first choice.
pub const DEV_MODE_ENV: &str = "DYNVER_DEV";

/// Whether [`DEV_MODE_ENV`] is set.
pub fn dev_mode() -> bool {
    is_dev_mode(env::var_os(DEV_MODE_ENV).as_deref())
}

fn is_dev_mode(value: Option<&OsStr>) -> bool {
    value.is_some_and(|value| !value.is_empty())
}

type Choice<'a> = Box<dyn Fn() -> Option<Version> + 'a>;
type Installed<'a> = Box<dyn Fn(&str) -> Option<String> + 'a>;

/// The places a version may come from, tried in order:
///
/// 1. the first choice callback,
/// 2. the installed package's metadata, through the injected lookup,
/// 3. the third choice callback,
/// 4. the fallback.
///
/// A candidate that matches an entry of the ignore list is skipped. The fallback is never
/// ignored.
pub struct VersionSources<'a> {
    first_choice: Option<Choice<'a>>,
    installed: Option<Installed<'a>>,
    third_choice: Option<Choice<'a>>,
    fallback: Version,
    ignore: Vec<Version>,
}

impl Default for VersionSources<'_> {
    fn default() -> Self {
        Self {
            first_choice: None,
            installed: None,
            third_choice: None,
            fallback: Version::new("0.0.0"),
            ignore: Vec::new(),
        }
    }
}

impl<'a> VersionSources<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_first_choice(mut self, choice: impl Fn() -> Option<Version> + 'a) -> Self {
        self.first_choice = Some(Box::new(choice));
        self
    }

    /// Like [`VersionSources::with_first_choice`], but only in a development checkout (see
    /// [`dev_mode`]). Installed metadata wins otherwise.
    pub fn with_dev_first_choice(self, choice: impl Fn() -> Option<Version> + 'a) -> Self {
        self.with_first_choice_if(dev_mode(), choice)
    }

    fn with_first_choice_if(self, enabled: bool, choice: impl Fn() -> Option<Version> + 'a) -> Self {
        if enabled {
            self.with_first_choice(choice)
        } else {
            self
        }
    }

    /// Looks up the version string recorded for an installed package by name.
    pub fn with_installed(mut self, lookup: impl Fn(&str) -> Option<String> + 'a) -> Self {
        self.installed = Some(Box::new(lookup));
        self
    }

    pub fn with_third_choice(mut self, choice: impl Fn() -> Option<Version> + 'a) -> Self {
        self.third_choice = Some(Box::new(choice));
        self
    }

    pub fn with_fallback(mut self, fallback: Version) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_ignore(mut self, ignore: impl IntoIterator<Item = Version>) -> Self {
        self.ignore.extend(ignore);
        self
    }

    /// Resolves the version of `name`. Later sources are only consulted when the earlier ones
    /// yield nothing.
    pub fn resolve(&self, name: &str) -> Version {
        if let Some(version) = self.accept(name, "first choice", || {
            self.first_choice.as_ref().and_then(|choice| choice())
        }) {
            return version;
        }
        if let Some(version) = self.accept(name, "installed", || {
            self.installed
                .as_ref()
                .and_then(|lookup| lookup(name))
                .map(|version| Version::parse(&version))
        }) {
            return version;
        }
        if let Some(version) = self.accept(name, "third choice", || {
            self.third_choice.as_ref().and_then(|choice| choice())
        }) {
            return version;
        }
        debug!(name, fallback = %self.fallback, "Using fallback version");
        self.fallback.clone()
    }

    fn accept(
        &self,
        name: &str,
        source: &str,
        candidate: impl FnOnce() -> Option<Version>,
    ) -> Option<Version> {
        let version = candidate()?;
        if let Some(ignored) = self.ignore.iter().find(|ignored| matches_partial(&version, ignored)) {
            debug!(name, source, %version, %ignored, "Ignoring version");
            return None;
        }
        debug!(name, source, %version, "Found version");
        Some(version)
    }
}

/// Returns the version of `name`: the first choice if it yields one, then the installed
/// package's version, then the third choice, then `fallback`. Candidates matching `ignore` are
/// skipped.
///
/// No installed-package lookup is configured here; use [`VersionSources::with_installed`] to
/// supply one.
pub fn get_version(
    name: &str,
    first_choice: Option<&dyn Fn() -> Option<Version>>,
    third_choice: Option<&dyn Fn() -> Option<Version>>,
    fallback: Version,
    ignore: &[Version],
) -> Version {
    let mut sources = VersionSources::new()
        .with_fallback(fallback)
        .with_ignore(ignore.iter().cloned());
    if let Some(choice) = first_choice {
        sources = sources.with_first_choice(choice);
    }
    if let Some(choice) = third_choice {
        sources = sources.with_third_choice(choice);
    }
    sources.resolve(name)
}

/// Whether `version` agrees with `ignored` on every field `ignored` sets. A distance of 0 counts
/// as unset.
fn matches_partial(version: &Version, ignored: &Version) -> bool {
    fn agrees<T: PartialEq>(field: &Option<T>, ignored: &Option<T>) -> bool {
        ignored.is_none() || field == ignored
    }

    version.base == ignored.base
        && agrees(&version.stage, &ignored.stage)
        && agrees(&version.revision, &ignored.revision)
        && (ignored.distance == 0 || version.distance == ignored.distance)
        && agrees(&version.commit, &ignored.commit)
        && agrees(&version.dirty, &ignored.dirty)
        && agrees(&version.tagged_metadata, &ignored.tagged_metadata)
        && agrees(&version.epoch, &ignored.epoch)
        && agrees(&version.branch, &ignored.branch)
        && agrees(&version.timestamp, &ignored.timestamp)
}
