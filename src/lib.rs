//! # dynver
//!
//! Dynamic versions from version control tags.
//!
//! dynver finds the most recent tag that looks like a version, counts the commits made since, and
//! serializes the result in one of several version grammars. It is meant for builds that should
//! not hard-code their version in a file.
//!
//! ## Examples
//!
//! Derive a version from whatever version control system the current directory uses:
//!
//! ```no_run
//! use dynver::prelude::*;
//!
//! let version = Version::from_any_vcs(&DeriveOptions::default()).unwrap();
//! println!("{}", version.serialize(&SerializeOptions::default()).unwrap());
//! ```
//!
//! Or build and serialize one by hand:
//!
//! ```
//! use dynver::prelude::*;
//!
//! let version = Version::new("0.1.0").with_distance(1).with_commit("abc1234");
//! assert_eq!(
//!     "0.1.0.post1.dev0+abc1234",
//!     version.serialize(&SerializeOptions::default()).unwrap()
//! );
//!
//! let options = SerializeOptions {
//!     format: Some("v{base}+{distance}.{commit}"),
//!     ..Default::default()
//! };
//! assert_eq!("v0.1.0+1.abc1234", version.serialize(&options).unwrap());
//! ```
//!
//! ## Important Terms
//!
//! - **Base**: The release part of a version, like `1.2.3`. It comes from the `base` group of the
//!   tag pattern.
//! - **Stage**: A prerelease label with an optional revision number, like `rc` and `1` in
//!   `1.2.3rc1`.
//! - **Distance**: The number of commits since the matched tag. A version with a distance of zero
//!   is a release.
//! - **Dirty**: Whether the working tree has uncommitted changes.
//!
//! ## Version Control Systems
//!
//! Git, Mercurial, Darcs, Subversion, Bazaar, Fossil, and Pijul are supported by running their
//! command line programs, which must be on `PATH`. Git and Mercurial archives are also understood
//! through `.git_archival.json` and `.hg_archival.txt`. See [`Vcs`].
//!
//! ## Styles
//!
//! | Style | Example |
//! |---|---|
//! | [PEP 440](https://peps.python.org/pep-0440/) | `1!0.1.0rc2.post3.dev0+abc1234` |
//! | [Semantic Versioning](https://semver.org/) | `0.1.0-rc.2.post.3+abc1234` |
//! | [Haskell PVP](https://pvp.haskell.org/) | `0.1.0-rc-2-post-3-abc1234` |
//!
//! ## Templates
//!
//! A template replaces the built-in layout. The following placeholders are available:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{base}` | The base, bumped when requested |
//! | `{stage}` | The stage label |
//! | `{revision}` | The stage revision |
//! | `{distance}` | Commits since the tag |
//! | `{commit}` | The commit id, with its prefix |
//! | `{dirty}` | `dirty` or `clean` |
//! | `{tagged_metadata}` | Metadata captured from the tag |
//! | `{epoch}` | The PEP 440 epoch |
//! | `{branch}` | The branch name |
//! | `{branch_escaped}` | The branch name without non-alphanumeric characters |
//! | `{timestamp}` | The commit time as `%Y%m%d%H%M%S` in UTC |
//! | `{major}`, `{minor}`, `{patch}` | The first three base components |
//!
//! ## Logging
//!
//! Every external command and the tags considered are reported through [`tracing`] at the debug
//! level. Install a subscriber to see them.
//!
//! ## Prelude
//!
//! dynver provides a prelude module for convenience. Use it with:
//!
//! ```
//! use dynver::prelude::*;
//! ```

mod error;
mod format;
mod lookup;
mod pattern;
mod style;
mod vcs;
mod version;

pub use crate::error::{BumpError, Error, PatternError, StyleError, VcsError};
pub use crate::format::{Format, Placeholder};
pub use crate::lookup::{dev_mode, get_version, VersionSources, DEV_MODE_ENV};
pub use crate::pattern::{match_version_pattern, MatchedPattern, Pattern, VERSION_SOURCE_PATTERN};
pub use crate::style::{check_version, serialize_pep440, serialize_pvp, serialize_semver, Style};
pub use crate::vcs::{detect_vcs, detect_vcs_from_archival, DeriveOptions, Vcs};
pub use crate::version::{bump_version, Concern, SerializeOptions, Version};

pub mod prelude {
    //! Everything needed to derive, check, and serialize versions.
    #[doc(no_inline)]
    pub use crate::check_version;
    #[doc(no_inline)]
    pub use crate::Concern;
    #[doc(no_inline)]
    pub use crate::DeriveOptions;
    #[doc(no_inline)]
    pub use crate::Error;
    #[doc(no_inline)]
    pub use crate::Pattern;
    #[doc(no_inline)]
    pub use crate::SerializeOptions;
    #[doc(no_inline)]
    pub use crate::Style;
    #[doc(no_inline)]
    pub use crate::Vcs;
    #[doc(no_inline)]
    pub use crate::VcsError;
    #[doc(no_inline)]
    pub use crate::Version;
}
