use std::path::PathBuf;

/// Errors raised while matching a tag pattern against candidate tags.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum PatternError {
    /// The pattern has no `base` group and is not the name of a known preset.
    #[error("The pattern does not contain the capture group '?P<base>' and is not a known preset like 'default'. Pattern: {pattern}")]
    NotPatternOrPreset {
        /// The offending pattern.
        pattern: String,
    },

    /// The pattern matched a candidate but does not define a `base` group at all.
    #[error("The pattern did not include required capture group 'base'. Pattern: {pattern}")]
    MissingBaseGroup {
        /// The offending pattern.
        pattern: String,
    },

    /// Latest-tag mode was requested and the latest tag did not match.
    #[error("The pattern did not match the latest tag '{tag}'. Pattern: {pattern}")]
    LatestTagMismatch {
        /// The pattern that was applied.
        pattern: String,
        /// The latest tag that was rejected.
        tag: String,
    },

    /// None of the candidates matched.
    #[error("The pattern did not match any tags. Pattern: {pattern}. Tags: {}", .tags.join(", "))]
    NoMatch {
        /// The pattern that was applied.
        pattern: String,
        /// Every candidate that was tried, in scan order.
        tags: Vec<String>,
    },

    /// The pattern is not a valid regular expression.
    #[error("The pattern is not a valid regular expression: {message}")]
    InvalidRegex {
        /// The regex engine's message.
        message: String,
    },

    /// A `revision` or `epoch` group captured something that is not a number.
    #[error("The {group} '{value}' is not a valid number")]
    InvalidNumber {
        /// Name of the capture group.
        group: &'static str,
        /// The captured text.
        value: String,
    },
}

/// Errors raised when a version string does not conform to a style, or a custom format template is
/// malformed.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum StyleError {
    /// The version does not follow the style's grammar.
    #[error("Version '{version}' does not conform to the {style_name} style")]
    NonConforming {
        /// The rejected version string.
        version: String,
        /// Human-readable name of the style.
        style_name: &'static str,
    },

    /// A format template refers to a placeholder that does not exist.
    #[error("Format contains invalid placeholder: '{placeholder}'")]
    UnknownPlaceholder {
        /// The placeholder name, without braces.
        placeholder: String,
    },

    /// A format template has a `{` without a matching `}` or a lone `}`.
    #[error("Format is invalid: {reason}")]
    InvalidFormat {
        /// What is wrong with the template.
        reason: &'static str,
    },
}

/// Errors raised while bumping a release segment.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone)]
pub enum BumpError {
    /// The index does not address a component of the base.
    #[error("Index {index} is out of range for base '{base}' with {len} component(s)")]
    IndexOutOfRange {
        /// The requested index.
        index: isize,
        /// The base that was being bumped.
        base: String,
        /// The number of components in the base.
        len: usize,
    },

    /// A component of the base is not a non-negative integer.
    #[error("Base '{base}' contains a component that is not a number: '{component}'")]
    NonNumericComponent {
        /// The base that was being bumped.
        base: String,
        /// The component that failed to parse.
        component: String,
    },

    /// Adding to a number would exceed `u64::MAX`.
    #[error("Adding {increment} to {value} overflows")]
    Overflow {
        /// The number being increased.
        value: u64,
        /// The amount added.
        increment: u64,
    },
}

impl BumpError {
    /// `value + increment`, or [`BumpError::Overflow`].
    pub(crate) fn checked_add(value: u64, increment: u64) -> Result<u64, Self> {
        value
            .checked_add(increment)
            .ok_or(BumpError::Overflow { value, increment })
    }
}

/// Errors raised while deriving a version from a version control system.
#[derive(thiserror::Error, Debug)]
pub enum VcsError {
    /// The program backing a VCS is not on the `PATH`.
    #[error("Unable to find '{program}' program")]
    ProgramNotFound {
        /// The program that was looked up.
        program: &'static str,
    },

    /// An explicitly requested VCS does not control the directory.
    #[error("This does not appear to be a {vcs_name} project")]
    NotAProject {
        /// Human-readable name of the VCS.
        vcs_name: &'static str,
    },

    /// Auto-detection found no VCS.
    #[error("Unable to detect version control system.")]
    Undetected,

    /// No path was given and the current directory is not accessible.
    #[error("Unable to determine the current directory")]
    CurrentDirectory(#[source] std::io::Error),

    /// The program could not be started at all.
    #[error("Failed to run '{command}' in {}: {source}", .directory.display())]
    Spawn {
        /// The rendered command line.
        command: String,
        /// The directory it was run in.
        directory: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The program exited with a code the caller did not expect.
    #[error("The command '{command}' returned code {code}. Output:\n{output}")]
    CommandFailed {
        /// The rendered command line.
        command: String,
        /// The exit code, or -1 when the process was terminated by a signal.
        code: i32,
        /// The captured output, stdout first and then stderr.
        output: String,
    },

    /// The output of a command could not be understood.
    #[error("Unable to parse the output of '{command}': {reason}")]
    UnexpectedOutput {
        /// The rendered command line.
        command: String,
        /// What could not be parsed.
        reason: String,
    },

    /// An archival file exists but is not valid.
    #[error("Unable to read archival file {}: {reason}", .path.display())]
    Archival {
        /// Where the archival file was found.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// Strict mode was requested and the repository has no usable tag or commit.
    #[error("{0}")]
    Strict(&'static str),

    /// Strict mode was requested and a non-fatal concern was raised.
    #[error("{}", .0.iter().map(|c| c.message()).collect::<Vec<_>>().join("\n"))]
    Concerns(Vec<crate::Concern>),

    /// The tag pattern could not be applied.
    #[error(transparent)]
    Pattern(#[from] PatternError),
}

/// Any error raised by this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// See [`PatternError`].
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// See [`StyleError`].
    #[error(transparent)]
    Style(#[from] StyleError),

    /// See [`BumpError`].
    #[error(transparent)]
    Bump(#[from] BumpError),

    /// See [`VcsError`].
    #[error(transparent)]
    Vcs(#[from] VcsError),
}
