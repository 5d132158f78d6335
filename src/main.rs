use clap::{Args, Parser, Subcommand, ValueEnum};
use dynver::{check_version, DeriveOptions, SerializeOptions, Style, Vcs, Version};
use std::{
    io::{self, IsTerminal, Read},
    path::PathBuf,
    process::ExitCode,
};
use tracing::debug;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Filter directives for the log output, like `RUST_LOG`.
const LOG_ENV: &str = "DYNVER_LOG";

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error("{0}")]
    Library(#[from] dynver::Error),

    #[error("{0}")]
    Vcs(#[from] dynver::VcsError),

    #[error("{0}")]
    Style(#[from] dynver::StyleError),

    #[error("Unable to read the version from stdin")]
    Stdin(#[source] io::Error),

    #[error("A version must be specified")]
    MissingVersion,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
enum VcsArg {
    Any,
    Git,
    Mercurial,
    Darcs,
    Subversion,
    Bazaar,
    Fossil,
    Pijul,
}

impl From<VcsArg> for Vcs {
    fn from(arg: VcsArg) -> Self {
        match arg {
            VcsArg::Any => Vcs::Any,
            VcsArg::Git => Vcs::Git,
            VcsArg::Mercurial => Vcs::Mercurial,
            VcsArg::Darcs => Vcs::Darcs,
            VcsArg::Subversion => Vcs::Subversion,
            VcsArg::Bazaar => Vcs::Bazaar,
            VcsArg::Fossil => Vcs::Fossil,
            VcsArg::Pijul => Vcs::Pijul,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum, Debug)]
enum StyleArg {
    Pep440,
    Semver,
    Pvp,
}

impl From<StyleArg> for Style {
    fn from(arg: StyleArg) -> Self {
        match arg {
            StyleArg::Pep440 => Style::Pep440,
            StyleArg::Semver => Style::SemVer,
            StyleArg::Pvp => Style::Pvp,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a version from a version control system
    From {
        /// The version control system to inspect. `any` detects it.
        #[arg(value_enum)]
        vcs: VcsArg,

        #[command(flatten)]
        args: FromArgs,
    },

    /// Check that a version conforms to a style
    Check {
        /// The version to check. Read from stdin when omitted and stdin is not a terminal.
        version: Option<String>,

        /// The style to check against
        #[arg(long, value_enum, default_value_t = StyleArg::Pep440)]
        style: StyleArg,
    },
}

#[derive(Args, Debug)]
struct FromArgs {
    /// Always include metadata. The commit id is otherwise only included when the distance is
    /// non-zero.
    #[arg(long, conflicts_with = "no_metadata")]
    metadata: bool,

    /// Never include metadata
    #[arg(long)]
    no_metadata: bool,

    /// Include a `dirty` flag in the metadata when the working tree has uncommitted changes
    #[arg(long)]
    dirty: bool,

    /// Regular expression matched against tags, with a `base` named group and optional `stage`,
    /// `revision`, `tagged_metadata`, and `epoch` groups. Also accepts a preset name:
    /// `default` or `default-unprefixed`.
    #[arg(long, default_value = "default")]
    pattern: String,

    /// Text inserted after the pattern's leading `^`, for example a package name
    #[arg(long)]
    pattern_prefix: Option<String>,

    /// Custom output template, like `v{base}+{distance}.{commit}`
    #[arg(long)]
    format: Option<String>,

    /// Output grammar. Without `--format`, PEP 440 is used. With `--format`, the output is only
    /// checked when this is set.
    #[arg(long, value_enum)]
    style: Option<StyleArg>,

    /// Only inspect the newest tag, failing if it does not match the pattern
    #[arg(long)]
    latest_tag: bool,

    /// Subversion: the directory holding tags, relative to the repository root
    #[arg(long, default_value = "tags")]
    tag_dir: String,

    /// Git: the branch whose history is searched for tags, instead of `HEAD`
    #[arg(long)]
    tag_branch: Option<String>,

    /// Use the full commit id
    #[arg(long)]
    full_commit: bool,

    /// Truncate the full commit id to this many characters
    #[arg(long, value_name = "LENGTH")]
    commit_length: Option<usize>,

    /// Text put in front of the commit id
    #[arg(long)]
    commit_prefix: Option<String>,

    /// Replacement for non-alphanumeric characters in `{branch_escaped}`
    #[arg(long)]
    escape_with: Option<String>,

    /// Git: untracked files do not make the working tree dirty
    #[arg(long)]
    ignore_untracked: bool,

    /// Print the matched tag and the newer tags that did not match to stderr
    #[arg(long)]
    debug: bool,

    /// Bump the base (or the stage revision) when the distance is non-zero, to preview the next
    /// release
    #[arg(long)]
    bump: bool,

    /// Include the metadata captured from the tag
    #[arg(long)]
    tagged_metadata: bool,

    /// Fail instead of falling back to 0.0.0 when there are no tags, and treat warnings as errors
    #[arg(long)]
    strict: bool,

    /// Inspect this directory instead of the current one
    #[arg(long)]
    path: Option<PathBuf>,
}

impl FromArgs {
    fn derive_options(&self) -> DeriveOptions {
        let mut options = DeriveOptions::default()
            .with_pattern(&self.pattern)
            .with_latest_tag(self.latest_tag)
            .with_tag_dir(&self.tag_dir)
            .with_full_commit(self.full_commit)
            .with_strict(self.strict)
            .with_ignore_untracked(self.ignore_untracked);
        if let Some(prefix) = &self.pattern_prefix {
            options = options.with_pattern_prefix(prefix);
        }
        if let Some(branch) = &self.tag_branch {
            options = options.with_tag_branch(branch);
        }
        if let Some(path) = &self.path {
            options = options.with_path(path);
        }
        if let Some(length) = self.commit_length {
            options = options.with_commit_length(length);
        }
        options
    }

    fn serialize_options(&self) -> SerializeOptions<'_> {
        let metadata = if self.metadata {
            Some(true)
        } else if self.no_metadata {
            Some(false)
        } else {
            None
        };
        SerializeOptions {
            metadata,
            dirty: self.dirty,
            format: self.format.as_deref(),
            style: self.style.map(Style::from),
            bump: self.bump,
            tagged_metadata: self.tagged_metadata,
            commit_prefix: self.commit_prefix.as_deref(),
            escape_with: self.escape_with.as_deref(),
        }
    }
}

/// What to print once the command succeeds.
#[derive(Debug, Default, PartialEq, Eq)]
struct Output {
    stdout: Option<String>,
    stderr: Vec<String>,
}

fn main() -> ExitCode {
    setup_logging();
    let cli = Cli::parse();
    debug!(?cli, "Parsed arguments");

    match do_work(cli) {
        Ok(output) => {
            for line in output.stderr {
                eprintln!("{line}");
            }
            if let Some(stdout) = output.stdout {
                println!("{stdout}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn do_work(cli: Cli) -> Result<Output, CliError> {
    match cli.command {
        Commands::From { vcs, args } => from_vcs(vcs.into(), &args),
        Commands::Check { version, style } => {
            let version = match version {
                Some(version) => version,
                None => read_stdin()?.ok_or(CliError::MissingVersion)?,
            };
            check_version(&version, style.into())?;
            Ok(Output::default())
        }
    }
}

fn from_vcs(vcs: Vcs, args: &FromArgs) -> Result<Output, CliError> {
    let version = Version::from_vcs(vcs, &args.derive_options())?;

    let mut stderr = version
        .concerns
        .iter()
        .map(|concern| format!("Warning: {}", concern.message()))
        .collect::<Vec<_>>();

    let serialized = version.serialize(&args.serialize_options())?;

    if args.debug {
        stderr.push(format!(
            "# Matched tag: {}",
            version.matched_tag().unwrap_or("none")
        ));
        stderr.push(format!(
            "# Newer unmatched tags: {}",
            version
                .newer_unmatched_tags()
                .map_or_else(|| "none".to_owned(), |tags| format!("{tags:?}"))
        ));
    }

    Ok(Output {
        stdout: Some(serialized),
        stderr,
    })
}

/// Reads a version from stdin, unless stdin is a terminal.
fn read_stdin() -> Result<Option<String>, CliError> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    stdin.read_to_string(&mut buffer).map_err(CliError::Stdin)?;
    let version = buffer.trim();
    Ok((!version.is_empty()).then(|| version.to_owned()))
}

/// Installs a subscriber printing to stderr, filtered by `DYNVER_LOG`. Nothing is shown by
/// default.
fn setup_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::OFF.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}
