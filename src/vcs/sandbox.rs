//! Throwaway repositories for backend tests.

use super::DeriveOptions;
use crate::version::Version;
use std::{fs, path::Path, process::Command};
use tempfile::TempDir;

pub(crate) struct Sandbox {
    program: &'static str,
    dir: TempDir,
}

impl Sandbox {
    /// A fresh empty directory, or `None` when `program` is not installed and the test should be
    /// skipped.
    pub(crate) fn new(program: &'static str) -> Option<Self> {
        if which::which(program).is_err() {
            eprintln!("skipping: '{program}' is not installed");
            return None;
        }
        Some(Self {
            program,
            dir: tempfile::tempdir().ok()?,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn options(&self) -> DeriveOptions {
        DeriveOptions::default().with_path(self.path())
    }

    /// Runs the sandbox's program and returns its trimmed stdout, panicking unless it exits with 0.
    pub(crate) fn run(&self, args: &[&str]) -> String {
        self.run_in(self.path(), args, &[])
    }

    /// Like [`Sandbox::run`] with extra environment variables.
    pub(crate) fn run_env(&self, args: &[&str], env: &[(&str, &str)]) -> String {
        self.run_in(self.path(), args, env)
    }

    pub(crate) fn run_in(&self, dir: &Path, args: &[&str], env: &[(&str, &str)]) -> String {
        let output = Command::new(self.program)
            .args(args)
            .current_dir(dir)
            .env("LC_ALL", "C")
            .env("GIT_AUTHOR_NAME", "Dynver Tests")
            .env("GIT_AUTHOR_EMAIL", "tests@example.com")
            .env("GIT_COMMITTER_NAME", "Dynver Tests")
            .env("GIT_COMMITTER_EMAIL", "tests@example.com")
            .env("HGUSER", "Dynver Tests <tests@example.com>")
            .env("DARCS_EMAIL", "Dynver Tests <tests@example.com>")
            .env("BZR_EMAIL", "Dynver Tests <tests@example.com>")
            .env("FOSSIL_USER", "dynver")
            .envs(env.iter().copied())
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "{} {:?} failed:\n{}\n{}",
            self.program,
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_owned()
    }

    pub(crate) fn write(&self, name: &str, contents: &str) {
        fs::write(self.path().join(name), contents).unwrap();
    }
}

/// Checks the commit and timestamp a live derivation must report, then clears them so the rest of
/// the version can be compared against a literal.
pub(crate) fn settle(version: Version, fresh: bool) -> Version {
    if fresh {
        assert_eq!(None, version.commit);
        assert_eq!(None, version.timestamp);
    } else {
        assert!(version.commit.as_deref().is_some_and(|commit| !commit.is_empty()));
        assert!(version.timestamp.is_some());
    }
    Version {
        commit: None,
        timestamp: None,
        ..version
    }
}
