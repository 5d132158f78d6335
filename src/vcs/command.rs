use crate::error::VcsError;
use itertools::Itertools;
use std::{
    path::Path,
    process::{Command, Stdio},
};
use tracing::debug;

/// Runs `program` with `args` in `directory` and returns its exit code and trimmed stdout.
///
/// `codes` lists the exit codes the caller can handle. Any other code is an error carrying the
/// command, the code and everything the program printed. An empty `codes` accepts every code.
///
/// The program is resolved on the `PATH` first, and no shell is involved, so arguments are passed
/// through verbatim.
pub(crate) fn run_cmd(
    program: &'static str,
    args: &[&str],
    directory: &Path,
    codes: &[i32],
) -> Result<(i32, String), VcsError> {
    let command = render(program, args);
    let executable = which::which(program).map_err(|_| VcsError::ProgramNotFound { program })?;

    let output = Command::new(executable)
        .args(args)
        .current_dir(directory)
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .output()
        .map_err(|source| VcsError::Spawn {
            command: command.clone(),
            directory: directory.to_path_buf(),
            source,
        })?;

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
    debug!(%command, directory = %directory.display(), code, "Ran command");

    if !codes.is_empty() && !codes.contains(&code) {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = [stdout.as_str(), stderr.trim()]
            .into_iter()
            .filter(|text| !text.is_empty())
            .join("\n");
        return Err(VcsError::CommandFailed {
            command,
            code,
            output: combined,
        });
    }

    Ok((code, stdout))
}

/// Like [`run_cmd`] but only accepts exit code 0 and returns just the output.
pub(crate) fn run_ok(
    program: &'static str,
    args: &[&str],
    directory: &Path,
) -> Result<String, VcsError> {
    run_cmd(program, args, directory, &[0]).map(|(_, output)| output)
}

/// Parses a number out of a command's output.
pub(crate) fn parse_count<T: std::str::FromStr>(
    program: &'static str,
    args: &[&str],
    output: &str,
) -> Result<T, VcsError> {
    output
        .trim()
        .parse()
        .map_err(|_| VcsError::UnexpectedOutput {
            command: render(program, args),
            reason: format!("expected a number, got '{output}'"),
        })
}

pub(crate) fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("\"{arg}\"")
            } else {
                arg.to_owned()
            }
        })
        .join(" ")
}
