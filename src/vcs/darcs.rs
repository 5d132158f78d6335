use super::{
    command::{parse_count, run_cmd, run_ok},
    detect_vcs, tagged, untagged, DeriveOptions, Vcs,
};
use crate::{error::VcsError, version::Version};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

const DARCS: &str = "darcs";

static PATCH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<patch\s[^>]*>").unwrap());

static HASH_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\shash=['"]([^'"]+)['"]"#).unwrap());

static DATE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sdate=['"](\d{14})['"]"#).unwrap());

pub(super) fn derive(options: &DeriveOptions) -> Result<Version, VcsError> {
    let directory = options.directory()?;
    detect_vcs(Some(Vcs::Darcs), &directory)?;

    let (_, status) = run_cmd(DARCS, &["status"], &directory, &[0, 1])?;
    let dirty = Some(status != "No changes!");

    let log_args = ["log", "--last", "1", "--xml-output"];
    let log = run_ok(DARCS, &log_args, &directory)?;
    let (commit, timestamp) = match parse_last_patch(&log) {
        Some((hash, timestamp)) => (Some(options.truncate_commit(hash.to_owned())), timestamp),
        None => (None, None),
    };

    let listing = run_ok(DARCS, &["show", "tags"], &directory)?;
    if listing.is_empty() {
        let distance = run_ok(DARCS, &["log", "--count"], &directory)
            .ok()
            .and_then(|count| count.parse().ok())
            .unwrap_or(0);
        return options.fallback(Version {
            distance,
            commit,
            dirty,
            timestamp,
            ..untagged()
        });
    }
    let tags = listing.lines().collect::<Vec<_>>();

    let matched = options.match_tags(&tags)?;
    let count_args = ["log", "--from-tag", matched.tag.as_str(), "--count"];
    let count: u64 = parse_count(DARCS, &count_args, &run_ok(DARCS, &count_args, &directory)?)?;
    // The tag is a patch of its own and is included in the count.
    let distance = count.saturating_sub(1);

    Ok(Version {
        distance,
        commit,
        dirty,
        timestamp,
        ..tagged(matched)
    })
}

/// The hash and timestamp of the first `<patch>` element in `darcs log --xml-output`.
fn parse_last_patch(xml: &str) -> Option<(&str, Option<DateTime<Utc>>)> {
    let patch = PATCH_RE.find(xml)?.as_str();
    let hash = HASH_ATTR_RE.captures(patch)?.get(1)?.as_str();
    let timestamp = DATE_ATTR_RE
        .captures(patch)
        .and_then(|captures| captures.get(1))
        .and_then(|date| NaiveDateTime::parse_from_str(date.as_str(), "%Y%m%d%H%M%S").ok())
        .map(|date| date.and_utc());
    Some((hash, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::sandbox::{settle, Sandbox};
    use chrono::TimeZone;

    #[test]
    fn test_parse_last_patch() {
        let xml = "<changelog>\n<patch author='Dynver Tests &lt;tests@example.com&gt;' \
                   date='20230102030405' local_date='Mon Jan  2 03:04:05 UTC 2023' \
                   inverted='False' hash='0123456789abcdef'>\n\
                   <name>Initial commit</name>\n</patch>\n</changelog>";
        assert_eq!(
            Some((
                "0123456789abcdef",
                Some(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap())
            )),
            parse_last_patch(xml)
        );
        assert_eq!(None, parse_last_patch("<changelog>\n</changelog>"));
    }

    #[test]
    fn test_darcs() {
        let Some(sandbox) = Sandbox::new(DARCS) else {
            return;
        };
        let options = || sandbox.options();
        let from_vcs = |options: DeriveOptions, fresh: bool| {
            settle(Version::from_darcs(&options).unwrap(), fresh)
        };
        let expect = |base: &str, distance: u64, dirty: bool| {
            Version::new(base).with_distance(distance).with_dirty(dirty)
        };

        sandbox.run(&["init"]);
        assert_eq!(expect("0.0.0", 0, false), from_vcs(options(), true));

        sandbox.write("foo.txt", "hi");
        assert_eq!(expect("0.0.0", 0, true), from_vcs(options(), true));

        sandbox.run(&["add", "foo.txt"]);
        sandbox.run(&["record", "-am", "Initial commit"]);
        assert_eq!(expect("0.0.0", 1, false), from_vcs(options(), false));

        sandbox.run(&["tag", "v0.1.0"]);
        assert_eq!(expect("0.1.0", 0, false), from_vcs(options(), false));
        assert_eq!(
            expect("0.1.0", 0, false),
            from_vcs(options().with_latest_tag(true), false)
        );

        sandbox.write("foo.txt", "bye");
        assert_eq!(expect("0.1.0", 0, true), from_vcs(options(), false));

        sandbox.run(&["record", "-am", "Second"]);
        assert_eq!(expect("0.1.0", 1, false), from_vcs(options(), false));

        sandbox.run(&["tag", "unmatched"]);
        assert_eq!(expect("0.1.0", 2, false), from_vcs(options(), false));
        assert!(matches!(
            Version::from_darcs(&options().with_latest_tag(true)),
            Err(VcsError::Pattern(_))
        ));

        sandbox.run(&["tag", "v0.2.0"]);
        assert_eq!(expect("0.2.0", 0, false), from_vcs(options(), false));

        sandbox.run(&["obliterate", "--all", "--last", "3"]);
        assert_eq!(expect("0.1.0", 0, false), from_vcs(options(), false));
    }
}
