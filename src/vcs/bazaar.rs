use super::{command::run_ok, detect_vcs, tagged, untagged, DeriveOptions, Vcs};
use crate::{error::VcsError, version::Version};
use chrono::{DateTime, Utc};

const BZR: &str = "bzr";

/// The fields of interest from `bzr log --limit 1`.
#[derive(Debug, Default, PartialEq, Eq)]
struct LogEntry {
    revno: Option<String>,
    nick: Option<String>,
    timestamp: Option<DateTime<Utc>>,
}

pub(super) fn derive(options: &DeriveOptions) -> Result<Version, VcsError> {
    let directory = options.directory()?;
    detect_vcs(Some(Vcs::Bazaar), &directory)?;

    let dirty = Some(!run_ok(BZR, &["status"], &directory)?.is_empty());

    let LogEntry {
        revno,
        nick: branch,
        timestamp,
    } = parse_log(&run_ok(BZR, &["log", "--limit", "1"], &directory)?);
    let current = revno.as_deref().and_then(|revno| revno.parse::<u64>().ok());

    let listing = run_ok(BZR, &["tags"], &directory)?;
    let (Some(current), false) = (current, listing.is_empty()) else {
        return options.fallback(Version {
            distance: current.unwrap_or(0),
            commit: revno,
            dirty,
            branch,
            timestamp,
            ..untagged()
        });
    };

    let mut tags = parse_tags(&listing);
    tags.sort_by(|a, b| (b.1, &b.0).cmp(&(a.1, &a.0)));
    let names = tags.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();

    let matched = options.match_tags(&names)?;
    let tag_revno = tags
        .iter()
        .find(|(name, _)| *name == matched.tag)
        .map_or(0, |(_, revno)| *revno);

    Ok(Version {
        distance: current.saturating_sub(tag_revno),
        commit: revno,
        dirty,
        branch,
        timestamp,
        ..tagged(matched)
    })
}

fn parse_log(log: &str) -> LogEntry {
    let mut entry = LogEntry::default();
    for line in log.lines() {
        if let Some((_, revno)) = line.split_once("revno: ") {
            // Merges are shown as "revno: 3 [merge]".
            entry.revno = revno.split_whitespace().next().map(str::to_owned);
        } else if let Some((_, nick)) = line.split_once("branch nick: ") {
            entry.nick = Some(nick.to_owned());
        } else if let Some((_, timestamp)) = line.split_once("timestamp: ") {
            entry.timestamp = DateTime::parse_from_str(timestamp, "%a %Y-%m-%d %H:%M:%S %z")
                .ok()
                .map(|timestamp| timestamp.with_timezone(&Utc));
        }
    }
    entry
}

/// Tags and the revision number they point to. Tags on revisions outside the current branch's
/// history are listed with `?` and skipped.
fn parse_tags(listing: &str) -> Vec<(String, u64)> {
    listing
        .lines()
        .filter_map(|line| {
            let (name, revno) = line.trim_end().rsplit_once(char::is_whitespace)?;
            Some((name.trim_end().to_owned(), revno.parse().ok()?))
        })
        .collect()
}
