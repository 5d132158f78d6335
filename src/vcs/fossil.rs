use super::{
    command::{parse_count, run_ok},
    detect_vcs, tagged, untagged, DeriveOptions, Vcs,
};
use crate::{error::VcsError, version::Version};
use chrono::{DateTime, NaiveDateTime, Utc};

const FOSSIL: &str = "fossil";

const CHECKOUT_HASH_QUERY: &str =
    "SELECT value FROM vvar WHERE name = 'checkout-hash' LIMIT 1";

const CHECKOUT_TIME_QUERY: &str = "SELECT DATETIME(mtime) FROM event \
    JOIN blob ON event.objid = blob.rid \
    WHERE type = 'ci' \
    AND uuid = (SELECT value FROM vvar WHERE name = 'checkout-hash' LIMIT 1) \
    LIMIT 1";

const COMMIT_COUNT_QUERY: &str = "SELECT count() FROM event WHERE type = 'ci'";

/// Walks the primary parents of the checkout, numbering each generation, and lists the tags found
/// on the way, newest first. The checkout itself is generation 1.
const TAG_GENERATION_QUERY: &str = "CREATE TEMP TABLE IF NOT EXISTS dynver_ancestor(\
        rid INTEGER UNIQUE NOT NULL, \
        generation INTEGER PRIMARY KEY\
    ); \
    DELETE FROM dynver_ancestor; \
    WITH RECURSIVE g(x, i) AS (\
        VALUES((SELECT value FROM vvar WHERE name = 'checkout' LIMIT 1), 1) \
        UNION ALL \
        SELECT plink.pid, g.i + 1 FROM plink, g \
        WHERE plink.cid = g.x AND plink.isprim\
    ) \
    INSERT INTO dynver_ancestor(rid, generation) SELECT x, i FROM g; \
    SELECT tag.tagname, dynver_ancestor.generation \
    FROM tag \
    JOIN tagxref ON tag.tagid = tagxref.tagid \
    JOIN event ON tagxref.origid = event.objid \
    JOIN dynver_ancestor ON tagxref.origid = dynver_ancestor.rid \
    WHERE tagxref.tagtype = 1 \
    ORDER BY event.mtime DESC, tagxref.mtime DESC;";

pub(super) fn derive(options: &DeriveOptions) -> Result<Version, VcsError> {
    let directory = options.directory()?;
    detect_vcs(Some(Vcs::Fossil), &directory)?;

    let dirty = Some(!run_ok(FOSSIL, &["changes", "--differ"], &directory)?.is_empty());
    let branch = Some(run_ok(FOSSIL, &["branch", "current"], &directory)?);

    let hash = run_ok(FOSSIL, &["sql", CHECKOUT_HASH_QUERY], &directory)?;
    let commit = Some(options.truncate_commit(unquote(&hash).to_owned()));

    let time = run_ok(FOSSIL, &["sql", CHECKOUT_TIME_QUERY], &directory)?;
    let timestamp = parse_sql_datetime(unquote(&time));

    let count_args = ["sql", COMMIT_COUNT_QUERY];
    let count: u64 = parse_count(FOSSIL, &count_args, &run_ok(FOSSIL, &count_args, &directory)?)?;
    // Creating the repository counts as a check-in.
    let total = count.saturating_sub(1);
    if total == 0 {
        return options.fallback(Version {
            commit,
            dirty,
            branch,
            timestamp,
            ..untagged()
        });
    }

    let listing = run_ok(FOSSIL, &["sql", TAG_GENERATION_QUERY], &directory)?;
    let tags = parse_tag_generations(&listing);
    if tags.is_empty() {
        return options.fallback(Version {
            distance: total,
            commit,
            dirty,
            branch,
            timestamp,
            ..untagged()
        });
    }

    let names = tags.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
    let matched = options.match_tags(&names)?;
    let distance = tags
        .iter()
        .find(|(name, _)| *name == matched.tag)
        .map_or(0, |(_, distance)| *distance);

    Ok(Version {
        distance,
        commit,
        dirty,
        branch,
        timestamp,
        ..tagged(matched)
    })
}

/// `fossil sql` prints text values in single quotes.
fn unquote(value: &str) -> &str {
    value.trim().trim_matches('\'')
}

fn parse_sql_datetime(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|datetime| datetime.and_utc())
}

/// Rows like `'sym-v0.1.0',2` become the tag name and its distance from the checkout.
fn parse_tag_generations(listing: &str) -> Vec<(String, u64)> {
    listing
        .lines()
        .filter_map(|line| {
            let (name, generation) = line.rsplit_once(',')?;
            // Only symbolic tags are user tags.
            let name = unquote(name).strip_prefix("sym-")?;
            let generation = generation.trim().parse::<u64>().ok()?;
            Some((name.to_owned(), generation.saturating_sub(1)))
        })
        .collect()
}
