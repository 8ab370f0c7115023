//! Mapping version numbers and timestamps to log positions.

use crate::{config::MissingTime, error::Result, log::VersionLog, Error, Timestamp, Version};
use serde::{Deserialize, Serialize};

/// A point in a record's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Query {
    /// An explicit version number
    Version(Version),
    /// A point in time (milliseconds since epoch)
    Time(Timestamp),
}

/// Resolve `query` to a concrete version of `log`.
///
/// Explicit versions are validated against the log's span. A timestamp
/// resolves to the latest entry written at or before it; entries sharing a
/// timestamp resolve to the highest version. A timestamp before the first
/// entry yields [`Error::NoVersionAtTime`] or `None`, depending on `missing`.
pub fn resolve_version(
    log: &VersionLog,
    query: Query,
    missing: MissingTime,
) -> Result<Option<Version>> {
    match query {
        Query::Version(version) => {
            log.check_range(version)?;
            Ok(Some(version))
        }
        Query::Time(time) => {
            let entries = log.entries();
            let end = entries.partition_point(|e| e.timestamp() <= time);
            match end.checked_sub(1) {
                Some(pos) => Ok(Some(entries[pos].version())),
                None => match missing {
                    MissingTime::Fail => Err(Error::NoVersionAtTime(time)),
                    MissingTime::Absent => Ok(None),
                },
            }
        }
    }
}
