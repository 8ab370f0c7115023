//! The append-only version log attached to a record.
//!
//! A [`VersionLog`] is a non-empty sequence of [`LogEntry`] values with
//! strictly increasing versions. The first entry is always a snapshot; every
//! later entry is either a [`Diff`] against the previous version or another
//! full snapshot that bounds reconstruction cost.

use crate::{
    config::LogPolicy,
    diff::{diff, Diff},
    error::Result,
    patch,
    persist::RawEntry,
    state::State,
    Error, ResponsibleId, Timestamp, Version,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// What an entry carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Changes relative to the previous version.
    Diff(Diff),
    /// The complete state at this version.
    Snapshot(State),
}

/// Tag distinguishing diff entries from snapshot entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Diff,
    Snapshot,
}

/// One history event.
///
/// Entries are immutable once built; there are no setters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawEntry", try_from = "RawEntry")]
pub struct LogEntry {
    version: Version,
    timestamp: Timestamp,
    responsible: Option<ResponsibleId>,
    payload: Payload,
}

impl LogEntry {
    /// Build a diff entry.
    pub fn diff(
        version: Version,
        timestamp: Timestamp,
        responsible: Option<ResponsibleId>,
        changes: Diff,
    ) -> Self {
        Self {
            version,
            timestamp,
            responsible,
            payload: Payload::Diff(changes),
        }
    }

    /// Build a snapshot entry.
    pub fn snapshot(
        version: Version,
        timestamp: Timestamp,
        responsible: Option<ResponsibleId>,
        state: State,
    ) -> Self {
        Self {
            version,
            timestamp,
            responsible,
            payload: Payload::Snapshot(state),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn responsible(&self) -> Option<&str> {
        self.responsible.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn kind(&self) -> EntryKind {
        match self.payload {
            Payload::Diff(_) => EntryKind::Diff,
            Payload::Snapshot(_) => EntryKind::Snapshot,
        }
    }

    pub fn is_snapshot(&self) -> bool {
        self.kind() == EntryKind::Snapshot
    }
}

/// The ordered history of a single record.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionLog {
    entries: Vec<LogEntry>,
    /// Positions of snapshot entries in `entries`, ascending.
    snapshots: Vec<usize>,
}

impl VersionLog {
    /// Start a log with a single snapshot at version 1.
    pub fn genesis(state: State, timestamp: Timestamp, responsible: Option<ResponsibleId>) -> Self {
        Self {
            entries: vec![LogEntry::snapshot(1, timestamp, responsible, state)],
            snapshots: vec![0],
        }
    }

    /// Rebuild a log from stored entries, checking every structural invariant.
    pub fn from_entries(entries: Vec<LogEntry>) -> Result<Self> {
        let first = entries
            .first()
            .ok_or_else(|| Error::InvalidLogData("history is empty".into()))?;

        if !first.is_snapshot() {
            return Err(Error::InvariantViolation(format!(
                "first entry (version {}) is not a snapshot",
                first.version
            )));
        }
        if first.version == 0 {
            return Err(Error::InvariantViolation("version 0 is not allowed".into()));
        }

        for pair in entries.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.version <= prev.version {
                return Err(Error::InvariantViolation(format!(
                    "version {} follows version {}",
                    next.version, prev.version
                )));
            }
            if next.timestamp < prev.timestamp {
                return Err(Error::InvariantViolation(format!(
                    "timestamp of version {} goes backwards",
                    next.version
                )));
            }
        }

        let mut log = Self {
            entries,
            snapshots: Vec::new(),
        };
        log.rebuild_index();
        Ok(log)
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Positions of snapshot entries, ascending. Always starts with `0`.
    pub fn snapshot_positions(&self) -> &[usize] {
        &self.snapshots
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; a log holds at least its genesis snapshot.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent entry.
    pub fn last(&self) -> &LogEntry {
        &self.entries[self.entries.len() - 1]
    }

    /// Version of the most recent entry.
    pub fn current_version(&self) -> Version {
        self.last().version
    }

    /// Version of the oldest retained entry.
    pub fn first_version(&self) -> Version {
        self.entries[0].version
    }

    /// The entry recorded exactly at `version`.
    pub fn entry(&self, version: Version) -> Option<&LogEntry> {
        self.entries
            .binary_search_by_key(&version, |e| e.version)
            .ok()
            .map(|pos| &self.entries[pos])
    }

    /// Reconstruct the state at `version`.
    pub fn reconstruct(&self, version: Version) -> Result<State> {
        patch::reconstruct(self, version)
    }

    /// The state at the current version.
    pub fn head_state(&self) -> Result<State> {
        self.reconstruct(self.current_version())
    }

    /// The entry in effect at `version`: the latest one at or before it.
    pub fn entry_at(&self, version: Version) -> Result<&LogEntry> {
        self.check_range(version)?;
        let end = self.entries.partition_point(|e| e.version <= version);
        Ok(&self.entries[end - 1])
    }

    /// The actor recorded for the entry in effect at `version`.
    pub fn responsible_at(&self, version: Version) -> Result<Option<&str>> {
        self.entry_at(version).map(LogEntry::responsible)
    }

    /// Append the change from `previous` to `new`.
    ///
    /// Returns `None` when the write is a no-op: nothing changed and the actor
    /// is the same as last time.
    ///
    /// # Panics
    ///
    /// In debug builds, panics when `previous` is not the head state of this
    /// log. Release builds trust the caller; a stale `previous` records a diff
    /// that fails to replay.
    pub fn append(
        &mut self,
        previous: &State,
        new: &State,
        responsible: Option<&str>,
        force_snapshot: bool,
        timestamp: Timestamp,
        policy: &LogPolicy,
    ) -> Result<Option<&LogEntry>> {
        #[cfg(debug_assertions)]
        {
            let head = self.head_state()?;
            debug_assert_eq!(previous, &head, "append must start from the log head");
        }
        let changes = diff(previous, new);

        if changes.is_empty() && self.last().responsible() == responsible {
            debug!(version = self.current_version(), "no-op write elided");
            return Ok(None);
        }

        self.push_change(changes, new, responsible, force_snapshot, timestamp, policy)
            .map(Some)
    }

    /// Append a full snapshot of `state` regardless of what changed.
    pub fn checkpoint(
        &mut self,
        state: &State,
        responsible: Option<&str>,
        timestamp: Timestamp,
        policy: &LogPolicy,
    ) -> Result<&LogEntry> {
        self.push_change(Diff::new(), state, responsible, true, timestamp, policy)
    }

    /// Step back to the version before the current one.
    ///
    /// With `append` unset the undone entries are discarded. With `append` set
    /// a new entry moving the state backwards is recorded instead, so nothing
    /// is lost.
    pub fn undo(
        &mut self,
        append: bool,
        responsible: Option<&str>,
        timestamp: Timestamp,
        policy: &LogPolicy,
    ) -> Result<State> {
        if self.entries.len() < 2 {
            return Err(Error::NoHistory);
        }
        let target = self.entries[self.entries.len() - 2].version;
        self.switch_to(target, append, responsible, timestamp, policy)
    }

    /// Move the log to an arbitrary retained version.
    pub fn switch_to(
        &mut self,
        target: Version,
        append: bool,
        responsible: Option<&str>,
        timestamp: Timestamp,
        policy: &LogPolicy,
    ) -> Result<State> {
        let state = self.reconstruct(target)?;
        if target == self.current_version() {
            return Ok(state);
        }

        if append {
            let head = self.head_state()?;
            let changes = diff(&head, &state);
            self.push_change(changes, &state, responsible, false, timestamp, policy)?;
        } else {
            let end = self.entries.partition_point(|e| e.version <= target);
            let dropped = self.entries.len() - end;
            self.entries.truncate(end);
            self.snapshots.retain(|&pos| pos < end);
            debug!(version = target, dropped, "truncated log");
        }

        Ok(state)
    }

    /// Discard all history, keeping `state` as a fresh version 1.
    ///
    /// `state` is the record's current state, which may differ from the log
    /// head after unlogged writes.
    pub fn reset(&mut self, state: State, responsible: Option<&str>, timestamp: Timestamp) {
        let dropped = self.entries.len();
        *self = Self::genesis(state, timestamp, responsible.map(str::to_string));
        debug!(dropped, "reset log");
    }

    /// Cumulative change from `from` to the current version.
    pub fn diff_since(&self, from: Version) -> Result<Diff> {
        self.diff_between(from, self.current_version())
    }

    /// Cumulative change between two retained versions.
    ///
    /// Computed from the two reconstructed states, so a field that changed
    /// and then changed back shows no change at all.
    pub fn diff_between(&self, from: Version, to: Version) -> Result<Diff> {
        let old = self.reconstruct(from)?;
        let new = self.reconstruct(to)?;
        Ok(diff(&old, &new))
    }

    pub(crate) fn check_range(&self, version: Version) -> Result<()> {
        let (first, current) = (self.first_version(), self.current_version());
        if version < first || version > current {
            return Err(Error::OutOfRange {
                requested: version,
                first,
                current,
            });
        }
        Ok(())
    }

    fn push_change(
        &mut self,
        changes: Diff,
        new: &State,
        responsible: Option<&str>,
        force_snapshot: bool,
        timestamp: Timestamp,
        policy: &LogPolicy,
    ) -> Result<&LogEntry> {
        let last = self.last();
        let version = last
            .version
            .checked_add(1)
            .ok_or_else(|| Error::InvariantViolation("version counter overflow".into()))?;

        let timestamp = if timestamp < last.timestamp {
            warn!(
                version,
                given = timestamp,
                last = last.timestamp,
                "timestamp older than previous entry, clamping"
            );
            last.timestamp
        } else {
            timestamp
        };

        let snapshot = force_snapshot || policy.snapshot_due(self.diffs_since_snapshot());
        let responsible = responsible.map(str::to_string);
        let entry = if snapshot {
            LogEntry::snapshot(version, timestamp, responsible, new.clone())
        } else {
            LogEntry::diff(version, timestamp, responsible, changes)
        };

        debug!(version, kind = ?entry.kind(), "appended entry");
        if entry.is_snapshot() {
            self.snapshots.push(self.entries.len());
        }
        self.entries.push(entry);

        self.enforce_limit(policy)?;
        Ok(self.last())
    }

    fn diffs_since_snapshot(&self) -> usize {
        let last_snapshot = self.snapshots.last().copied().unwrap_or(0);
        self.entries.len() - 1 - last_snapshot
    }

    fn enforce_limit(&mut self, policy: &LogPolicy) -> Result<()> {
        let Some(limit) = policy.history_limit else {
            return Ok(());
        };
        let limit = limit.max(1);
        if self.entries.len() <= limit {
            return Ok(());
        }

        let dropped = self.entries.len() - limit;
        let new_first = &self.entries[dropped];
        let rebased = if new_first.is_snapshot() {
            None
        } else {
            Some(self.reconstruct(new_first.version)?)
        };

        let mut kept = self.entries.split_off(dropped);
        if let Some(state) = rebased {
            kept[0].payload = Payload::Snapshot(state);
        }
        self.entries = kept;
        self.rebuild_index();

        debug!(dropped, first_version = self.first_version(), "pruned history");
        Ok(())
    }

    fn rebuild_index(&mut self) {
        self.snapshots = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_snapshot())
            .map(|(pos, _)| pos)
            .collect();
    }
}
