//! Engine configuration.
//!
//! All behaviour switches live in an [`EngineConfig`] value handed to the
//! engine by its host. There is no process-wide mutable state.

use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// What to do when stored log data was written in a different format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingUpgrade {
    /// Refuse to load the log
    Raise,
    /// Log a warning and load it anyway
    Warn,
    /// Load it silently (default)
    #[default]
    Ignore,
}

impl FromStr for PendingUpgrade {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(PendingUpgrade::Raise),
            "warn" => Ok(PendingUpgrade::Warn),
            "ignore" => Ok(PendingUpgrade::Ignore),
            _ => Err(Error::UnknownPolicy {
                setting: "on_pending_upgrade",
                value: s.to_string(),
                expected: "raise, warn, ignore",
            }),
        }
    }
}

/// What a timestamp query returns when it predates the whole log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingTime {
    /// Fail with [`Error::NoVersionAtTime`] (default)
    #[default]
    Fail,
    /// Return no version
    Absent,
}

impl FromStr for MissingTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(MissingTime::Fail),
            "absent" => Ok(MissingTime::Absent),
            _ => Err(Error::UnknownPolicy {
                setting: "missing_time",
                value: s.to_string(),
                expected: "fail, absent",
            }),
        }
    }
}

/// Snapshot and retention policy applied on every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPolicy {
    /// Store a full snapshot once this many diffs follow the last snapshot.
    /// `Some(0)` snapshots every append; `None` never snapshots on its own.
    pub snapshot_interval: Option<usize>,
    /// Keep at most this many entries, pruning the oldest.
    pub history_limit: Option<usize>,
}

impl LogPolicy {
    pub(crate) fn snapshot_due(&self, diffs_since_snapshot: usize) -> bool {
        self.snapshot_interval
            .is_some_and(|interval| diffs_since_snapshot >= interval)
    }
}

/// Everything the engine can be told by its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Undo records a new backward-moving entry instead of truncating.
    pub append_on_undo: bool,
    /// `at` on a record without a log returns its current state instead of nothing.
    pub view_without_log: bool,
    /// Behaviour of timestamp queries older than the first entry.
    pub missing_time: MissingTime,
    /// Behaviour on format version mismatch.
    pub on_pending_upgrade: PendingUpgrade,
    #[serde(flatten)]
    pub log: LogPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            append_on_undo: false,
            view_without_log: true,
            missing_time: MissingTime::Fail,
            on_pending_upgrade: PendingUpgrade::Ignore,
            log: LogPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Builder-style setter for the undo mode.
    pub fn with_append_on_undo(mut self, append: bool) -> Self {
        self.append_on_undo = append;
        self
    }

    /// Builder-style setter for the snapshot interval.
    pub fn with_snapshot_interval(mut self, interval: usize) -> Self {
        self.log.snapshot_interval = Some(interval);
        self
    }

    /// Builder-style setter for the history limit.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.log.history_limit = Some(limit);
        self
    }

    /// Builder-style setter for timestamp misses.
    pub fn with_missing_time(mut self, missing: MissingTime) -> Self {
        self.missing_time = missing;
        self
    }

    /// Builder-style setter for format mismatches.
    pub fn with_pending_upgrade(mut self, mode: PendingUpgrade) -> Self {
        self.on_pending_upgrade = mode;
        self
    }
}
