//! Applying diffs and rebuilding past states.
//!
//! # Algorithm
//!
//! To reconstruct version `v`:
//!
//! 1. Binary-search the snapshot index for the latest snapshot at or before `v`
//! 2. Start from the state embedded in that snapshot
//! 3. Forward-apply every diff after it, up to and including `v`
//!
//! Cost is proportional to the distance from the nearest snapshot, which is
//! why the log can be configured to re-snapshot periodically.

use crate::{
    diff::{Diff, FieldChange},
    error::Result,
    log::{Payload, VersionLog},
    state::State,
    Error, Version,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which way a diff is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// From the older state to the newer one (default)
    #[default]
    Forward,
    /// From the newer state back to the older one
    Backward,
}

impl Direction {
    /// The value a field must hold before the change is applied.
    fn source(self, change: &FieldChange) -> Option<&Value> {
        match self {
            Direction::Forward => change.old(),
            Direction::Backward => change.new_value(),
        }
    }

    /// The value a field holds after the change is applied.
    fn target(self, change: &FieldChange) -> Option<&Value> {
        match self {
            Direction::Forward => change.new_value(),
            Direction::Backward => change.old(),
        }
    }
}

/// Apply `diff` to `state` without checking the recorded source values.
pub fn apply(state: &State, diff: &Diff, direction: Direction) -> State {
    let mut next = state.clone();
    for (field, change) in diff.iter() {
        match direction.target(change) {
            Some(value) => {
                next.insert(field.clone(), value.clone());
            }
            None => {
                next.remove(field);
            }
        }
    }
    next
}

/// Apply `diff` to `state`, failing if any touched field does not currently
/// hold the value the diff says it changed from.
pub fn apply_checked(state: &State, diff: &Diff, direction: Direction) -> Result<State> {
    for (field, change) in diff.iter() {
        let expected = direction.source(change);
        let actual = state.get(field);
        if actual != expected {
            return Err(Error::InvariantViolation(format!(
                "field `{}` holds {} but the diff expects {}",
                field,
                describe(actual),
                describe(expected)
            )));
        }
    }
    Ok(apply(state, diff, direction))
}

fn describe(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "no value".to_string(),
    }
}

/// Rebuild the state at `target` by replaying from the nearest snapshot.
pub fn reconstruct(log: &VersionLog, target: Version) -> Result<State> {
    log.check_range(target)?;

    let entries = log.entries();
    // one past the last entry at or before target; at least 1 after the range check
    let end = entries.partition_point(|e| e.version() <= target);

    let snapshots = log.snapshot_positions();
    let start = snapshots
        .partition_point(|&pos| pos < end)
        .checked_sub(1)
        .map(|idx| snapshots[idx])
        .ok_or_else(|| Error::InvariantViolation("no snapshot precedes the target".into()))?;

    let mut state = match entries[start].payload() {
        Payload::Snapshot(state) => state.clone(),
        Payload::Diff(_) => {
            return Err(Error::InvariantViolation(format!(
                "snapshot index points at diff entry {}",
                entries[start].version()
            )))
        }
    };

    for entry in &entries[start + 1..end] {
        state = match entry.payload() {
            Payload::Diff(diff) => apply_checked(&state, diff, Direction::Forward).map_err(|e| {
                match e {
                    Error::InvariantViolation(msg) => {
                        Error::InvariantViolation(format!("version {}: {}", entry.version(), msg))
                    }
                    other => other,
                }
            })?,
            Payload::Snapshot(snapshot) => snapshot.clone(),
        };
    }

    Ok(state)
}
