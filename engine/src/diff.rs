//! Field-level change sets between two states.
//!
//! A [`Diff`] records, per top-level field, whether it was added, removed or
//! changed. Nested values are never diffed structurally: a change anywhere
//! inside a field's value replaces the whole field.
//!
//! # Wire encoding
//!
//! Every change is written as an `[old, new]` pair. The missing side of an
//! addition or removal is the marker object `{"$absent": true}`:
//!
//! ```text
//! {"name": ["a", "b"], "age": [{"$absent": true}, 30], "nick": ["al", {"$absent": true}]}
//! ```
//!
//! A stored value that could be mistaken for that marker (any single-key
//! object keyed `$absent` or `$value`) is wrapped as `{"$value": <value>}`
//! and unwrapped again on read.
//!
//! On read, any value that is not such a pair is taken to be an addition
//! carrying the bare new value.

use crate::state::State;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key of the marker object standing in for "no value".
pub const ABSENT_MARKER_KEY: &str = "$absent";

/// Key of the wrapper around stored values that collide with the marker.
pub const ESCAPE_KEY: &str = "$value";

fn absent_marker() -> Value {
    let mut map = serde_json::Map::new();
    map.insert(ABSENT_MARKER_KEY.to_string(), Value::Bool(true));
    Value::Object(map)
}

fn is_absent_marker(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.len() == 1 && map.get(ABSENT_MARKER_KEY) == Some(&Value::Bool(true)),
        _ => false,
    }
}

fn single_key(value: &Value) -> Option<(&String, &Value)> {
    match value {
        Value::Object(map) if map.len() == 1 => map.iter().next(),
        _ => None,
    }
}

fn encode_side(value: Value) -> Value {
    match single_key(&value) {
        Some((key, _)) if key == ABSENT_MARKER_KEY || key == ESCAPE_KEY => {
            let mut wrapper = serde_json::Map::new();
            wrapper.insert(ESCAPE_KEY.to_string(), value);
            Value::Object(wrapper)
        }
        _ => value,
    }
}

fn decode_side(value: Value) -> Option<Value> {
    if is_absent_marker(&value) {
        return None;
    }
    match value {
        Value::Object(mut map) if map.len() == 1 && map.contains_key(ESCAPE_KEY) => {
            map.remove(ESCAPE_KEY)
        }
        other => Some(other),
    }
}

/// The change to a single top-level field.
///
/// The writer always emits the `[old, new]` pair, additions included, rather
/// than the older bare-value form for added fields. The reader accepts both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "Value", try_from = "Value")]
pub enum FieldChange {
    /// Field did not exist before.
    Added { new: Value },
    /// Field existed on both sides with different values.
    Changed { old: Value, new: Value },
    /// Field no longer exists.
    Removed { old: Value },
}

impl FieldChange {
    /// The value before the change, if the field existed.
    pub fn old(&self) -> Option<&Value> {
        match self {
            FieldChange::Added { .. } => None,
            FieldChange::Changed { old, .. } | FieldChange::Removed { old } => Some(old),
        }
    }

    /// The value after the change, if the field still exists.
    pub fn new_value(&self) -> Option<&Value> {
        match self {
            FieldChange::Removed { .. } => None,
            FieldChange::Changed { new, .. } | FieldChange::Added { new } => Some(new),
        }
    }

    /// The same change, pointing the other way.
    pub fn invert(&self) -> FieldChange {
        match self {
            FieldChange::Added { new } => FieldChange::Removed { old: new.clone() },
            FieldChange::Removed { old } => FieldChange::Added { new: old.clone() },
            FieldChange::Changed { old, new } => FieldChange::Changed {
                old: new.clone(),
                new: old.clone(),
            },
        }
    }

    fn from_sides(old: Option<Value>, new: Option<Value>) -> Option<Self> {
        match (old, new) {
            (None, None) => None,
            (None, Some(new)) => Some(FieldChange::Added { new }),
            (Some(old), None) => Some(FieldChange::Removed { old }),
            (Some(old), Some(new)) => Some(FieldChange::Changed { old, new }),
        }
    }
}

impl From<FieldChange> for Value {
    fn from(change: FieldChange) -> Self {
        let (old, new) = match change {
            FieldChange::Added { new } => (absent_marker(), encode_side(new)),
            FieldChange::Changed { old, new } => (encode_side(old), encode_side(new)),
            FieldChange::Removed { old } => (encode_side(old), absent_marker()),
        };
        Value::Array(vec![old, new])
    }
}

impl TryFrom<Value> for FieldChange {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(pair) if pair.len() == 2 => {
                let mut sides = pair.into_iter().map(decode_side);
                let old = sides.next().flatten();
                let new = sides.next().flatten();
                FieldChange::from_sides(old, new)
                    .ok_or_else(|| "change with both sides absent".to_string())
            }
            value if is_absent_marker(&value) => Err("bare absent marker is not a change".into()),
            new => Ok(FieldChange::Added { new }),
        }
    }
}

/// A minimal, deterministic set of field changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff {
    changes: BTreeMap<String, FieldChange>,
}

impl Diff {
    /// Create an empty diff.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field changed.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changed fields.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// The change recorded for a field.
    pub fn get(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }

    /// Iterate changes in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldChange)> {
        self.changes.iter()
    }

    /// Names of the changed fields.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    /// Record a change for a field, replacing any earlier one.
    pub fn insert(&mut self, field: impl Into<String>, change: FieldChange) {
        self.changes.insert(field.into(), change);
    }

    /// The diff that undoes this one.
    pub fn invert(&self) -> Diff {
        Diff {
            changes: self
                .changes
                .iter()
                .map(|(field, change)| (field.clone(), change.invert()))
                .collect(),
        }
    }
}

impl FromIterator<(String, FieldChange)> for Diff {
    fn from_iter<I: IntoIterator<Item = (String, FieldChange)>>(iter: I) -> Self {
        Diff {
            changes: iter.into_iter().collect(),
        }
    }
}

/// Compute the field-level change set turning `old` into `new`.
///
/// Fields equal on both sides are omitted, so the result is proportional to
/// the number of changed fields.
pub fn diff(old: &State, new: &State) -> Diff {
    let mut changes = BTreeMap::new();

    for (field, old_value) in old {
        match new.get(field) {
            Some(new_value) if new_value == old_value => {}
            Some(new_value) => {
                changes.insert(
                    field.clone(),
                    FieldChange::Changed {
                        old: old_value.clone(),
                        new: new_value.clone(),
                    },
                );
            }
            None => {
                changes.insert(
                    field.clone(),
                    FieldChange::Removed {
                        old: old_value.clone(),
                    },
                );
            }
        }
    }

    for (field, new_value) in new {
        if !old.contains_key(field) {
            changes.insert(
                field.clone(),
                FieldChange::Added {
                    new: new_value.clone(),
                },
            );
        }
    }

    Diff { changes }
}
