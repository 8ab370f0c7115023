//! The persisted form of a version log.
//!
//! A log is stored next to its record as a single JSON value:
//!
//! ```text
//! {
//!   "fv": 1,
//!   "v": 2,
//!   "h": [
//!     {"v": 1, "ts": 1000, "c": {"name": "a"}, "s": true},
//!     {"v": 2, "ts": 2000, "r": "42", "c": {"name": ["a", "b"]}}
//!   ]
//! }
//! ```
//!
//! `fv` is optional on read; data without it is taken to be the current
//! format. Serialization is deterministic: states and diffs are ordered maps.

use crate::{
    config::PendingUpgrade,
    diff::{Diff, FieldChange},
    error::Result,
    log::{LogEntry, Payload, VersionLog},
    state::{json_type_name, state_from_value, state_to_value},
    Error, FormatVersion, ResponsibleId, Timestamp, Version,
};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// Format version written by this engine.
pub const FORMAT_VERSION: FormatVersion = 1;

fn current_format() -> FormatVersion {
    FORMAT_VERSION
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Accepts string or numeric actor ids; numbers are kept as their decimal text.
fn deserialize_responsible<'de, D>(deserializer: D) -> std::result::Result<Option<ResponsibleId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) => Ok(Some(id)),
        Some(Value::Number(id)) => Ok(Some(id.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "responsible must be a string or number, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Wire shape of a single entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub v: Version,
    pub ts: Timestamp,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_responsible"
    )]
    pub r: Option<ResponsibleId>,
    pub c: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub s: bool,
}

impl From<LogEntry> for RawEntry {
    fn from(entry: LogEntry) -> Self {
        let (c, s) = match entry.payload() {
            Payload::Snapshot(state) => (state_to_value(state), true),
            Payload::Diff(diff) => (
                Value::Object(
                    diff.iter()
                        .map(|(field, change)| (field.clone(), Value::from(change.clone())))
                        .collect(),
                ),
                false,
            ),
        };
        RawEntry {
            v: entry.version(),
            ts: entry.timestamp(),
            r: entry.responsible().map(str::to_string),
            c,
            s,
        }
    }
}

impl TryFrom<RawEntry> for LogEntry {
    type Error = Error;

    fn try_from(raw: RawEntry) -> Result<Self> {
        if raw.s {
            let state = state_from_value(raw.c)?;
            return Ok(LogEntry::snapshot(raw.v, raw.ts, raw.r, state));
        }

        let changes = match raw.c {
            Value::Object(map) => map
                .into_iter()
                .map(|(field, value)| {
                    FieldChange::try_from(value)
                        .map(|change| (field.clone(), change))
                        .map_err(|e| {
                            Error::InvalidLogData(format!(
                                "field `{}` in version {}: {}",
                                field, raw.v, e
                            ))
                        })
                })
                .collect::<Result<Diff>>()?,
            other => {
                return Err(Error::InvalidLogData(format!(
                    "diff of version {} must be an object, got {}",
                    raw.v,
                    json_type_name(&other)
                )))
            }
        };
        Ok(LogEntry::diff(raw.v, raw.ts, raw.r, changes))
    }
}

/// A version log in its stored form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogData {
    /// Format version the data was written with
    #[serde(rename = "fv", default = "current_format")]
    pub format_version: FormatVersion,
    /// Current version
    #[serde(rename = "v")]
    pub version: Version,
    /// Entries, oldest first
    #[serde(rename = "h")]
    pub history: Vec<LogEntry>,
}

impl LogData {
    /// Capture a log for storage.
    pub fn from_log(log: &VersionLog) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            version: log.current_version(),
            history: log.entries().to_vec(),
        }
    }

    /// Check the format version against the engine's, following `policy`.
    pub fn check_format(&self, policy: PendingUpgrade) -> Result<()> {
        if self.format_version == FORMAT_VERSION {
            return Ok(());
        }
        match policy {
            PendingUpgrade::Raise => Err(Error::FormatMismatch {
                expected: FORMAT_VERSION,
                actual: self.format_version,
            }),
            PendingUpgrade::Warn => {
                warn!(
                    expected = FORMAT_VERSION,
                    actual = self.format_version,
                    "log data format differs from engine format, loading anyway"
                );
                Ok(())
            }
            PendingUpgrade::Ignore => Ok(()),
        }
    }

    /// Turn stored data back into a validated log.
    pub fn into_log(self, policy: PendingUpgrade) -> Result<VersionLog> {
        self.check_format(policy)?;

        let log = VersionLog::from_entries(self.history)?;
        if log.current_version() != self.version {
            return Err(Error::InvariantViolation(format!(
                "stored current version {} but last entry is version {}",
                self.version,
                log.current_version()
            )));
        }
        Ok(log)
    }

    /// Serialize to a JSON value.
    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| Error::InvalidLogData(e.to_string()))
    }

    /// Deserialize from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::InvalidLogData(e.to_string()))
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidLogData(e.to_string()))
    }

    /// Serialize to pretty JSON with deterministic ordering.
    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::InvalidLogData(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidLogData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogPolicy;
    use crate::state::State;
    use serde_json::json;

    fn named(name: &str) -> State {
        state_from_value(json!({ "name": name })).unwrap()
    }

    fn two_version_log() -> VersionLog {
        let mut log = VersionLog::genesis(named("a"), 1000, None);
        log.append(
            &named("a"),
            &named("b"),
            Some("42"),
            false,
            2000,
            &LogPolicy::default(),
        )
        .unwrap();
        log
    }

    #[test]
    fn wire_shape() {
        let data = LogData::from_log(&two_version_log());
        assert_eq!(
            data.to_value().unwrap(),
            json!({
                "fv": 1,
                "v": 2,
                "h": [
                    {"v": 1, "ts": 1000, "c": {"name": "a"}, "s": true},
                    {"v": 2, "ts": 2000, "r": "42", "c": {"name": ["a", "b"]}}
                ]
            })
        );
    }

    #[test]
    fn json_roundtrip() {
        let log = two_version_log();
        let json = LogData::from_log(&log).to_json().unwrap();

        let restored = LogData::from_json(&json)
            .unwrap()
            .into_log(PendingUpgrade::Raise)
            .unwrap();
        assert_eq!(restored, log);
    }

    #[test]
    fn reads_data_without_format_version() {
        let data = LogData::from_value(json!({
            "v": 2,
            "h": [
                {"v": 1, "ts": 1000, "c": {"name": "a"}, "s": true},
                {"v": 2, "ts": 2000, "r": 7, "c": {"name": ["a", "b"], "age": 3}}
            ]
        }))
        .unwrap();

        assert_eq!(data.format_version, FORMAT_VERSION);
        let log = data.into_log(PendingUpgrade::Raise).unwrap();
        assert_eq!(log.last().responsible(), Some("7"));
        assert_eq!(
            log.head_state().unwrap(),
            state_from_value(json!({"name": "b", "age": 3})).unwrap()
        );
    }

    #[test]
    fn format_mismatch_follows_policy() {
        let mut data = LogData::from_log(&two_version_log());
        data.format_version = 2;

        assert_eq!(
            data.clone().into_log(PendingUpgrade::Raise),
            Err(Error::FormatMismatch {
                expected: 1,
                actual: 2
            })
        );
        assert!(data.clone().into_log(PendingUpgrade::Warn).is_ok());
        assert!(data.into_log(PendingUpgrade::Ignore).is_ok());
    }

    #[test]
    fn stale_current_version_is_rejected() {
        let mut data = LogData::from_log(&two_version_log());
        data.version = 5;

        let result = data.into_log(PendingUpgrade::Ignore);
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn malformed_entries_are_rejected() {
        let not_object = LogData::from_value(json!({
            "v": 1,
            "h": [{"v": 1, "ts": 1000, "c": [1, 2], "s": true}]
        }));
        assert!(matches!(not_object, Err(Error::InvalidLogData(_))));

        let bad_responsible = LogData::from_value(json!({
            "v": 1,
            "h": [{"v": 1, "ts": 1000, "r": [1], "c": {}, "s": true}]
        }));
        assert!(matches!(bad_responsible, Err(Error::InvalidLogData(_))));
    }

    #[test]
    fn deterministic_serialization() {
        let a = LogData::from_log(&VersionLog::genesis(
            state_from_value(json!({"z": 1, "a": 2})).unwrap(),
            1000,
            None,
        ));
        let b = LogData::from_log(&VersionLog::genesis(
            state_from_value(json!({"a": 2, "z": 1})).unwrap(),
            1000,
            None,
        ));
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }
}
