//! # Verlog Engine
//!
//! Embedded change history for JSON-like records.
//!
//! Every logged write to a record appends an entry to a log stored alongside
//! it. Any retained version can be rebuilt, compared with the current one, or
//! restored, all from the record alone.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never touches files, network or clocks; timestamps are passed in
//! - **Deterministic**: states and diffs are ordered maps, so serialized logs are byte-stable
//! - **Self-contained**: a record's history travels with the record
//!
//! ## Core Concepts
//!
//! ### Version Log
//!
//! A [`VersionLog`] is an ordered list of [`LogEntry`] values. Each entry is
//! either a full [`Payload::Snapshot`] of the state or a [`Payload::Diff`]
//! against the previous version. The first entry is always a snapshot.
//!
//! ### Diffs
//!
//! A [`Diff`] maps field names to a [`FieldChange`]: added, changed or
//! removed. Diffs can be inverted, which is how undo walks backwards.
//!
//! ### Sessions
//!
//! A [`Session`] scopes how writes are logged: suppressed, forced to full
//! snapshots, or attributed to a responsible actor.
//!
//! ## Quick Start
//!
//! ```rust
//! use verlog_engine::{EngineConfig, Query, Record, Session, State};
//! use serde_json::json;
//!
//! let session = Session::new();
//! let mut record = Record::new(EngineConfig::default());
//!
//! let state = |name: &str| -> State {
//!     serde_json::from_value(json!({ "name": name })).unwrap()
//! };
//!
//! record.update(state("a"), 1000, &session).unwrap();
//! record.update(state("b"), 2000, &session).unwrap();
//!
//! let view = record.at(Query::Version(1)).unwrap().unwrap();
//! assert_eq!(view.state, state("a"));
//!
//! let changes = record.diff_from(Query::Version(1)).unwrap();
//! assert_eq!(serde_json::to_value(changes).unwrap(), json!({"name": ["a", "b"]}));
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module exposes records to other languages through a C ABI.
//! All data crosses the boundary as JSON strings.
//!
//! ## Persistence
//!
//! [`Record::log_data`] produces a [`LogData`] that serializes to the stored
//! form; [`Record::load`] reads it back, negotiating the format version per
//! [`PendingUpgrade`].

pub mod config;
pub mod diff;
pub mod error;
pub mod ffi;
pub mod log;
pub mod patch;
pub mod persist;
pub mod record;
pub mod resolver;
pub mod session;
pub mod state;

// Re-export main types at crate root
pub use config::{EngineConfig, LogPolicy, MissingTime, PendingUpgrade};
pub use diff::{diff, Diff, FieldChange};
pub use error::Error;
pub use log::{EntryKind, LogEntry, Payload, VersionLog};
pub use patch::{apply, apply_checked, reconstruct, Direction};
pub use persist::{LogData, FORMAT_VERSION};
pub use record::{ReconstructedView, Record};
pub use resolver::{resolve_version, Query};
pub use session::{Session, SessionFlags, SessionGuard};
pub use state::State;

/// Type aliases for clarity
pub type Version = u64;
pub type Timestamp = u64;
pub type ResponsibleId = String;
pub type FormatVersion = u32;
