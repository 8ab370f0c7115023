//! A versioned record: current state plus its embedded history.

use crate::{
    config::EngineConfig,
    diff::{diff, Diff},
    error::Result,
    log::VersionLog,
    persist::LogData,
    resolver::{resolve_version, Query},
    session::Session,
    state::State,
    Error, ResponsibleId, Timestamp, Version,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Read-only projection of a record at some point in its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructedView {
    /// Version the view was rebuilt at; `None` when the record has no log
    pub version: Option<Version>,
    /// When that version was written
    pub timestamp: Option<Timestamp>,
    /// Who wrote it
    pub responsible: Option<ResponsibleId>,
    /// The state at that version
    pub state: State,
}

/// A record whose state changes are logged.
///
/// The log is created by the first logged write and lives as long as the
/// record. The materialized state and the log head agree except after writes
/// made with logging suppressed.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    state: State,
    log: Option<VersionLog>,
    /// State at the log's current version, kept to avoid replaying on every write
    head: State,
    config: EngineConfig,
}

impl Record {
    /// Create an empty record with no history.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_state(State::new(), config)
    }

    /// Wrap an existing state that has never been logged.
    pub fn with_state(state: State, config: EngineConfig) -> Self {
        Self {
            state,
            log: None,
            head: State::new(),
            config,
        }
    }

    /// Rebuild a record from its stored state and log data.
    ///
    /// A null or missing log means the record has no history yet. The whole
    /// log is replayed once, so corruption surfaces here rather than later.
    pub fn load(state: State, log_data: Option<Value>, config: EngineConfig) -> Result<Self> {
        let log = match log_data {
            None | Some(Value::Null) => None,
            Some(value) => Some(LogData::from_value(value)?.into_log(config.on_pending_upgrade)?),
        };
        let head = match &log {
            Some(log) => log.head_state()?,
            None => State::new(),
        };
        Ok(Self {
            state,
            log,
            head,
            config,
        })
    }

    /// The current materialized state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// The history, if any write has been logged.
    pub fn log(&self) -> Option<&VersionLog> {
        self.log.as_ref()
    }

    /// The configuration this record was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current version, if any write has been logged.
    pub fn version(&self) -> Option<Version> {
        self.log.as_ref().map(VersionLog::current_version)
    }

    /// The log in its stored form.
    pub fn log_data(&self) -> Option<LogData> {
        self.log.as_ref().map(LogData::from_log)
    }

    /// Replace the state, logging the change according to the session's flags.
    ///
    /// Returns the new version, or `None` when nothing was logged (logging
    /// suppressed, or a no-op write).
    pub fn update(
        &mut self,
        new_state: State,
        timestamp: Timestamp,
        session: &Session,
    ) -> Result<Option<Version>> {
        let flags = session.flags();

        if flags.logging_suppressed {
            debug!("logging suppressed, state replaced without history");
            self.state = new_state;
            return Ok(None);
        }

        let version = match &mut self.log {
            None => {
                self.log = Some(VersionLog::genesis(
                    new_state.clone(),
                    timestamp,
                    flags.responsible,
                ));
                Some(1)
            }
            Some(log) => log
                .append(
                    &self.head,
                    &new_state,
                    flags.responsible.as_deref(),
                    flags.full_snapshot,
                    timestamp,
                    &self.config.log,
                )?
                .map(|entry| entry.version()),
        };

        self.head = new_state.clone();
        self.state = new_state;
        Ok(version)
    }

    /// The record as it was at `query`.
    ///
    /// Without a log this is the current state or nothing, per
    /// [`EngineConfig::view_without_log`]. A timestamp before the first entry
    /// is an error or nothing, per [`EngineConfig::missing_time`].
    pub fn at(&self, query: Query) -> Result<Option<ReconstructedView>> {
        let Some(log) = &self.log else {
            return Ok(self.config.view_without_log.then(|| ReconstructedView {
                version: None,
                timestamp: None,
                responsible: None,
                state: self.state.clone(),
            }));
        };

        let Some(version) = resolve_version(log, query, self.config.missing_time)? else {
            return Ok(None);
        };

        let entry = log.entry_at(version)?;
        Ok(Some(ReconstructedView {
            version: Some(version),
            timestamp: Some(entry.timestamp()),
            responsible: entry.responsible().map(str::to_string),
            state: log.reconstruct(version)?,
        }))
    }

    /// Field-level changes from `query` to the current logged version.
    ///
    /// A record without a log has no changes. A timestamp before the log
    /// (with [`MissingTime::Absent`](crate::MissingTime::Absent)) diffs from
    /// an empty state.
    pub fn diff_from(&self, query: Query) -> Result<Diff> {
        let Some(log) = &self.log else {
            return Ok(Diff::new());
        };

        match resolve_version(log, query, self.config.missing_time)? {
            Some(version) => log.diff_since(version),
            None => Ok(diff(&State::new(), &self.head)),
        }
    }

    /// Drop all history, keeping the current state as version 1.
    pub fn reset_log_data(&mut self, timestamp: Timestamp, session: &Session) {
        let responsible = session.flags().responsible;
        match self.log.as_mut() {
            Some(log) => log.reset(self.state.clone(), responsible.as_deref(), timestamp),
            None => {
                self.log = Some(VersionLog::genesis(
                    self.state.clone(),
                    timestamp,
                    responsible,
                ))
            }
        }
        self.head = self.state.clone();
        debug!("log data reset");
    }

    /// Append a full snapshot of the current state right away.
    pub fn create_logidze_snapshot(
        &mut self,
        timestamp: Timestamp,
        session: &Session,
    ) -> Result<Version> {
        let responsible = session.flags().responsible;

        let version = match &mut self.log {
            None => {
                self.log = Some(VersionLog::genesis(
                    self.state.clone(),
                    timestamp,
                    responsible,
                ));
                1
            }
            Some(log) => log
                .checkpoint(
                    &self.state,
                    responsible.as_deref(),
                    timestamp,
                    &self.config.log,
                )?
                .version(),
        };

        self.head = self.state.clone();
        Ok(version)
    }

    /// Return to the previous version, following [`EngineConfig::append_on_undo`].
    pub fn undo(&mut self, timestamp: Timestamp, session: &Session) -> Result<State> {
        let responsible = session.flags().responsible;
        let append = self.config.append_on_undo;
        let log = self.log.as_mut().ok_or(Error::NoHistory)?;

        let state = log.undo(append, responsible.as_deref(), timestamp, &self.config.log)?;
        self.adopt(state.clone());
        Ok(state)
    }

    /// Move to any retained version, following [`EngineConfig::append_on_undo`].
    pub fn switch_to(
        &mut self,
        version: Version,
        timestamp: Timestamp,
        session: &Session,
    ) -> Result<State> {
        let responsible = session.flags().responsible;
        let append = self.config.append_on_undo;
        let log = self.log.as_mut().ok_or(Error::NoHistory)?;

        let state = log.switch_to(
            version,
            append,
            responsible.as_deref(),
            timestamp,
            &self.config.log,
        )?;
        self.adopt(state.clone());
        Ok(state)
    }

    fn adopt(&mut self, state: State) {
        self.head = state.clone();
        self.state = state;
    }
}
