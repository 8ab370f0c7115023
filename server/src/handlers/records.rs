//! Record handlers - writes, history reads and history maintenance.

use crate::db::{Missing, Repository, StoredRecord};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use verlog_engine::{
    error::Result as EngineResult, Diff, EngineConfig, Query, ReconstructedView, Record, Session,
    State, Timestamp, Version,
};

/// Session scopes a client can ask for on a write.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteOptions {
    /// Change the state without recording history
    pub skip_logging: bool,
    /// Record the write as a full snapshot
    pub full_snapshot: bool,
    /// Attribute this write to an actor other than the request's
    pub responsible: Option<String>,
}

/// Request body for creating or replacing a record's state.
#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    /// The complete new state
    pub state: State,
    #[serde(flatten)]
    pub options: WriteOptions,
}

/// A record's current state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub collection: String,
    pub id: String,
    /// Current version; null until the first logged write
    pub version: Option<Version>,
    pub state: State,
}

impl RecordResponse {
    fn new(collection: &str, id: &str, stored: StoredRecord) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            version: stored.version,
            state: stored.state,
        }
    }
}

/// Response for a write.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResponse {
    #[serde(flatten)]
    pub record: RecordResponse,
    /// Whether the write produced a history entry
    pub logged: bool,
}

/// Response for a diff query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResponse {
    pub id: String,
    /// Version the diff ends at
    pub version: Option<Version>,
    pub changes: Diff,
}

/// Response for a history query.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub id: String,
    pub log_data: Option<Value>,
}

/// Query parameters selecting a point in history.
#[derive(Debug, Default, Deserialize)]
pub struct AtParams {
    pub version: Option<Version>,
    pub time: Option<Timestamp>,
}

impl AtParams {
    pub fn into_query(self) -> Result<Query> {
        one_of(self.version, self.time, "version", "time")
    }
}

/// Query parameters selecting where a diff starts.
#[derive(Debug, Default, Deserialize)]
pub struct DiffParams {
    pub from: Option<Version>,
    pub since: Option<Timestamp>,
}

impl DiffParams {
    pub fn into_query(self) -> Result<Query> {
        one_of(self.from, self.since, "from", "since")
    }
}

/// Query parameters for switching versions.
#[derive(Debug, Deserialize)]
pub struct SwitchParams {
    pub version: Version,
}

fn one_of(
    version: Option<Version>,
    time: Option<Timestamp>,
    version_name: &str,
    time_name: &str,
) -> Result<Query> {
    match (version, time) {
        (Some(version), None) => Ok(Query::Version(version)),
        (None, Some(time)) => Ok(Query::Time(time)),
        _ => Err(AppError::BadRequest(format!(
            "exactly one of `{}` or `{}` is required",
            version_name, time_name
        ))),
    }
}

/// Current time in milliseconds since the epoch.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// Run `f` in a session carrying the request's scopes.
///
/// The request's actor applies to the whole unit of work; an actor named in
/// the body only to this write.
fn scoped<T>(
    request_responsible: Option<&str>,
    options: &WriteOptions,
    f: impl FnOnce(&Session) -> T,
) -> T {
    let session = Session::new();
    let _request = request_responsible.map(|id| session.responsible(id, true));
    let _write = options
        .responsible
        .as_deref()
        .map(|id| session.responsible(id, false));
    let _full = options.full_snapshot.then(|| session.full_snapshot());
    let _quiet = options.skip_logging.then(|| session.suppress_logging());
    f(&session)
}

/// Load a stored record, change it and store the result back.
fn edit<T>(
    stored: &mut StoredRecord,
    config: &EngineConfig,
    f: impl FnOnce(&mut Record) -> EngineResult<T>,
) -> Result<T> {
    let mut record = Record::load(
        std::mem::take(&mut stored.state),
        stored.log_data.take(),
        config.clone(),
    )?;
    let output = f(&mut record)?;

    stored.log_data = record
        .log_data()
        .map(|data| data.to_value())
        .transpose()?;
    stored.version = record.version();
    stored.state = record.state().clone();
    Ok(output)
}

fn load(stored: StoredRecord, config: &EngineConfig) -> Result<Record> {
    Ok(Record::load(stored.state, stored.log_data, config.clone())?)
}

async fn fetch(repo: &Repository, collection: &str, id: &str) -> Result<StoredRecord> {
    repo.fetch(collection, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("record {}/{}", collection, id)))
}

/// Replace a record's state, creating the record if `missing` allows.
pub async fn write_record(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    responsible: Option<String>,
    request: WriteRequest,
    missing: Missing,
) -> Result<WriteResponse> {
    let now = now_millis();
    let config = config.clone();
    let WriteRequest { state, options } = request;

    let (logged, stored) = repo
        .mutate(collection, id, missing, move |stored| {
            let version = edit(stored, &config, |record| {
                scoped(responsible.as_deref(), &options, |session| {
                    record.update(state, now, session)
                })
            })?;
            Ok((version.is_some(), stored.clone()))
        })
        .await?;

    tracing::debug!(collection, id, logged, version = ?stored.version, "record written");
    Ok(WriteResponse {
        record: RecordResponse::new(collection, id, stored),
        logged,
    })
}

/// Apply a history maintenance operation to an existing record.
async fn maintain<F>(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    responsible: Option<String>,
    op: F,
) -> Result<RecordResponse>
where
    F: FnOnce(&mut Record, Timestamp, &Session) -> EngineResult<()> + Send,
{
    let now = now_millis();
    let config = config.clone();

    let stored = repo
        .mutate(collection, id, Missing::Reject, move |stored| {
            edit(stored, &config, |record| {
                scoped(responsible.as_deref(), &WriteOptions::default(), |session| {
                    op(record, now, session)
                })
            })?;
            Ok(stored.clone())
        })
        .await?;

    Ok(RecordResponse::new(collection, id, stored))
}

/// Get a record's current state.
pub async fn get_record(repo: &Repository, collection: &str, id: &str) -> Result<RecordResponse> {
    let stored = fetch(repo, collection, id).await?;
    Ok(RecordResponse::new(collection, id, stored))
}

/// Rebuild a record as it was at `query`.
pub async fn record_at(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    query: Query,
) -> Result<ReconstructedView> {
    let record = load(fetch(repo, collection, id).await?, config)?;
    record
        .at(query)?
        .ok_or_else(|| AppError::NotFound(format!("no version of {}/{} at {:?}", collection, id, query)))
}

/// Changes to a record since `query`.
pub async fn record_diff(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    query: Query,
) -> Result<DiffResponse> {
    let record = load(fetch(repo, collection, id).await?, config)?;
    Ok(DiffResponse {
        id: id.to_string(),
        version: record.version(),
        changes: record.diff_from(query)?,
    })
}

/// A record's stored history.
pub async fn record_history(
    repo: &Repository,
    collection: &str,
    id: &str,
) -> Result<HistoryResponse> {
    let stored = fetch(repo, collection, id).await?;
    Ok(HistoryResponse {
        id: id.to_string(),
        log_data: stored.log_data,
    })
}

/// Return a record to its previous version.
pub async fn undo_record(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    responsible: Option<String>,
) -> Result<RecordResponse> {
    maintain(repo, config, collection, id, responsible, |record, now, session| {
        record.undo(now, session).map(drop)
    })
    .await
}

/// Move a record to any retained version.
pub async fn switch_record(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    responsible: Option<String>,
    version: Version,
) -> Result<RecordResponse> {
    maintain(repo, config, collection, id, responsible, move |record, now, session| {
        record.switch_to(version, now, session).map(drop)
    })
    .await
}

/// Drop a record's history, keeping its current state as version 1.
pub async fn reset_record(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    responsible: Option<String>,
) -> Result<RecordResponse> {
    maintain(repo, config, collection, id, responsible, |record, now, session| {
        record.reset_log_data(now, session);
        Ok(())
    })
    .await
}

/// Append a full snapshot of a record's current state.
pub async fn snapshot_record(
    repo: &Repository,
    config: &EngineConfig,
    collection: &str,
    id: &str,
    responsible: Option<String>,
) -> Result<RecordResponse> {
    maintain(repo, config, collection, id, responsible, |record, now, session| {
        record.create_logidze_snapshot(now, session).map(drop)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(state: Value) -> WriteRequest {
        serde_json::from_value(json!({ "state": state })).unwrap()
    }

    async fn seeded() -> Repository {
        let repo = Repository::memory();
        let config = EngineConfig::default();
        for name in ["a", "b"] {
            write_record(
                &repo,
                &config,
                "notes",
                "n1",
                None,
                write(json!({ "name": name })),
                Missing::Create,
            )
            .await
            .unwrap();
        }
        repo
    }

    #[test]
    fn write_request_options() {
        let request: WriteRequest = serde_json::from_value(json!({
            "state": {"a": 1},
            "skipLogging": true,
            "responsible": "bot"
        }))
        .unwrap();
        assert!(request.options.skip_logging);
        assert!(!request.options.full_snapshot);
        assert_eq!(request.options.responsible.as_deref(), Some("bot"));
    }

    #[test]
    fn query_params_need_exactly_one() {
        let both = AtParams {
            version: Some(1),
            time: Some(1),
        };
        assert!(matches!(both.into_query(), Err(AppError::BadRequest(_))));
        assert!(matches!(
            DiffParams::default().into_query(),
            Err(AppError::BadRequest(_))
        ));
        let since = DiffParams {
            from: None,
            since: Some(5),
        };
        assert_eq!(since.into_query().unwrap(), Query::Time(5));
    }

    #[test]
    fn request_scopes_nest() {
        let options = WriteOptions {
            responsible: Some("inner".into()),
            ..WriteOptions::default()
        };
        scoped(Some("outer"), &options, |session| {
            assert_eq!(session.flags().responsible.as_deref(), Some("inner"));
            session.transaction(|| {
                assert_eq!(session.flags().responsible.as_deref(), Some("outer"));
            });
        });
    }

    #[tokio::test]
    async fn writes_build_history() {
        let repo = seeded().await;
        let config = EngineConfig::default();

        let current = get_record(&repo, "notes", "n1").await.unwrap();
        assert_eq!(current.version, Some(2));

        let first = record_at(&repo, &config, "notes", "n1", Query::Version(1))
            .await
            .unwrap();
        assert_eq!(first.state["name"], "a");

        let diff = record_diff(&repo, &config, "notes", "n1", Query::Version(1))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&diff.changes).unwrap(),
            json!({"name": ["a", "b"]})
        );
    }

    #[tokio::test]
    async fn skip_logging_write() {
        let repo = seeded().await;
        let request: WriteRequest =
            serde_json::from_value(json!({"state": {"name": "q"}, "skipLogging": true})).unwrap();

        let response = write_record(
            &repo,
            &EngineConfig::default(),
            "notes",
            "n1",
            None,
            request,
            Missing::Reject,
        )
        .await
        .unwrap();

        assert!(!response.logged);
        assert_eq!(response.record.version, Some(2));
        assert_eq!(response.record.state["name"], "q");
    }

    #[tokio::test]
    async fn request_actor_is_recorded() {
        let repo = seeded().await;
        let config = EngineConfig::default();
        write_record(
            &repo,
            &config,
            "notes",
            "n1",
            Some("user-3".into()),
            write(json!({"name": "c"})),
            Missing::Reject,
        )
        .await
        .unwrap();

        let view = record_at(&repo, &config, "notes", "n1", Query::Version(3))
            .await
            .unwrap();
        assert_eq!(view.responsible.as_deref(), Some("user-3"));
    }

    #[tokio::test]
    async fn maintenance_operations() {
        let repo = seeded().await;
        let config = EngineConfig::default();

        let undone = undo_record(&repo, &config, "notes", "n1", None).await.unwrap();
        assert_eq!(undone.version, Some(1));
        assert_eq!(undone.state["name"], "a");

        let snapshot = snapshot_record(&repo, &config, "notes", "n1", None).await.unwrap();
        assert_eq!(snapshot.version, Some(2));

        let switched = switch_record(&repo, &config, "notes", "n1", None, 1).await.unwrap();
        assert_eq!(switched.version, Some(1));

        let reset = reset_record(&repo, &config, "notes", "n1", None).await.unwrap();
        assert_eq!(reset.version, Some(1));

        let result = undo_record(&repo, &config, "notes", "n1", None).await;
        assert!(matches!(
            result,
            Err(AppError::Engine(verlog_engine::Error::NoHistory))
        ));
    }

    #[tokio::test]
    async fn missing_records() {
        let repo = Repository::memory();
        let config = EngineConfig::default();

        assert!(matches!(
            get_record(&repo, "notes", "nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            undo_record(&repo, &config, "notes", "nope", None).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            write_record(
                &repo,
                &config,
                "notes",
                "nope",
                None,
                write(json!({})),
                Missing::Reject
            )
            .await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn history_is_raw_log_data() {
        let repo = seeded().await;
        let history = record_history(&repo, "notes", "n1").await.unwrap();
        let data = history.log_data.unwrap();
        assert_eq!(data["v"], 2);
        assert_eq!(data["h"][1]["c"], json!({"name": ["a", "b"]}));
    }
}
