//! Record endpoint routes.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use verlog_engine::ReconstructedView;

use crate::db::Missing;
use crate::error::Result;
use crate::handlers::{
    self, AtParams, DiffParams, DiffResponse, HistoryResponse, RecordResponse, SwitchParams,
    WriteRequest, WriteResponse,
};
use crate::responsible::Responsible;
use crate::AppState;

/// Create record routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/records/{collection}", post(create_handler))
        .route(
            "/records/{collection}/{id}",
            get(get_handler).put(put_handler),
        )
        .route("/records/{collection}/{id}/at", get(at_handler))
        .route("/records/{collection}/{id}/diff", get(diff_handler))
        .route("/records/{collection}/{id}/history", get(history_handler))
        .route("/records/{collection}/{id}/undo", post(undo_handler))
        .route("/records/{collection}/{id}/switch", post(switch_handler))
        .route("/records/{collection}/{id}/reset", post(reset_handler))
        .route("/records/{collection}/{id}/snapshot", post(snapshot_handler))
}

/// POST /records/{collection} - Create a record with a generated id.
async fn create_handler(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Responsible(responsible): Responsible,
    Json(request): Json<WriteRequest>,
) -> Result<(StatusCode, Json<WriteResponse>)> {
    let id = uuid::Uuid::new_v4().to_string();
    let response = handlers::write_record(
        &state.repo,
        &state.config.engine,
        &collection,
        &id,
        responsible,
        request,
        Missing::Create,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// PUT /records/{collection}/{id} - Replace a record's state, creating it if needed.
async fn put_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Responsible(responsible): Responsible,
    Json(request): Json<WriteRequest>,
) -> Result<Json<WriteResponse>> {
    let response = handlers::write_record(
        &state.repo,
        &state.config.engine,
        &collection,
        &id,
        responsible,
        request,
        Missing::Create,
    )
    .await?;
    Ok(Json(response))
}

/// GET /records/{collection}/{id} - Current state and version.
async fn get_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<RecordResponse>> {
    let response = handlers::get_record(&state.repo, &collection, &id).await?;
    Ok(Json(response))
}

/// GET /records/{collection}/{id}/at?version=N | ?time=MS
async fn at_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Query(params): Query<AtParams>,
) -> Result<Json<ReconstructedView>> {
    let query = params.into_query()?;
    let view =
        handlers::record_at(&state.repo, &state.config.engine, &collection, &id, query).await?;
    Ok(Json(view))
}

/// GET /records/{collection}/{id}/diff?from=N | ?since=MS
async fn diff_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Query(params): Query<DiffParams>,
) -> Result<Json<DiffResponse>> {
    let query = params.into_query()?;
    let response =
        handlers::record_diff(&state.repo, &state.config.engine, &collection, &id, query).await?;
    Ok(Json(response))
}

/// GET /records/{collection}/{id}/history - Stored log data.
async fn history_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<HistoryResponse>> {
    let response = handlers::record_history(&state.repo, &collection, &id).await?;
    Ok(Json(response))
}

/// POST /records/{collection}/{id}/undo
async fn undo_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Responsible(responsible): Responsible,
) -> Result<Json<RecordResponse>> {
    let response =
        handlers::undo_record(&state.repo, &state.config.engine, &collection, &id, responsible)
            .await?;
    Ok(Json(response))
}

/// POST /records/{collection}/{id}/switch?version=N
async fn switch_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Responsible(responsible): Responsible,
    Query(params): Query<SwitchParams>,
) -> Result<Json<RecordResponse>> {
    let response = handlers::switch_record(
        &state.repo,
        &state.config.engine,
        &collection,
        &id,
        responsible,
        params.version,
    )
    .await?;
    Ok(Json(response))
}

/// POST /records/{collection}/{id}/reset
async fn reset_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Responsible(responsible): Responsible,
) -> Result<Json<RecordResponse>> {
    let response =
        handlers::reset_record(&state.repo, &state.config.engine, &collection, &id, responsible)
            .await?;
    Ok(Json(response))
}

/// POST /records/{collection}/{id}/snapshot
async fn snapshot_handler(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Responsible(responsible): Responsible,
) -> Result<Json<RecordResponse>> {
    let response =
        handlers::snapshot_record(&state.repo, &state.config.engine, &collection, &id, responsible)
            .await?;
    Ok(Json(response))
}
