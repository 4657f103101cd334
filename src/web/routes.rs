//! Read-side HTTP routes: record queries, roster, statistics and database introspection

use axum::{
    extract::{Path, Query, State},
    response::Html,
    Json,
};
use axum_extra::extract::WithRejection;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{error::ApiError, AppState};
use crate::db::LocationFilter;

/// Serve the dashboard page
pub async fn index() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let records = state.db.get_total_count().await?;
    Ok(Json(json!({ "status": "ok", "records": records })))
}

fn default_limit() -> i64 {
    100
}

fn default_hours() -> i64 {
    24
}

#[derive(Debug, Deserialize)]
pub struct LocationsQuery {
    pub date: Option<String>,
    pub machine: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// `GET /api/locations[?machine=..|?date=YYYY-MM-DD][&limit=..][&offset=..]`
pub async fn list_locations(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<LocationsQuery>, ApiError>,
) -> Result<Json<Value>, ApiError> {
    let filter = LocationFilter::select(query.machine.as_deref(), query.date.as_deref(), query.offset);
    let rows = state.db.find_locations(&filter, query.limit).await?;

    Ok(Json(json!({
        "success": true,
        "count": rows.len(),
        "filters": {
            "date": query.date,
            "machine": query.machine,
            "limit": query.limit,
            "offset": query.offset,
        },
        "data": rows,
    })))
}

#[derive(Debug, Deserialize)]
pub struct MachineWindowQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default = "default_hours")]
    pub hours: i64,
}

/// `GET /api/locations/machine/:name[?hours=..][&limit=..]`
pub async fn machine_locations(
    State(state): State<Arc<AppState>>,
    WithRejection(Path(machine), _): WithRejection<Path<String>, ApiError>,
    WithRejection(Query(query), _): WithRejection<Query<MachineWindowQuery>, ApiError>,
) -> Result<Json<Value>, ApiError> {
    let rows = state
        .db
        .get_recent_for_machine(&machine, query.hours, query.limit)
        .await?;

    Ok(Json(json!({
        "success": true,
        "machine_name": machine,
        "hours": query.hours,
        "limit": query.limit,
        "count": rows.len(),
        "data": rows,
    })))
}

/// `GET /api/machines`
pub async fn list_machines(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let machines = state.db.get_machines().await?;
    Ok(Json(json!({
        "success": true,
        "count": machines.len(),
        "data": machines,
    })))
}

/// `GET /api/stats`
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let stats = state.db.get_stats().await?;
    Ok(Json(json!({ "success": true, "data": stats })))
}

/// `GET /api/database/size`
pub async fn database_size(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let size = state.db.get_database_size().await?;
    Ok(Json(json!({ "success": true, "data": size })))
}

/// `GET /api/database/info`
pub async fn database_info(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let info = state.db.get_database_info().await?;
    Ok(Json(json!({ "success": true, "data": info })))
}
