//! Destructive admin routes. Each needs a literal confirmation token in the body.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{auth::authorize, error::ApiError, extract::ClientAddr, AppState};

pub const CONFIRM_ALL: &str = "DELETE_ALL_DATA";
pub const CONFIRM_MACHINE: &str = "DELETE_MACHINE_DATA";

#[derive(Debug, Default, Deserialize)]
pub struct ConfirmRequest {
    pub confirm: Option<String>,
    #[serde(rename = "ApiKey")]
    pub api_key: Option<String>,
}

fn require_token(body: &ConfirmRequest, token: &str) -> Result<(), ApiError> {
    if body.confirm.as_deref() == Some(token) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!(
            "Confirmation required. Send {{\"confirm\": \"{token}\"}} in the request body"
        )))
    }
}

/// `DELETE /api/admin/clear-database`
pub async fn clear_database(
    State(state): State<Arc<AppState>>,
    ClientAddr(ip): ClientAddr,
    headers: HeaderMap,
    body: Option<Json<ConfirmRequest>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    authorize(state.api_key.as_deref(), &headers, body.api_key.as_deref(), &ip)?;
    require_token(&body, CONFIRM_ALL)?;

    let deleted = state.db.clear_all().await?;
    tracing::warn!("Database cleared by {}: {} records deleted", ip, deleted);

    Ok(Json(json!({
        "success": true,
        "message": "All location data deleted",
        "deleted_count": deleted,
    })))
}

/// `DELETE /api/admin/clear-machine/:name`
pub async fn clear_machine(
    State(state): State<Arc<AppState>>,
    ClientAddr(ip): ClientAddr,
    headers: HeaderMap,
    Path(machine): Path<String>,
    body: Option<Json<ConfirmRequest>>,
) -> Result<Json<Value>, ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    authorize(state.api_key.as_deref(), &headers, body.api_key.as_deref(), &ip)?;
    require_token(&body, CONFIRM_MACHINE)?;

    let deleted = state.db.clear_machine(&machine).await?;
    tracing::warn!(
        "Machine data cleared by {}: {} records deleted for {}",
        ip,
        deleted,
        machine
    );

    Ok(Json(json!({
        "success": true,
        "message": format!("Location data deleted for machine {machine}"),
        "machine_name": machine,
        "deleted_count": deleted,
    })))
}
