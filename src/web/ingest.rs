//! `POST /api/location`: validate and persist one location report

use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::{extract::WithRejection, headers::UserAgent, TypedHeader};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{auth::authorize, error::ApiError, extract::ClientAddr, AppState};
use crate::db::NewLocation;

/// Report body as sent by clients. Everything is optional at this stage.
#[derive(Debug, Default, Deserialize)]
pub struct LocationReport {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub timestamp: Option<String>,
    pub machine_name: Option<String>,
    pub user_name: Option<String>,
    pub location_source: Option<String>,
    pub public_ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub accuracy: Option<f64>,
    pub speed: Option<f64>,
    #[serde(rename = "ApiKey")]
    pub api_key: Option<String>,
}

/// What the server knows about the caller, independent of the body
#[derive(Debug, Clone)]
pub struct Origin {
    pub server_ip: String,
    pub user_agent: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Turn a report into an insertable row, or name the required fields it lacks.
///
/// Zero coordinates and an empty machine name count as missing.
pub fn validate(report: LocationReport, origin: Origin, now: DateTime<Utc>) -> Result<NewLocation, ApiError> {
    let latitude = report.latitude.filter(|v| *v != 0.0);
    let longitude = report.longitude.filter(|v| *v != 0.0);
    let machine_name = non_empty(report.machine_name);

    let (Some(latitude), Some(longitude), Some(machine_name)) = (latitude, longitude, machine_name.clone()) else {
        let missing: Vec<&str> = [
            ("latitude", latitude.is_none()),
            ("longitude", longitude.is_none()),
            ("machine_name", machine_name.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        return Err(ApiError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )));
    };

    let now = now.to_rfc3339_opts(SecondsFormat::Millis, true);

    Ok(NewLocation {
        latitude,
        longitude,
        altitude: report.altitude.unwrap_or(0.0),
        timestamp: non_empty(report.timestamp).unwrap_or_else(|| now.clone()),
        machine_name,
        user_name: non_empty(report.user_name),
        location_source: non_empty(report.location_source).unwrap_or_else(|| "Unknown".to_string()),
        public_ip: non_empty(report.public_ip),
        city: non_empty(report.city),
        country: non_empty(report.country),
        accuracy: report.accuracy,
        speed: report.speed,
        received_at: now,
        server_ip: origin.server_ip,
        user_agent: non_empty(origin.user_agent).unwrap_or_else(|| "Unknown".to_string()),
    })
}

pub async fn create_location(
    State(state): State<Arc<AppState>>,
    ClientAddr(ip): ClientAddr,
    headers: HeaderMap,
    user_agent: Option<TypedHeader<UserAgent>>,
    WithRejection(Json(report), _): WithRejection<Json<LocationReport>, ApiError>,
) -> Result<Json<Value>, ApiError> {
    authorize(state.api_key.as_deref(), &headers, report.api_key.as_deref(), &ip)?;

    let origin = Origin {
        server_ip: ip.clone(),
        user_agent: user_agent.map(|TypedHeader(ua)| ua.as_str().to_string()),
    };
    let location = validate(report, origin, Utc::now())?;

    let id = state.db.insert_location(&location).await?;

    tracing::info!(
        "Location saved: id={} machine={} lat={} lon={} from {}",
        id,
        location.machine_name,
        location.latitude,
        location.longitude,
        ip
    );

    Ok(Json(json!({
        "success": true,
        "id": id,
        "message": "Location data saved successfully",
        "data": {
            "latitude": location.latitude,
            "longitude": location.longitude,
            "machine_name": location.machine_name,
        }
    })))
}
