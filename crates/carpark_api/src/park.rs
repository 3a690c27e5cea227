use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use carpark_core::ChargingPoint;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::point::join_error_to_response;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChargingPointStatus {
    pub name: String,
    pub plugged: bool,
    pub current: u32,
}

impl From<&ChargingPoint> for ChargingPointStatus {
    fn from(point: &ChargingPoint) -> Self {
        ChargingPointStatus {
            name: point.name().to_string(),
            plugged: point.is_plugged(),
            current: point.current(),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkStatus {
    pub charging_points: Vec<ChargingPointStatus>,
}

/// Plain text report, one line per charging point sorted by name
pub async fn get_report(State(app_state): State<AppState>) -> Response {
    tracing::info!("Getting park report");
    match app_state.with_park(|park| park.get_charging_points()).await {
        Ok(points) => points
            .iter()
            .map(|point| format!("{point}\n"))
            .collect::<String>()
            .into_response(),
        Err(error) => join_error_to_response(error),
    }
}

/// Status of every charging point
pub async fn get_status(State(app_state): State<AppState>) -> Response {
    tracing::info!("Getting park status");
    match app_state.with_park(|park| park.get_charging_points()).await {
        Ok(points) => Json(ParkStatus {
            charging_points: points.iter().map(ChargingPointStatus::from).collect(),
        })
        .into_response(),
        Err(error) => join_error_to_response(error),
    }
}
