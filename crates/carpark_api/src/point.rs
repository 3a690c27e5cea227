use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use carpark_core::ParkError;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}

fn park_error_to_response(error: ParkError) -> Response {
    let status = match error {
        ParkError::NotFound { .. } => StatusCode::BAD_REQUEST,
        ParkError::CapacityExceeded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn join_error_to_response(error: tokio::task::JoinError) -> Response {
    tracing::error!("Park operation did not complete: {}", error);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Internal error".into(),
        }),
    )
        .into_response()
}

/// A car plugged in at a charging point
pub async fn plug_in(State(app_state): State<AppState>, Path(name): Path<String>) -> Response {
    let result = app_state
        .with_park({
            let name = name.clone();
            move |park| park.plug_in(&name)
        })
        .await;
    match result {
        Ok(Ok(_)) => format!("OK, successfully plugged in {name}").into_response(),
        Ok(Err(error)) => park_error_to_response(error),
        Err(error) => join_error_to_response(error),
    }
}

/// A car left a charging point
pub async fn plug_off(State(app_state): State<AppState>, Path(name): Path<String>) -> Response {
    let result = app_state
        .with_park({
            let name = name.clone();
            move |park| park.plug_off(&name)
        })
        .await;
    match result {
        Ok(Ok(_)) => format!("OK, successfully plugged off {name}").into_response(),
        Ok(Err(error)) => park_error_to_response(error),
        Err(error) => join_error_to_response(error),
    }
}

/// The current a charging point may draw
pub async fn get_allowed_current(
    State(app_state): State<AppState>,
    Path(name): Path<String>,
) -> Response {
    match app_state
        .with_park(move |park| park.get_allowed_current(&name))
        .await
    {
        Ok(Ok(current)) => current.to_string().into_response(),
        Ok(Err(error)) => park_error_to_response(error),
        Err(error) => join_error_to_response(error),
    }
}
