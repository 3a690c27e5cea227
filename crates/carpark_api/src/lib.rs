//! Car park API Library
//!
//! This library provides the HTTP API of the car park charging manager.

mod app_state;
pub mod config;
mod park;
mod point;

pub use crate::app_state::AppState;

use axum::{
    Router,
    routing::{get, put},
};
use carpark_core::ChargingPark;
use tower_http::trace::TraceLayer;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Create the application router with all endpoints
pub fn create_app(park: ChargingPark) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/cp/plugin/{name}", put(point::plug_in))
        .route("/cp/plugoff/{name}", put(point::plug_off))
        .route("/cp/current/{name}", get(point::get_allowed_current))
        .route("/park/report", get(park::get_report))
        .route("/park/status", get(park::get_status))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(park))
}
