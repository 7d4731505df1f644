//! Device lifecycle endpoints.
//!
//! `POST /api/emulator/start`, `POST /api/emulator/stop`,
//! `POST /api/linux/start`, `POST /api/linux/stop`, `POST /api/linux/reset`
//! — drive the managed devices. Each responds with the device's state after
//! the transition; connected clients learn about it through the status
//! broadcast, not from these responses.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// `POST /api/emulator/start`.
pub async fn emulator_start(State(state): State<AppState>) -> Json<Value> {
    let result = state.emulator.start().await;
    Json(json!({ "emulator": result.as_str() }))
}

/// `POST /api/emulator/stop`.
pub async fn emulator_stop(State(state): State<AppState>) -> Json<Value> {
    let result = state.emulator.stop().await;
    Json(json!({ "emulator": result.as_str() }))
}

/// `POST /api/linux/start`.
pub async fn linux_start(State(state): State<AppState>) -> Json<Value> {
    let result = state.linux.start().await;
    Json(json!({ "linux": result.as_str() }))
}

/// `POST /api/linux/stop`.
pub async fn linux_stop(State(state): State<AppState>) -> Json<Value> {
    let result = state.linux.stop().await;
    Json(json!({ "linux": result.as_str() }))
}

/// `POST /api/linux/reset` — restart the container in place. Useful when the
/// desktop session wedges without tearing the container down.
pub async fn linux_reset(State(state): State<AppState>) -> Json<Value> {
    let result = state.linux.reset().await;
    Json(json!({ "linux": result.as_str() }))
}
