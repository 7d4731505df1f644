//! Status endpoint.
//!
//! `GET /api/status` — current state of both devices plus relay vitals, for
//! dashboard polling and health checks.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/status` — device states and relay vitals.
pub async fn get_status(State(state): State<AppState>) -> Json<Value> {
    let dims = *state.dims.read().await;
    Json(json!({
        "emulator": state.emulator.state().await.as_str(),
        "linux": state.linux.state().await.as_str(),
        "clients": state.clients.len().await,
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "device": {
            "width": dims.width,
            "height": dims.height,
        },
        "novncPort": state.config.linux.novnc_port,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
