//! HTTP route handlers.
//!
//! Each sub-module corresponds to an API endpoint group. The real control
//! surface is the WebSocket relay; these endpoints cover status polling and
//! device lifecycle for the dashboard.

pub mod lifecycle;
pub mod status;
