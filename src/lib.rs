#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]

//! devbridge library — the building blocks of the device control relay:
//!
//! - `config` — TOML + env-var configuration
//! - `state` — shared application state and the client registry
//! - `device` — gRPC emulator control channel and wire types
//! - `command` — persistent input shells (adb, container)
//! - `keymap` — browser key events to device input commands
//! - `gesture` — scroll and pinch multi-touch synthesis
//! - `stream` — per-client frame pumps with backpressure and rate cap
//! - `reconnect` — emulator transport recovery with backoff
//! - `lifecycle` — device start/stop/reset management
//! - `routes` — REST API route handlers
//! - `ws` — WebSocket relay protocol handling

pub mod command;
pub mod config;
pub mod device;
pub mod gesture;
pub mod keymap;
pub mod lifecycle;
pub mod reconnect;
pub mod routes;
pub mod state;
pub mod stream;
pub mod ws;

// Re-export key types at crate root for convenience.
pub use config::Config;
pub use state::AppState;
