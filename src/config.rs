//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables** — `DEVBRIDGE_LISTEN`, `DEVBRIDGE_GRPC_ADDR`,
//!    `DEVBRIDGE_ADB_PATH`
//! 2. **Config file** — path via `--config <path>`, or `devbridge.toml` in CWD
//! 3. **Compiled defaults** — see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:3000"
//! public_dir = "web/public"
//!
//! [emulator]
//! grpc_addr = "127.0.0.1:8554"
//! adb_path = "adb"
//! start_command = "scripts/start-emulator.sh"
//! stop_command = "adb emu kill"
//!
//! [linux]
//! container = "webtop"
//! display = ":1"
//! novnc_port = 7900
//! start_command = "docker compose up -d webtop"
//! stop_command = "docker compose stop webtop"
//!
//! [stream]
//! max_width = 540
//! min_frame_interval_ms = 16   # ~60 FPS cap
//!
//! [gesture]
//! idle_timeout_ms = 150
//!
//! [reconnect]
//! initial_delay_ms = 1000
//! max_delay_ms = 10000
//! ```

use serde::Deserialize;
use std::path::Path;

use crate::gesture::GestureConfig;

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub emulator: EmulatorConfig,
    #[serde(default)]
    pub linux: LinuxConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub gesture: GestureTuning,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:3000`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Directory of static browser assets served at `/`.
    #[serde(default = "default_public_dir")]
    pub public_dir: String,
}

/// Android emulator target.
#[derive(Debug, Clone, Deserialize)]
pub struct EmulatorConfig {
    /// gRPC control endpoint of the emulator (default `127.0.0.1:8554`).
    #[serde(default = "default_grpc_addr")]
    pub grpc_addr: String,
    /// adb binary for the persistent input shell (default `adb` on PATH).
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    /// Shell command that launches the emulator. Empty disables the start op.
    #[serde(default)]
    pub start_command: String,
    /// Shell command that tears the emulator down.
    #[serde(default = "default_emulator_stop")]
    pub stop_command: String,
}

/// Containerized Linux desktop target.
#[derive(Debug, Clone, Deserialize)]
pub struct LinuxConfig {
    /// Container name used for `docker exec` (default `webtop`).
    #[serde(default = "default_container")]
    pub container: String,
    /// X display inside the container, prefixed onto xdotool/xclip commands.
    #[serde(default = "default_display")]
    pub display: String,
    /// noVNC port reported to the browser (default 7900).
    #[serde(default = "default_novnc_port")]
    pub novnc_port: u16,
    /// Shell command that starts the container. Empty disables the start op.
    #[serde(default)]
    pub start_command: String,
    /// Shell command that stops the container.
    #[serde(default = "default_linux_stop")]
    pub stop_command: String,
    /// Shell command that restarts the desktop container.
    #[serde(default = "default_linux_reset")]
    pub reset_command: String,
    /// Probe command; exit 0 once the desktop is up.
    #[serde(default = "default_linux_probe")]
    pub probe_command: String,
}

/// Frame stream tuning.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StreamConfig {
    /// Downscale target; devices whose shorter side is at or below this
    /// stream at native resolution (default 540).
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// Minimum interval between frames forwarded to one client (default 16 ms).
    #[serde(default = "default_min_frame_interval_ms")]
    pub min_frame_interval_ms: u64,
}

/// Gesture tuning (see [`GestureConfig`]) plus the shared idle window.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GestureTuning {
    /// Idle window after which an open gesture is released (default 150 ms).
    #[serde(default = "default_gesture_idle_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "default_scroll_scale")]
    pub scroll_scale: f64,
    #[serde(default = "default_pinch_initial_spread")]
    pub pinch_initial_spread: i32,
    #[serde(default = "default_pinch_step")]
    pub pinch_step: i32,
    #[serde(default = "default_pinch_min_spread")]
    pub pinch_min_spread: i32,
}

impl From<GestureTuning> for GestureConfig {
    fn from(t: GestureTuning) -> Self {
        Self {
            scroll_scale: t.scroll_scale,
            pinch_initial_spread: t.pinch_initial_spread,
            pinch_step: t.pinch_step,
            pinch_min_spread: t.pinch_min_spread,
        }
    }
}

/// Transport reconnection backoff bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReconnectConfig {
    /// Backoff floor (default 1000 ms).
    #[serde(default = "default_reconnect_initial_ms")]
    pub initial_delay_ms: u64,
    /// Backoff ceiling (default 10 000 ms).
    #[serde(default = "default_reconnect_max_ms")]
    pub max_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}
fn default_public_dir() -> String {
    "web/public".to_string()
}
fn default_grpc_addr() -> String {
    "127.0.0.1:8554".to_string()
}
fn default_adb_path() -> String {
    "adb".to_string()
}
fn default_emulator_stop() -> String {
    "adb emu kill".to_string()
}
fn default_container() -> String {
    "webtop".to_string()
}
fn default_display() -> String {
    ":1".to_string()
}
fn default_novnc_port() -> u16 {
    7900
}
fn default_linux_stop() -> String {
    "docker stop webtop".to_string()
}
fn default_linux_reset() -> String {
    "docker restart webtop".to_string()
}
fn default_linux_probe() -> String {
    "docker exec webtop true".to_string()
}
fn default_max_width() -> u32 {
    540
}
fn default_min_frame_interval_ms() -> u64 {
    16
}
fn default_gesture_idle_ms() -> u64 {
    150
}
fn default_scroll_scale() -> f64 {
    2.0
}
fn default_pinch_initial_spread() -> i32 {
    100
}
fn default_pinch_step() -> i32 {
    20
}
fn default_pinch_min_spread() -> i32 {
    20
}
fn default_reconnect_initial_ms() -> u64 {
    1000
}
fn default_reconnect_max_ms() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_dir: default_public_dir(),
        }
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            grpc_addr: default_grpc_addr(),
            adb_path: default_adb_path(),
            start_command: String::new(),
            stop_command: default_emulator_stop(),
        }
    }
}

impl Default for LinuxConfig {
    fn default() -> Self {
        Self {
            container: default_container(),
            display: default_display(),
            novnc_port: default_novnc_port(),
            start_command: String::new(),
            stop_command: default_linux_stop(),
            reset_command: default_linux_reset(),
            probe_command: default_linux_probe(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            min_frame_interval_ms: default_min_frame_interval_ms(),
        }
    }
}

impl Default for GestureTuning {
    fn default() -> Self {
        Self {
            idle_timeout_ms: default_gesture_idle_ms(),
            scroll_scale: default_scroll_scale(),
            pinch_initial_spread: default_pinch_initial_spread(),
            pinch_step: default_pinch_step(),
            pinch_min_spread: default_pinch_min_spread(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_reconnect_initial_ms(),
            max_delay_ms: default_reconnect_max_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file (panics on failure — a missing or
    /// invalid config file is a startup-fatal error). Otherwise looks for
    /// `devbridge.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Self {
        let mut config = if let Some(p) = path {
            let content = std::fs::read_to_string(p)
                .unwrap_or_else(|e| panic!("Failed to read config file {p}: {e}"));
            toml::from_str(&content)
                .unwrap_or_else(|e| panic!("Failed to parse config file {p}: {e}"))
        } else if Path::new("devbridge.toml").exists() {
            let content =
                std::fs::read_to_string("devbridge.toml").expect("Failed to read devbridge.toml");
            toml::from_str(&content).expect("Failed to parse devbridge.toml")
        } else {
            Config::default()
        };

        // Env var overrides
        if let Ok(listen) = std::env::var("DEVBRIDGE_LISTEN") {
            config.server.listen = listen;
        }
        if let Ok(addr) = std::env::var("DEVBRIDGE_GRPC_ADDR") {
            config.emulator.grpc_addr = addr;
        }
        if let Ok(adb) = std::env::var("DEVBRIDGE_ADB_PATH") {
            config.emulator.adb_path = adb;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(config.stream.min_frame_interval_ms, 16);
        assert_eq!(config.gesture.idle_timeout_ms, 150);
        assert_eq!(config.reconnect.initial_delay_ms, 1000);
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            "[emulator]\ngrpc_addr = \"10.0.0.5:8554\"\n\n[stream]\nmax_width = 720\n",
        )
        .unwrap();
        assert_eq!(config.emulator.grpc_addr, "10.0.0.5:8554");
        assert_eq!(config.stream.max_width, 720);
        // Untouched sections keep their defaults.
        assert_eq!(config.linux.novnc_port, 7900);
    }
}
