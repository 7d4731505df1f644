//! Pure message dispatch for the relay socket.
//!
//! Incoming JSON messages are translated into a list of [`Action`]s without
//! touching any transport, so the full gating and translation logic is unit
//! testable. The event loop in [`super`] executes the actions.

use serde_json::Value;

use crate::device::proto::{MouseEvent, Touch, TouchEvent};
use crate::keymap;
use crate::state::DeviceState;

/// What the event loop should do in response to one client message.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Forward a touch event to the emulator.
    SendTouch(TouchEvent),
    /// Forward a mouse event to the emulator.
    SendMouse(MouseEvent),
    /// Set the emulator clipboard, then inject Ctrl+V.
    PasteAndroid(String),
    /// Read the emulator clipboard and reply with a `clipboard` message.
    ReadAndroidClipboard,
    /// One line for the persistent adb shell.
    AdbCommand(String),
    /// Force-stop and relaunch Chrome on the device.
    ResetChrome,
    /// One line for the persistent container shell (run against the desktop
    /// display).
    LinuxCommand(String),
    /// Load the container clipboard, then inject Ctrl+V.
    PasteLinux(String),
    /// Read the container clipboard and reply with a `linux-clipboard`
    /// message.
    ReadLinuxClipboard,
    /// Feed a wheel delta into the session's scroll gesture.
    Scroll { x: f64, y: f64, dx: f64, dy: f64 },
    /// Feed a zoom delta into the session's pinch gesture.
    Pinch { x: f64, y: f64, delta: f64 },
    /// Keepalive reply.
    Pong,
}

fn f64_field(msg: &Value, key: &str) -> Option<f64> {
    msg[key].as_f64()
}

#[allow(clippy::cast_possible_truncation)]
fn i32_field(msg: &Value, key: &str) -> Option<i32> {
    msg[key].as_i64().map(|v| v as i32)
}

/// Translate one client message into actions, honoring the device gates:
/// emulator input is dropped unless the emulator is running, container input
/// unless the container is running. `ping` is always answered. Malformed or
/// unknown messages produce nothing.
pub fn dispatch(msg: &Value, emulator: DeviceState, linux: DeviceState) -> Vec<Action> {
    let Some(msg_type) = msg["type"].as_str() else {
        return vec![];
    };
    if msg_type == "ping" {
        return vec![Action::Pong];
    }

    match msg_type {
        "touch" | "mouse" | "scroll" | "pinch" | "key" | "paste" | "clipboard-read"
        | "reset-chrome" => {
            if emulator != DeviceState::Running {
                return vec![];
            }
        }
        "linux-key" | "linux-type" | "linux-paste" | "linux-clipboard-read" => {
            if linux != DeviceState::Running {
                return vec![];
            }
        }
        _ => return vec![],
    }

    match msg_type {
        "touch" => {
            let (Some(x), Some(y)) = (i32_field(msg, "x"), i32_field(msg, "y")) else {
                return vec![];
            };
            let pressure = i32_field(msg, "pressure").unwrap_or(0);
            let identifier = i32_field(msg, "id").unwrap_or(0);
            vec![Action::SendTouch(TouchEvent {
                touches: vec![Touch {
                    x,
                    y,
                    identifier,
                    pressure,
                }],
                display: 0,
            })]
        }
        "mouse" => {
            let (Some(x), Some(y)) = (i32_field(msg, "x"), i32_field(msg, "y")) else {
                return vec![];
            };
            let buttons = i32_field(msg, "buttons").unwrap_or(0);
            vec![Action::SendMouse(MouseEvent {
                x,
                y,
                buttons,
                display: 0,
            })]
        }
        "scroll" => {
            let (Some(x), Some(y)) = (f64_field(msg, "x"), f64_field(msg, "y")) else {
                return vec![];
            };
            let dx = f64_field(msg, "dx").unwrap_or(0.0);
            let dy = f64_field(msg, "dy").unwrap_or(0.0);
            vec![Action::Scroll { x, y, dx, dy }]
        }
        "pinch" => {
            let (Some(x), Some(y)) = (f64_field(msg, "x"), f64_field(msg, "y")) else {
                return vec![];
            };
            let delta = f64_field(msg, "delta").unwrap_or(0.0);
            vec![Action::Pinch { x, y, delta }]
        }
        "key" => {
            let key = msg["key"].as_str().unwrap_or("");
            let event_type = msg["eventType"].as_str().unwrap_or("keydown");
            let cmd = keymap::translate(
                event_type,
                key,
                msg["ctrl"].as_bool().unwrap_or(false),
                msg["shift"].as_bool().unwrap_or(false),
                msg["alt"].as_bool().unwrap_or(false),
            );
            match keymap::to_adb_line(&cmd) {
                Some(line) => vec![Action::AdbCommand(line)],
                None => vec![],
            }
        }
        "paste" => match msg["text"].as_str() {
            Some(text) => vec![Action::PasteAndroid(text.to_string())],
            None => vec![],
        },
        "clipboard-read" => vec![Action::ReadAndroidClipboard],
        "reset-chrome" => vec![Action::ResetChrome],
        "linux-key" => {
            let key = msg["key"].as_str().unwrap_or("");
            if msg["eventType"].as_str().unwrap_or("keydown") == "keyup" {
                return vec![];
            }
            let line = keymap::linux_key_line(
                key,
                msg["ctrl"].as_bool().unwrap_or(false),
                msg["shift"].as_bool().unwrap_or(false),
                msg["alt"].as_bool().unwrap_or(false),
            );
            match line {
                Some(line) => vec![Action::LinuxCommand(line)],
                None => vec![],
            }
        }
        "linux-type" => match msg["text"].as_str() {
            Some(text) if !text.is_empty() => {
                vec![Action::LinuxCommand(keymap::linux_type_line(text))]
            }
            _ => vec![],
        },
        "linux-paste" => match msg["text"].as_str() {
            Some(text) => vec![Action::PasteLinux(text.to_string())],
            None => vec![],
        },
        "linux-clipboard-read" => vec![Action::ReadLinuxClipboard],
        _ => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RUN: DeviceState = DeviceState::Running;
    const STOP: DeviceState = DeviceState::Stopped;

    #[test]
    fn test_touch_while_running_yields_one_send() {
        let msg = json!({"type": "touch", "x": 0, "y": 0, "pressure": 1024, "id": 0});
        let actions = dispatch(&msg, RUN, STOP);
        assert_eq!(
            actions,
            vec![Action::SendTouch(TouchEvent {
                touches: vec![Touch {
                    x: 0,
                    y: 0,
                    identifier: 0,
                    pressure: 1024,
                }],
                display: 0,
            })]
        );
    }

    #[test]
    fn test_touch_while_stopped_is_dropped() {
        let msg = json!({"type": "touch", "x": 10, "y": 10, "pressure": 1024, "id": 0});
        assert!(dispatch(&msg, STOP, RUN).is_empty());
    }

    #[test]
    fn test_ping_is_answered_regardless_of_state() {
        let msg = json!({"type": "ping"});
        assert_eq!(dispatch(&msg, STOP, STOP), vec![Action::Pong]);
    }

    #[test]
    fn test_key_translates_to_adb_line() {
        let msg = json!({"type": "key", "eventType": "keydown", "key": "Enter",
                         "ctrl": false, "shift": false, "alt": false});
        assert_eq!(
            dispatch(&msg, RUN, STOP),
            vec![Action::AdbCommand("input keyevent 66".to_string())]
        );
    }

    #[test]
    fn test_keyup_produces_nothing() {
        let msg = json!({"type": "key", "eventType": "keyup", "key": "a"});
        assert!(dispatch(&msg, RUN, STOP).is_empty());
    }

    #[test]
    fn test_linux_key_gated_on_linux_state() {
        let msg = json!({"type": "linux-key", "key": "Enter"});
        assert!(dispatch(&msg, RUN, STOP).is_empty());
        assert_eq!(
            dispatch(&msg, STOP, RUN),
            vec![Action::LinuxCommand(
                "xdotool key --clearmodifiers Return".to_string()
            )]
        );
    }

    #[test]
    fn test_malformed_and_unknown_messages_are_ignored() {
        assert!(dispatch(&json!({"type": "touch"}), RUN, RUN).is_empty());
        assert!(dispatch(&json!({"type": "warp-drive"}), RUN, RUN).is_empty());
        assert!(dispatch(&json!({"x": 1}), RUN, RUN).is_empty());
    }

    #[test]
    fn test_scroll_and_pinch_pass_deltas_through() {
        let msg = json!({"type": "scroll", "x": 100.0, "y": 200.0, "dx": 0.0, "dy": 12.5});
        assert_eq!(
            dispatch(&msg, RUN, STOP),
            vec![Action::Scroll {
                x: 100.0,
                y: 200.0,
                dx: 0.0,
                dy: 12.5
            }]
        );
        let msg = json!({"type": "pinch", "x": 50.0, "y": 60.0, "delta": -3.0});
        assert_eq!(
            dispatch(&msg, RUN, STOP),
            vec![Action::Pinch {
                x: 50.0,
                y: 60.0,
                delta: -3.0
            }]
        );
    }
}
