//! WebSocket relay between browser clients and the managed devices.
//!
//! ## Connection lifecycle
//!
//! 1. Client connects to `GET /ws`. The session is registered and
//!    immediately told the current state of both devices; if the emulator is
//!    running it also receives the screen `config` and a frame subscription.
//! 2. All client messages are JSON objects with a `"type"` field; the server
//!    pushes screen frames as binary messages and everything else as JSON.
//! 3. On disconnect the frame subscription is canceled and every session
//!    resource is dropped.
//!
//! ## Message types (client → server)
//!
//! | Type                  | Fields                              |
//! |-----------------------|-------------------------------------|
//! | `ping`                | —                                   |
//! | `touch`               | `x`, `y`, `pressure`, `id`          |
//! | `mouse`               | `x`, `y`, `buttons`                 |
//! | `scroll`              | `x`, `y`, `dx`, `dy`                |
//! | `pinch`               | `x`, `y`, `delta`                   |
//! | `key`                 | `eventType`, `key`, `ctrl`, `shift`, `alt` |
//! | `paste`               | `text`                              |
//! | `clipboard-read`      | —                                   |
//! | `reset-chrome`        | —                                   |
//! | `linux-key`           | `eventType`, `key`, `ctrl`, `shift`, `alt` |
//! | `linux-type`          | `text`                              |
//! | `linux-paste`         | `text`                              |
//! | `linux-clipboard-read`| —                                   |
//!
//! ## Message types (server → client)
//!
//! | Type             | Key fields                     |
//! |------------------|--------------------------------|
//! | (binary)         | one screen frame               |
//! | `config`         | `deviceWidth`, `deviceHeight`  |
//! | `status`         | `state`                        |
//! | `linux-status`   | `state`, `novncPort`           |
//! | `clipboard`      | `text`                         |
//! | `linux-clipboard`| `text`                         |
//! | `pong`           | —                              |

pub mod session;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::command;
use crate::device::proto::{MouseEvent, TouchEvent};
use crate::device::Dimensions;
use crate::gesture::{GestureConfig, PinchGesture, ScrollGesture};
use crate::keymap;
use crate::state::{ClientHandle, DeviceState, StatusEvent};
use crate::stream;
use crate::ws::session::Action;
use crate::AppState;

/// Chrome package on the device, relaunched by `reset-chrome`.
const CHROME_PACKAGE: &str = "com.android.chrome";
const CHROME_ACTIVITY: &str = "com.android.chrome/com.google.android.apps.chrome.Main";

/// How long a clipboard read through `docker exec` may take.
const CLIPBOARD_TIMEOUT: Duration = Duration::from_secs(5);

/// The `reset-chrome` recovery sequence with the pause (in ms) after each
/// step: wipe the profile, relaunch on a blank page, then back out of the
/// first-run prompt.
fn chrome_reset_steps() -> [(String, u64); 3] {
    [
        (format!("pm clear {CHROME_PACKAGE}"), 500),
        (
            format!("am start -a android.intent.action.VIEW -d about:blank -n {CHROME_ACTIVITY}"),
            3000,
        ),
        ("input keyevent 4".to_string(), 0),
    ]
}

/// `GET /ws` — WebSocket upgrade handler.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Work items for the session's pointer pump. A single task drains these in
/// order so touch events reach the emulator in the order the client produced
/// them.
enum PointerJob {
    Touch(TouchEvent),
    Mouse(MouseEvent),
    /// The two-step pinch opening. Completion is reported back to the event
    /// loop so queued pinch moves can flush.
    PinchSetup([TouchEvent; 2]),
}

/// Events the session's own background tasks feed back into the loop.
enum SessionEvent {
    PinchReady,
}

/// Main session event loop. Splits the socket, then concurrently processes
/// client messages, device status broadcasts, pinch setup completions, and
/// gesture idle deadlines.
#[allow(clippy::too_many_lines)]
async fn handle_ws(socket: WebSocket, state: AppState) {
    let id = Uuid::new_v4();
    let (mut ws_sink, mut ws_stream) = socket.split();

    // JSON control messages and binary frames share the writer task; the
    // frame channel's capacity of one is the per-client backpressure signal.
    let (ctrl_tx, mut ctrl_rx) = mpsc::channel::<Value>(256);
    let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(1);

    let handle = Arc::new(ClientHandle::new(id, ctrl_tx.clone(), frame_tx));
    state.clients.insert(handle.clone()).await;
    info!(client = %id, "relay client connected");

    let mut status_rx = state.status_events.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = ctrl_rx.recv() => {
                    let Some(msg) = msg else { break };
                    let text = match serde_json::to_string(&msg) {
                        Ok(t) => t,
                        Err(e) => {
                            error!("WS send: failed to serialize message: {e}");
                            continue;
                        }
                    };
                    if ws_sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                frame = frame_rx.recv() => {
                    let Some(data) = frame else { break };
                    if ws_sink.send(Message::Binary(data.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let (pointer_tx, pointer_rx) = mpsc::channel::<PointerJob>(64);
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(16);
    let pointer_task = tokio::spawn(pointer_pump(state.clone(), pointer_rx, event_tx));

    let mut session = Session {
        state: state.clone(),
        handle: handle.clone(),
        ctrl_tx,
        pointer_tx,
        gesture_config: GestureConfig::from(state.config.gesture),
        idle_timeout: Duration::from_millis(state.config.gesture.idle_timeout_ms),
        scroll: None,
        scroll_deadline: None,
        pinch: None,
        pinch_deadline: None,
    };
    session.send_initial_status().await;

    loop {
        tokio::select! {
            ws_msg = ws_stream.next() => {
                let Some(Ok(msg)) = ws_msg else { break };
                match msg {
                    Message::Text(text) => {
                        let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
                            warn!(client = %id, "ignoring unparseable message");
                            continue;
                        };
                        let emulator = state.emulator.state().await;
                        let linux = state.linux.state().await;
                        for action in session::dispatch(&parsed, emulator, linux) {
                            session.apply(action).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            event = status_rx.recv() => {
                match event {
                    Ok(event) => session.on_status(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(client = %id, "missed {n} status event(s)");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            Some(SessionEvent::PinchReady) = event_rx.recv() => {
                session.on_pinch_ready().await;
            }
            () = deadline(session.scroll_deadline) => {
                session.on_scroll_timeout().await;
            }
            () = deadline(session.pinch_deadline) => {
                session.on_pinch_timeout().await;
            }
        }
    }

    // Releases the frame subscription and drops the pointer pump.
    state.clients.remove(id).await;
    pointer_task.abort();
    send_task.abort();
    info!(client = %id, "relay client disconnected");
}

/// Completes at the given deadline; pends forever when there is none, so it
/// can sit unarmed in a `select!`.
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Drains pointer jobs in submission order against whatever channel is
/// current when each job runs. Errors are logged and not retried.
async fn pointer_pump(
    state: AppState,
    mut rx: mpsc::Receiver<PointerJob>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    while let Some(job) = rx.recv().await {
        let channel = state.channel.read().await.clone();
        match job {
            PointerJob::Touch(event) => {
                if let Err(e) = channel.send_touch(event).await {
                    warn!("sendTouch failed: {e}");
                }
            }
            PointerJob::Mouse(event) => {
                if let Err(e) = channel.send_mouse(event).await {
                    warn!("sendMouse failed: {e}");
                }
            }
            PointerJob::PinchSetup(events) => {
                for event in events {
                    if let Err(e) = channel.send_touch(event).await {
                        warn!("pinch setup sendTouch failed: {e}");
                    }
                }
                if event_tx.send(SessionEvent::PinchReady).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Per-connection relay state: gesture machines, their idle deadlines, and
/// the channels into the writer and pointer pump.
struct Session {
    state: AppState,
    handle: Arc<ClientHandle>,
    ctrl_tx: mpsc::Sender<Value>,
    pointer_tx: mpsc::Sender<PointerJob>,
    gesture_config: GestureConfig,
    idle_timeout: Duration,
    scroll: Option<ScrollGesture>,
    scroll_deadline: Option<Instant>,
    pinch: Option<PinchGesture>,
    pinch_deadline: Option<Instant>,
}

impl Session {
    async fn send(&self, msg: Value) {
        let _ = self.ctrl_tx.send(msg).await;
    }

    async fn enqueue_pointer(&self, job: PointerJob) {
        if self.pointer_tx.send(job).await.is_err() {
            warn!(client = %self.handle.id, "pointer pump gone");
        }
    }

    async fn dims(&self) -> Dimensions {
        *self.state.dims.read().await
    }

    /// Tell a fresh client where both devices stand, and open the frame
    /// subscription if the emulator is already up.
    async fn send_initial_status(&self) {
        let emulator = self.state.emulator.state().await;
        self.send(json!({"type": "status", "state": emulator.as_str()}))
            .await;
        self.send(json!({
            "type": "linux-status",
            "state": self.state.linux.state().await.as_str(),
            "novncPort": self.state.config.linux.novnc_port,
        }))
        .await;
        if emulator == DeviceState::Running {
            self.send_config().await;
            self.subscribe_frames().await;
        }
    }

    async fn send_config(&self) {
        let dims = self.dims().await;
        self.send(json!({
            "type": "config",
            "deviceWidth": dims.width,
            "deviceHeight": dims.height,
        }))
        .await;
    }

    /// Open a frame pump for this client unless one is already running.
    async fn subscribe_frames(&self) {
        if self.handle.has_pump().await {
            return;
        }
        let channel = self.state.channel.read().await.clone();
        let width = self
            .dims()
            .await
            .stream_width(self.state.config.stream.max_width);
        let pump = stream::spawn_pump(
            channel,
            width,
            self.handle.clone(),
            Duration::from_millis(self.state.config.stream.min_frame_interval_ms),
            self.state.failure_tx.clone(),
        );
        self.handle.set_pump(pump).await;
    }

    async fn on_status(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::Emulator(device_state) => {
                self.send(json!({"type": "status", "state": device_state.as_str()}))
                    .await;
                match device_state {
                    DeviceState::Running => {
                        self.send_config().await;
                        self.subscribe_frames().await;
                    }
                    DeviceState::Stopped => {
                        self.handle.cancel_pump().await;
                        self.scroll = None;
                        self.scroll_deadline = None;
                        self.pinch = None;
                        self.pinch_deadline = None;
                    }
                    _ => {}
                }
            }
            StatusEvent::Linux(device_state) => {
                self.send(json!({
                    "type": "linux-status",
                    "state": device_state.as_str(),
                    "novncPort": self.state.config.linux.novnc_port,
                }))
                .await;
            }
        }
    }

    async fn apply(&mut self, action: Action) {
        match action {
            Action::Pong => self.send(json!({"type": "pong"})).await,
            Action::SendTouch(event) => self.enqueue_pointer(PointerJob::Touch(event)).await,
            Action::SendMouse(event) => self.enqueue_pointer(PointerJob::Mouse(event)).await,
            Action::Scroll { x, y, dx, dy } => self.on_scroll(x, y, dx, dy).await,
            Action::Pinch { x, y, delta } => self.on_pinch(x, y, delta).await,
            Action::AdbCommand(line) => {
                if let Err(e) = self.state.adb.submit(&line).await {
                    warn!("adb input failed: {e}");
                }
            }
            Action::PasteAndroid(text) => {
                let state = self.state.clone();
                tokio::spawn(async move {
                    let channel = state.channel.read().await.clone();
                    if let Err(e) = channel.set_clipboard(text).await {
                        warn!("setClipboard failed: {e}");
                        return;
                    }
                    // Ctrl+V on the device.
                    if let Err(e) = state.adb.submit("input keycombination 113 50").await {
                        warn!("paste keystroke failed: {e}");
                    }
                });
            }
            Action::ReadAndroidClipboard => {
                let state = self.state.clone();
                let ctrl_tx = self.ctrl_tx.clone();
                tokio::spawn(async move {
                    let channel = state.channel.read().await.clone();
                    match channel.get_clipboard().await {
                        Ok(text) => {
                            let _ = ctrl_tx
                                .send(json!({"type": "clipboard", "text": text}))
                                .await;
                        }
                        Err(e) => warn!("getClipboard failed: {e}"),
                    }
                });
            }
            Action::ResetChrome => {
                let adb = self.state.adb.clone();
                tokio::spawn(async move {
                    for (cmd, pause_ms) in chrome_reset_steps() {
                        if let Err(e) = adb.submit(&cmd).await {
                            warn!("chrome reset step failed: {e}");
                            return;
                        }
                        if pause_ms > 0 {
                            tokio::time::sleep(Duration::from_millis(pause_ms)).await;
                        }
                    }
                });
            }
            Action::LinuxCommand(cmd) => {
                let line = format!("DISPLAY={} {cmd}", self.state.config.linux.display);
                if let Err(e) = self.state.linux_shell.submit(&line).await {
                    warn!("container input failed: {e}");
                }
            }
            Action::PasteLinux(text) => {
                let display = &self.state.config.linux.display;
                // One compound line so the clipboard load and the keystroke
                // run in order inside the container shell.
                let line = format!(
                    "{{ printf %s {} | DISPLAY={display} xclip -selection clipboard -i; \
                     DISPLAY={display} xdotool key --clearmodifiers ctrl+v; }}",
                    keymap::shell_quote(&text)
                );
                if let Err(e) = self.state.linux_shell.submit(&line).await {
                    warn!("container paste failed: {e}");
                }
            }
            Action::ReadLinuxClipboard => {
                let config = self.state.config.clone();
                let ctrl_tx = self.ctrl_tx.clone();
                tokio::spawn(async move {
                    let args = vec![
                        "exec".to_string(),
                        config.linux.container.clone(),
                        "sh".to_string(),
                        "-c".to_string(),
                        format!(
                            "DISPLAY={} xclip -selection clipboard -o",
                            config.linux.display
                        ),
                    ];
                    match command::capture_output("docker", &args, CLIPBOARD_TIMEOUT).await {
                        Ok(text) => {
                            let _ = ctrl_tx
                                .send(json!({"type": "linux-clipboard", "text": text}))
                                .await;
                        }
                        Err(e) => warn!("container clipboard read failed: {e}"),
                    }
                });
            }
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn on_scroll(&mut self, x: f64, y: f64, dx: f64, dy: f64) {
        let dims = self.dims().await;
        match &mut self.scroll {
            None => {
                let (gesture, down) = ScrollGesture::begin(x.round() as i32, y.round() as i32);
                self.scroll = Some(gesture);
                self.enqueue_pointer(PointerJob::Touch(down)).await;
            }
            Some(gesture) => {
                let mv = gesture.update(dx, dy, &self.gesture_config, dims);
                self.enqueue_pointer(PointerJob::Touch(mv)).await;
            }
        }
        self.scroll_deadline = Some(Instant::now() + self.idle_timeout);
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn on_pinch(&mut self, x: f64, y: f64, delta: f64) {
        let dims = self.dims().await;
        match &mut self.pinch {
            None => {
                let (gesture, setup) = PinchGesture::begin(
                    x.round() as i32,
                    y.round() as i32,
                    &self.gesture_config,
                    dims,
                );
                self.pinch = Some(gesture);
                self.enqueue_pointer(PointerJob::PinchSetup(setup)).await;
            }
            Some(gesture) => {
                // While setup is in flight the move is queued inside the
                // gesture and flushed on PinchReady.
                if let Some(mv) = gesture.update(delta.round() as i32, &self.gesture_config, dims)
                {
                    self.enqueue_pointer(PointerJob::Touch(mv)).await;
                }
            }
        }
        self.pinch_deadline = Some(Instant::now() + self.idle_timeout);
    }

    async fn on_pinch_ready(&mut self) {
        let dims = self.dims().await;
        let Some(gesture) = &mut self.pinch else {
            return;
        };
        let outcome = gesture.setup_complete(dims);
        for mv in outcome.moves {
            self.enqueue_pointer(PointerJob::Touch(mv)).await;
        }
        if let Some(release) = outcome.release {
            self.enqueue_pointer(PointerJob::Touch(release)).await;
            self.pinch = None;
            self.pinch_deadline = None;
        }
    }

    async fn on_scroll_timeout(&mut self) {
        self.scroll_deadline = None;
        if let Some(gesture) = self.scroll.take() {
            self.enqueue_pointer(PointerJob::Touch(gesture.release()))
                .await;
        }
    }

    async fn on_pinch_timeout(&mut self) {
        self.pinch_deadline = None;
        let dims = self.dims().await;
        if let Some(gesture) = &mut self.pinch {
            // During setup the release is deferred; setup completion will
            // deliver it.
            if let Some(release) = gesture.request_release(dims) {
                self.enqueue_pointer(PointerJob::Touch(release)).await;
                self.pinch = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_reset_wipes_profile_and_relaunches_blank() {
        let steps = chrome_reset_steps();
        assert_eq!(steps[0].0, "pm clear com.android.chrome");
        assert!(steps[1].0.starts_with("am start -a android.intent.action.VIEW -d about:blank"));
        assert!(steps[1].0.ends_with(CHROME_ACTIVITY));
        // Back key last, after the relaunch settles.
        assert_eq!(steps[2], ("input keyevent 4".to_string(), 0));
    }
}
