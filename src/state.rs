//! Shared application state passed to every handler via Axum's `State` extractor.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::command::CommandChannel;
use crate::config::Config;
use crate::device::{Dimensions, EmulatorChannel};
use crate::lifecycle::DeviceLifecycle;

/// The shared emulator control channel. Exactly one channel is current at any
/// instant; only the reconnector takes the write lock (to swap in a
/// replacement), everything else takes a read lock just long enough to clone
/// the inner `Arc`. A subscription is therefore always created against the
/// channel that was current at subscription time.
pub type SharedChannel = Arc<RwLock<Arc<EmulatorChannel>>>;

/// Lifecycle state of a managed device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl DeviceState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
        }
    }
}

/// Device lifecycle transition, broadcast to all connected clients.
#[derive(Debug, Clone, Copy)]
pub enum StatusEvent {
    Emulator(DeviceState),
    Linux(DeviceState),
}

/// Per-connection handle kept in the registry so the reconnector can rebuild
/// frame subscriptions for every live client.
pub struct ClientHandle {
    pub id: Uuid,
    /// JSON control messages to the socket writer.
    pub ctrl_tx: mpsc::Sender<Value>,
    /// Binary frame slot (capacity 1) — the client's outbound frame buffer.
    /// A full slot is the backpressure signal; frames are never queued
    /// behind it.
    pub frame_tx: mpsc::Sender<Vec<u8>>,
    /// The currently running frame pump, if any.
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl ClientHandle {
    pub fn new(id: Uuid, ctrl_tx: mpsc::Sender<Value>, frame_tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            id,
            ctrl_tx,
            frame_tx,
            pump: Mutex::new(None),
        }
    }

    /// Cancel the current frame subscription. Idempotent: canceling twice or
    /// with no subscription open is a no-op.
    pub async fn cancel_pump(&self) {
        if let Some(handle) = self.pump.lock().await.take() {
            handle.abort();
        }
    }

    /// Install a new frame pump, canceling any stale one first.
    pub async fn set_pump(&self, handle: JoinHandle<()>) {
        let mut guard = self.pump.lock().await;
        if let Some(old) = guard.take() {
            old.abort();
        }
        *guard = Some(handle);
    }

    pub async fn has_pump(&self) -> bool {
        self.pump.lock().await.is_some()
    }
}

/// All live client sessions, keyed by session id.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<Uuid, Arc<ClientHandle>>>,
}

impl ClientRegistry {
    pub async fn insert(&self, handle: Arc<ClientHandle>) {
        self.clients.lock().await.insert(handle.id, handle);
    }

    /// Deregister and cancel the session's frame subscription. After this
    /// returns no component holds a reference to the session.
    pub async fn remove(&self, id: Uuid) {
        let handle = self.clients.lock().await.remove(&id);
        if let Some(handle) = handle {
            handle.cancel_pump().await;
        }
    }

    pub async fn all(&self) -> Vec<Arc<ClientHandle>> {
        self.clients.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }
}

/// Shared application state for the devbridge server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started.
    pub start_time: Instant,
    /// The current emulator control channel (see [`SharedChannel`]).
    pub channel: SharedChannel,
    /// Device screen size, discovered once per channel lifetime.
    pub dims: Arc<RwLock<Dimensions>>,
    /// Live client sessions.
    pub clients: Arc<ClientRegistry>,
    /// Android emulator lifecycle collaborator.
    pub emulator: Arc<DeviceLifecycle>,
    /// Linux desktop lifecycle collaborator.
    pub linux: Arc<DeviceLifecycle>,
    /// Persistent adb input shell.
    pub adb: Arc<CommandChannel>,
    /// Persistent container shell for Linux input.
    pub linux_shell: Arc<CommandChannel>,
    /// Lifecycle transitions, fanned out to every connected client.
    pub status_events: broadcast::Sender<StatusEvent>,
    /// Failure signals into the transport reconnector.
    pub failure_tx: mpsc::Sender<()>,
}
