//! Managed device lifecycles. Each device (the Android emulator, the Linux
//! desktop container) gets one `DeviceLifecycle` that serializes start, stop,
//! and reset operations, tracks the stopped/starting/running/stopping state,
//! and broadcasts every transition to connected clients.
//!
//! Start and stop run operator-configured shell commands; an empty command
//! string disables the operation. After a start command succeeds the device
//! is only reported running once a readiness probe passes.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::device::Dimensions;
use crate::state::{DeviceState, SharedChannel, StatusEvent};

/// Gap between readiness probes while a device is starting.
const PROBE_INTERVAL: Duration = Duration::from_secs(2);
/// Give up and report stopped after this many failed probes.
const PROBE_ATTEMPTS: u32 = 60;

/// Which device a lifecycle manages, and how to tell it is ready.
pub enum Probe {
    /// The emulator answers a screenshot RPC. A successful probe also
    /// refreshes the shared screen dimensions.
    Emulator {
        channel: SharedChannel,
        dims: Arc<RwLock<Dimensions>>,
    },
    /// The container answers an arbitrary shell command with exit code 0.
    Command(String),
}

pub struct DeviceLifecycle {
    name: &'static str,
    state: Mutex<DeviceState>,
    /// Serializes start/stop/reset so overlapping requests cannot interleave.
    ops: Mutex<()>,
    events: broadcast::Sender<StatusEvent>,
    start_command: String,
    stop_command: String,
    reset_command: String,
    probe: Probe,
}

impl DeviceLifecycle {
    pub fn new(
        name: &'static str,
        events: broadcast::Sender<StatusEvent>,
        start_command: String,
        stop_command: String,
        reset_command: String,
        probe: Probe,
    ) -> Self {
        Self {
            name,
            state: Mutex::new(DeviceState::Stopped),
            ops: Mutex::new(()),
            events,
            start_command,
            stop_command,
            reset_command,
            probe,
        }
    }

    pub async fn state(&self) -> DeviceState {
        *self.state.lock().await
    }

    async fn set_state(&self, next: DeviceState) {
        *self.state.lock().await = next;
        let event = match self.probe {
            Probe::Emulator { .. } => StatusEvent::Emulator(next),
            Probe::Command(_) => StatusEvent::Linux(next),
        };
        // No receivers is fine (no clients connected).
        let _ = self.events.send(event);
    }

    /// Begin starting the device. Returns the state after the transition;
    /// a device that is not stopped is left alone.
    pub async fn start(self: &Arc<Self>) -> DeviceState {
        let _ops = self.ops.lock().await;
        let current = self.state().await;
        if current != DeviceState::Stopped {
            return current;
        }
        if self.start_command.is_empty() {
            warn!("{} has no start command configured", self.name);
            return current;
        }
        self.set_state(DeviceState::Starting).await;
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = run_shell(&this.start_command).await {
                warn!("{} start command failed: {err}", this.name);
                this.set_state(DeviceState::Stopped).await;
                return;
            }
            this.await_ready().await;
        });
        DeviceState::Starting
    }

    /// Stop the device. Runs the stop command to completion and reports the
    /// final state.
    pub async fn stop(self: &Arc<Self>) -> DeviceState {
        let _ops = self.ops.lock().await;
        let current = self.state().await;
        if matches!(current, DeviceState::Stopped | DeviceState::Stopping) {
            return current;
        }
        if self.stop_command.is_empty() {
            warn!("{} has no stop command configured", self.name);
            return current;
        }
        self.set_state(DeviceState::Stopping).await;
        if let Err(err) = run_shell(&self.stop_command).await {
            warn!("{} stop command failed: {err}", self.name);
        }
        self.set_state(DeviceState::Stopped).await;
        DeviceState::Stopped
    }

    /// Restart the device in place. The device goes back through starting
    /// until the readiness probe passes again.
    pub async fn reset(self: &Arc<Self>) -> DeviceState {
        let _ops = self.ops.lock().await;
        if self.reset_command.is_empty() {
            warn!("{} has no reset command configured", self.name);
            return self.state().await;
        }
        self.set_state(DeviceState::Starting).await;
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = run_shell(&this.reset_command).await {
                warn!("{} reset command failed: {err}", this.name);
                this.set_state(DeviceState::Stopped).await;
                return;
            }
            this.await_ready().await;
        });
        DeviceState::Starting
    }

    /// Mark the device as already running, used at startup when a probe of a
    /// pre-existing device succeeds.
    pub async fn adopt_running(&self) {
        self.set_state(DeviceState::Running).await;
    }

    /// Poll the readiness probe until it passes or the attempts run out.
    /// Bails out silently if a stop raced in and the device is no longer
    /// starting.
    async fn await_ready(&self) {
        for _ in 0..PROBE_ATTEMPTS {
            if self.state().await != DeviceState::Starting {
                return;
            }
            if self.probe_once().await {
                info!("{} is ready", self.name);
                self.set_state(DeviceState::Running).await;
                return;
            }
            sleep(PROBE_INTERVAL).await;
        }
        warn!("{} never became ready, giving up", self.name);
        if self.state().await == DeviceState::Starting {
            self.set_state(DeviceState::Stopped).await;
        }
    }

    pub async fn probe_once(&self) -> bool {
        match &self.probe {
            Probe::Emulator { channel, dims } => {
                let ch = channel.read().await.clone();
                match ch.get_screenshot(0, 0).await {
                    Ok(image) => {
                        *dims.write().await = Dimensions::from_image(&image);
                        true
                    }
                    Err(_) => false,
                }
            }
            Probe::Command(cmd) => match run_shell(cmd).await {
                Ok(()) => true,
                Err(_) => false,
            },
        }
    }
}

#[derive(Debug)]
pub enum ShellError {
    Spawn(std::io::Error),
    Status(std::process::ExitStatus),
}

impl std::fmt::Display for ShellError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn(e) => write!(f, "failed to spawn shell: {e}"),
            Self::Status(s) => write!(f, "command exited with {s}"),
        }
    }
}

impl std::error::Error for ShellError {}

/// Run a configured command line through `/bin/sh -c`, discarding output.
async fn run_shell(command: &str) -> Result<(), ShellError> {
    let status = Command::new("/bin/sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(ShellError::Spawn)?;
    if status.success() {
        Ok(())
    } else {
        Err(ShellError::Status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifecycle(start: &str, stop: &str, probe: &str) -> Arc<DeviceLifecycle> {
        let (events, _) = broadcast::channel(16);
        Arc::new(DeviceLifecycle::new(
            "test-device",
            events,
            start.to_string(),
            stop.to_string(),
            String::new(),
            Probe::Command(probe.to_string()),
        ))
    }

    #[tokio::test]
    async fn test_start_moves_through_starting_to_running() {
        let lc = lifecycle("true", "true", "true");
        assert_eq!(lc.start().await, DeviceState::Starting);
        // The probe command succeeds immediately.
        for _ in 0..50 {
            if lc.state().await == DeviceState::Running {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("device never reached running");
    }

    #[tokio::test]
    async fn test_start_is_idempotent_while_not_stopped() {
        let lc = lifecycle("sleep 5", "true", "false");
        assert_eq!(lc.start().await, DeviceState::Starting);
        // Second start while starting does not restart the device.
        assert_eq!(lc.start().await, DeviceState::Starting);
    }

    #[tokio::test]
    async fn test_start_without_command_stays_stopped() {
        let lc = lifecycle("", "true", "true");
        assert_eq!(lc.start().await, DeviceState::Stopped);
        assert_eq!(lc.state().await, DeviceState::Stopped);
    }

    #[tokio::test]
    async fn test_stop_from_stopped_is_a_no_op() {
        let lc = lifecycle("true", "true", "true");
        assert_eq!(lc.stop().await, DeviceState::Stopped);
    }

    #[tokio::test]
    async fn test_failed_start_command_reports_stopped() {
        let lc = lifecycle("false", "true", "true");
        assert_eq!(lc.start().await, DeviceState::Starting);
        for _ in 0..50 {
            if lc.state().await == DeviceState::Stopped {
                return;
            }
            sleep(Duration::from_millis(100)).await;
        }
        panic!("failed start never reported stopped");
    }

    #[tokio::test]
    async fn test_transitions_are_broadcast() {
        let (events, mut rx) = broadcast::channel(16);
        let lc = Arc::new(DeviceLifecycle::new(
            "test-device",
            events,
            "true".to_string(),
            "true".to_string(),
            String::new(),
            Probe::Command("true".to_string()),
        ));
        lc.start().await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            StatusEvent::Linux(DeviceState::Starting)
        ));
    }
}
