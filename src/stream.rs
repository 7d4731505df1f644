//! Per-client frame delivery: one pump task per connected session, pulling
//! frames off the emulator's screenshot stream and pushing them into the
//! session's frame slot.
//!
//! Two filters run in order for every frame: backpressure (is the client's
//! frame slot free?) then a rate cap (has the minimum interval elapsed since
//! the last frame this client was actually sent?). A dropped frame advances
//! neither filter's state, so a slow client always receives the freshest
//! frame the moment it catches up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::device::EmulatorChannel;
use crate::state::ClientHandle;

/// Minimum-interval frame filter. `admit` records the send time only when it
/// returns true, so drops never count against the interval.
pub struct FrameGate {
    min_interval: Duration,
    last_sent: Option<Instant>,
}

impl FrameGate {
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
        }
    }

    pub fn admit(&mut self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_sent = Some(now);
                true
            }
        }
    }
}

/// Spawn a frame pump for one client against the given channel. The task runs
/// until the stream ends, errors, or the pump is canceled; on stream failure
/// it signals the reconnector and exits.
pub fn spawn_pump(
    channel: Arc<EmulatorChannel>,
    width: u32,
    client: Arc<ClientHandle>,
    min_frame_interval: Duration,
    failure_tx: mpsc::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stream = match channel.stream_screenshot(width).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(client = %client.id, "screen stream subscription failed: {err}");
                let _ = failure_tx.send(()).await;
                return;
            }
        };
        let mut gate = FrameGate::new(min_frame_interval);
        loop {
            match stream.message().await {
                Ok(Some(image)) => {
                    if client.frame_tx.capacity() == 0 {
                        // Client still draining the previous frame.
                        continue;
                    }
                    if !gate.admit(Instant::now()) {
                        continue;
                    }
                    if client.frame_tx.try_send(image.image).is_err() {
                        debug!(client = %client.id, "frame slot closed, pump exiting");
                        return;
                    }
                }
                Ok(None) => {
                    warn!(client = %client.id, "screen stream ended");
                    let _ = failure_tx.send(()).await;
                    return;
                }
                Err(err) => {
                    warn!(client = %client.id, "screen stream error: {err}");
                    let _ = failure_tx.send(()).await;
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_admits_first_frame_immediately() {
        let mut gate = FrameGate::new(Duration::from_millis(16));
        assert!(gate.admit(Instant::now()));
    }

    #[test]
    fn test_gate_blocks_within_interval() {
        let mut gate = FrameGate::new(Duration::from_millis(16));
        let t0 = Instant::now();
        assert!(gate.admit(t0));
        assert!(!gate.admit(t0 + Duration::from_millis(5)));
        assert!(!gate.admit(t0 + Duration::from_millis(15)));
        assert!(gate.admit(t0 + Duration::from_millis(16)));
    }

    #[test]
    fn test_gate_drops_do_not_advance_interval() {
        let mut gate = FrameGate::new(Duration::from_millis(16));
        let t0 = Instant::now();
        assert!(gate.admit(t0));
        // A burst of rejected frames must not push the window forward.
        assert!(!gate.admit(t0 + Duration::from_millis(10)));
        assert!(!gate.admit(t0 + Duration::from_millis(12)));
        assert!(gate.admit(t0 + Duration::from_millis(17)));
    }

    #[tokio::test]
    async fn test_frame_slot_holds_one_frame() {
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(1);
        assert!(tx.try_send(vec![1]).is_ok());
        assert_eq!(tx.capacity(), 0);
        // Second frame is dropped, not queued.
        assert!(tx.try_send(vec![2]).is_err());
        assert_eq!(rx.recv().await, Some(vec![1]));
        assert_eq!(tx.capacity(), 1);
    }
}
