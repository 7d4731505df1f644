//! Emulator transport recovery. Frame pumps signal here when their stream
//! dies; a single reconnector task owns the retry schedule, swaps in a fresh
//! channel pair, rediscovers screen dimensions, and resubscribes every live
//! client. Failure signals that arrive while an attempt is already scheduled
//! collapse into it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{ReconnectConfig, StreamConfig};
use crate::device::EmulatorChannel;
use crate::lifecycle::DeviceLifecycle;
use crate::state::{ClientRegistry, DeviceState, SharedChannel};
use crate::stream;

/// Doubling retry delay with a floor and ceiling. The delay advances when an
/// attempt is scheduled and collapses back to the floor on success.
pub struct Backoff {
    delay: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl Backoff {
    #[must_use]
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            delay: floor,
            floor,
            ceiling,
        }
    }

    /// The delay to wait before the next attempt; doubles the stored delay
    /// for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = (self.delay * 2).min(self.ceiling);
        current
    }

    pub fn reset(&mut self) {
        self.delay = self.floor;
    }
}

/// Outcome of one reconnect attempt.
enum Attempt {
    /// Device not running; nothing to reconnect to. The schedule keeps its
    /// advanced delay so a flapping device does not hammer the transport.
    Skipped,
    /// Fresh channel swapped in, this many clients resubscribed.
    Rebuilt(usize),
    Failed(tonic::transport::Error),
}

/// The retry cycle: one wakeup per failure burst. Every signal raised while
/// the delay runs, or while the attempt itself is in flight, collapses into
/// that attempt. Returns when the failure channel closes.
async fn retry_loop<F, Fut>(mut failure_rx: mpsc::Receiver<()>, mut backoff: Backoff, mut attempt: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt>,
{
    while failure_rx.recv().await.is_some() {
        let delay = backoff.next_delay();
        info!("emulator stream lost, reconnecting in {delay:?}");
        sleep(delay).await;
        // Collapse every failure raised while we were waiting.
        while failure_rx.try_recv().is_ok() {}
        match attempt().await {
            Attempt::Skipped => {
                info!("emulator not running, skipping reconnect");
                continue;
            }
            Attempt::Rebuilt(resubscribed) => {
                backoff.reset();
                info!("emulator channel rebuilt, {resubscribed} client(s) resubscribed");
            }
            Attempt::Failed(err) => {
                warn!("emulator reconnect failed: {err}");
            }
        }
        // Failures raised during the attempt belong to the old channel;
        // drop them too.
        while failure_rx.try_recv().is_ok() {}
    }
}

pub struct Reconnector {
    pub channel: SharedChannel,
    pub dims: Arc<tokio::sync::RwLock<crate::device::Dimensions>>,
    pub clients: Arc<ClientRegistry>,
    pub emulator: Arc<DeviceLifecycle>,
    pub grpc_addr: String,
    pub stream: StreamConfig,
    pub reconnect: ReconnectConfig,
    /// Handed to freshly spawned pumps so their failures come back here.
    pub failure_tx: mpsc::Sender<()>,
}

impl Reconnector {
    pub fn spawn(self, failure_rx: mpsc::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let backoff = Backoff::new(
                Duration::from_millis(self.reconnect.initial_delay_ms),
                Duration::from_millis(self.reconnect.max_delay_ms),
            );
            let this = &self;
            retry_loop(failure_rx, backoff, || this.attempt()).await;
        })
    }

    async fn attempt(&self) -> Attempt {
        if self.emulator.state().await != DeviceState::Running {
            return Attempt::Skipped;
        }
        match self.rebuild().await {
            Ok(resubscribed) => Attempt::Rebuilt(resubscribed),
            Err(err) => Attempt::Failed(err),
        }
    }

    /// Swap in a fresh channel pair, refresh dimensions, and restart the
    /// frame pump of every registered client against the new channel.
    async fn rebuild(&self) -> Result<usize, tonic::transport::Error> {
        let fresh = Arc::new(EmulatorChannel::connect(&self.grpc_addr)?);
        *self.channel.write().await = fresh.clone();
        let dims = fresh.discover_dimensions().await;
        *self.dims.write().await = dims;
        let width = dims.stream_width(self.stream.max_width);
        let interval = Duration::from_millis(self.stream.min_frame_interval_ms);
        let clients = self.clients.all().await;
        let count = clients.len();
        for client in clients {
            client.cancel_pump().await;
            let pump = stream::spawn_pump(
                fresh.clone(),
                width,
                client.clone(),
                interval,
                self.failure_tx.clone(),
            );
            client.set_pump(pump).await;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        assert_eq!(b.next_delay(), Duration::from_secs(1));
        assert_eq!(b.next_delay(), Duration::from_secs(2));
        assert_eq!(b.next_delay(), Duration::from_secs(4));
        assert_eq!(b.next_delay(), Duration::from_secs(8));
        assert_eq!(b.next_delay(), Duration::from_secs(10));
        assert_eq!(b.next_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_reset_returns_to_floor() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        b.next_delay();
        b.next_delay();
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_burst_collapses_into_one_attempt() {
        let (tx, rx) = mpsc::channel::<()>(16);
        for _ in 0..5 {
            tx.send(()).await.unwrap();
        }
        drop(tx);
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        retry_loop(rx, backoff, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Attempt::Rebuilt(0)
            }
        })
        .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_keeps_schedule_advanced() {
        let (tx, rx) = mpsc::channel::<()>(16);
        tx.send(()).await.unwrap();
        let times = Arc::new(Mutex::new(Vec::new()));
        // The first attempt finds the device down and raises a fresh failure
        // itself (handing the sender over so the channel closes afterwards).
        let slot = Arc::new(Mutex::new(Some(tx)));
        let (t, s) = (times.clone(), slot.clone());
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(10));
        retry_loop(rx, backoff, move || {
            let (t, s) = (t.clone(), s.clone());
            async move {
                t.lock().unwrap().push(Instant::now());
                let taken = s.lock().unwrap().take();
                if let Some(tx) = taken {
                    tx.send(()).await.unwrap();
                    Attempt::Skipped
                } else {
                    Attempt::Rebuilt(0)
                }
            }
        })
        .await;
        let times = times.lock().unwrap();
        assert_eq!(times.len(), 2);
        // The skip did not reset the schedule: the second wait was doubled.
        assert_eq!(times[1] - times[0], Duration::from_secs(2));
    }
}
