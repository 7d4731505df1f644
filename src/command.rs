//! Persistent, serialized shell command channels.
//!
//! Each managed device gets one [`CommandChannel`]: `adb shell` for the
//! emulator, `docker exec -i <container> /bin/sh` for the Linux desktop. The
//! channel exists for input the structured RPC cannot perform — text typing,
//! key combinations, clipboard pushes.
//!
//! Commands are written to the process stdin in submission order with a
//! trailing ` &`, so the shell backgrounds each one and a slow command never
//! blocks the next. Completion is not awaited and stdout is discarded; only
//! stderr is drained for diagnostics. If the process has exited, the next
//! submission respawns it transparently — commands submitted before the
//! crash are not redelivered.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// A live shell process behind the channel.
struct ShellProc {
    stdin: ChildStdin,
    alive: Arc<AtomicBool>,
}

/// A serialized executor over a long-lived shell process.
pub struct CommandChannel {
    /// Short label for log lines ("adb", "linux").
    name: &'static str,
    program: String,
    args: Vec<String>,
    proc: Mutex<Option<ShellProc>>,
}

impl CommandChannel {
    pub fn new(name: &'static str, program: String, args: Vec<String>) -> Self {
        Self {
            name,
            program,
            args,
            proc: Mutex::new(None),
        }
    }

    /// Submit one command line. Spawns or respawns the shell first if needed.
    ///
    /// Returns an error only when the shell cannot be spawned or its stdin
    /// pipe is broken; callers treat that as an input-submission failure
    /// (log, drop, no retry).
    pub async fn submit(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.proc.lock().await;

        let needs_spawn = match guard.as_ref() {
            Some(p) => !p.alive.load(Ordering::Relaxed),
            None => true,
        };
        if needs_spawn {
            *guard = Some(self.spawn_proc()?);
        }

        let proc = guard.as_mut().expect("shell proc present after spawn");
        let result = async {
            proc.stdin.write_all(format!("{line} &\n").as_bytes()).await?;
            proc.stdin.flush().await
        }
        .await;

        if let Err(e) = &result {
            warn!("{} shell stdin write failed: {e}", self.name);
            // Force a respawn on the next submission.
            *guard = None;
        }
        result
    }

    /// Spawn the shell eagerly so the first input command doesn't pay the
    /// startup cost.
    pub async fn prewarm(&self) {
        let mut guard = self.proc.lock().await;
        if guard.is_none() {
            match self.spawn_proc() {
                Ok(p) => *guard = Some(p),
                Err(e) => warn!("Failed to pre-warm {} shell: {e}", self.name),
            }
        }
    }

    fn spawn_proc(&self) -> std::io::Result<ShellProc> {
        info!("Spawning persistent {} shell", self.name);
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("failed to take shell stdin"))?;

        let alive = Arc::new(AtomicBool::new(true));
        let name = self.name;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!("{name} shell stderr: {}", line.trim_end());
                }
            });
        }

        let alive_flag = Arc::clone(&alive);
        tokio::spawn(async move {
            let status = child.wait().await;
            alive_flag.store(false, Ordering::Relaxed);
            match status {
                Ok(s) => info!("{name} shell exited: {s}"),
                Err(e) => warn!("{name} shell wait failed: {e}"),
            }
        });

        Ok(ShellProc { stdin, alive })
    }
}

/// Run a one-shot command and capture its stdout (used where output must be
/// parsed, e.g. reading the Linux clipboard — the persistent channel never
/// parses output).
pub async fn capture_output(
    program: &str,
    args: &[String],
    timeout: Duration,
) -> std::io::Result<String> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("failed to take stdout pipe"))?;

    tokio::time::timeout(timeout, async {
        let mut buf = Vec::new();
        stdout.read_to_end(&mut buf).await?;
        child.wait().await?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
    .await
    .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "command timed out"))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_submit_spawns_and_writes() {
        let ch = CommandChannel::new("test", "/bin/sh".to_string(), vec![]);
        ch.submit("true").await.unwrap();
        ch.submit("true").await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_respawns_after_exit() {
        // A shell that exits after consuming one line.
        let ch = CommandChannel::new(
            "test",
            "/bin/sh".to_string(),
            vec!["-c".to_string(), "read line".to_string()],
        );
        ch.submit("true").await.unwrap();
        // Wait for the exit monitor to observe the death.
        tokio::time::sleep(Duration::from_millis(300)).await;
        {
            let guard = ch.proc.lock().await;
            assert!(!guard.as_ref().unwrap().alive.load(Ordering::Relaxed));
        }
        // A dead shell is replaced transparently on the next submission.
        ch.submit("true").await.unwrap();
        let guard = ch.proc.lock().await;
        assert!(guard.as_ref().unwrap().alive.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_capture_output() {
        let out = capture_output(
            "/bin/sh",
            &["-c".to_string(), "printf hello".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out, "hello");
    }
}
