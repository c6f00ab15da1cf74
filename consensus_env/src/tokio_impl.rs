//! Production implementations backed by Tokio and POSIX process groups.

use crate::error::EnvError;
use crate::process::{ProcessExit, ProcessGroup, ProcessLauncher};
use crate::types::CommandSpec;
use crate::SimClock;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use regex::Regex;
use std::borrow::Cow;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long `wait()` lets the log pump drain after the leader exits.
const LOG_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Wall clock backed by `Instant` and `tokio::time::sleep`.
pub struct TokioClock {
    /// Start time for monotonic duration calculations
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SimClock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Removes terminal color sequences (`ESC [ ... m` / `ESC [ ... K`).
pub fn strip_ansi(line: &str) -> Cow<'_, str> {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let ansi = ANSI.get_or_init(|| Regex::new(r"\x1B\[[0-9;]*[mK]").expect("valid ANSI pattern"));
    ansi.replace_all(line, "")
}

/// Launches real OS processes, each as the leader of a fresh process group.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for TokioLauncher {
    fn launch(
        &self,
        command: &CommandSpec,
        log_file: &Path,
    ) -> Result<Box<dyn ProcessGroup>, EnvError> {
        let log = std::fs::File::create(log_file).map_err(|e| EnvError::io(log_file, e))?;

        let mut cmd = Command::new(command.program());
        cmd.args(command.to_args())
            .envs(command.env_vars().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| EnvError::spawn(command.program(), e))?;

        debug!(
            "Spawned {} (pid={:?}), logging to {}",
            command.program().display(),
            child.id(),
            log_file.display()
        );

        let log_pump = child
            .stdout
            .take()
            .map(|stdout| tokio::spawn(pump_log(stdout, tokio::fs::File::from_std(log))));

        Ok(Box::new(TokioProcessGroup { child, log_pump }))
    }
}

/// A spawned child that leads its own process group.
pub struct TokioProcessGroup {
    child: Child,

    /// Task copying the child's stdout into its log file
    log_pump: Option<JoinHandle<()>>,
}

impl TokioProcessGroup {
    fn signal_group(&self, signal: Signal) -> Result<(), EnvError> {
        // `id()` is None once the leader has been reaped.
        let Some(pgid) = self.child.id() else {
            return Ok(());
        };

        match killpg(Pid::from_raw(pgid as i32), signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(source) => Err(EnvError::Signal { pgid, source }),
        }
    }
}

#[async_trait]
impl ProcessGroup for TokioProcessGroup {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn interrupt_group(&mut self) -> Result<(), EnvError> {
        self.signal_group(Signal::SIGINT)
    }

    fn kill_group(&mut self) -> Result<(), EnvError> {
        self.signal_group(Signal::SIGKILL)
    }

    async fn wait(&mut self) -> Result<ProcessExit, EnvError> {
        let pid = self.child.id().unwrap_or_default();
        let status = self
            .child
            .wait()
            .await
            .map_err(|source| EnvError::Wait { pid, source })?;

        if let Some(pump) = self.log_pump.take() {
            if tokio::time::timeout(LOG_DRAIN_TIMEOUT, pump).await.is_err() {
                warn!("Log pump for pid {} did not drain in time", pid);
            }
        }

        Ok(exit_from_status(status))
    }
}

fn exit_from_status(status: ExitStatus) -> ProcessExit {
    use std::os::unix::process::ExitStatusExt;

    ProcessExit {
        code: status.code(),
        signal: status.signal(),
    }
}

/// Copies `reader` line by line into `sink`, stripping color sequences.
async fn pump_log<R>(reader: R, mut sink: tokio::fs::File)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let clean = strip_ansi(&line);
                if let Err(e) = sink.write_all(clean.as_bytes()).await {
                    warn!("Failed to write node log: {}", e);
                    break;
                }
                let _ = sink.flush().await;
            }
            Err(e) => {
                debug!("Node output closed: {}", e);
                break;
            }
        }
    }

    let _ = sink.flush().await;
}
