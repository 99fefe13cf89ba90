use std::{fmt, process::Stdio, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::{Child, Command},
    sync::{mpsc, oneshot},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::params::Invocation;

const OUTPUT_CHANNEL_CAPACITY: usize = 256;

/// How a spawned process ended.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub signal: Option<i32>,
    pub error: Option<String>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0) && self.error.is_none()
    }

    fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
            error: None,
        }
    }

    fn from_error(err: std::io::Error) -> Self {
        Self {
            error: Some(err.to_string()),
            ..Self::default()
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error, self.code, self.signal) {
            (Some(err), _, _) => write!(f, "error: {err}"),
            (None, Some(code), _) => write!(f, "code {code}"),
            (None, None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None, None) => f.write_str("unknown status"),
        }
    }
}

#[derive(Debug)]
pub enum LaunchError {
    /// The executable does not exist in the environment.
    Missing(std::io::Error),
    Spawn(std::io::Error),
}

impl LaunchError {
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => LaunchError::Missing(err),
            _ => LaunchError::Spawn(err),
        }
    }
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::Missing(err) => write!(f, "executable not found: {err}"),
            LaunchError::Spawn(err) => write!(f, "spawn failed: {err}"),
        }
    }
}

impl std::error::Error for LaunchError {}

/// Raw output lines of a process, stdout and stderr interleaved.
///
/// Ends once the process has closed both streams. Not restartable.
pub struct OutputLines {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl OutputLines {
    pub async fn next_line(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// One spawned encoder process.
///
/// Termination is requested through the [`CancellationToken`] supplied at
/// spawn time; the watcher task then sends SIGTERM and force-kills after the
/// grace period.
pub struct ProcessHandle {
    id: Uuid,
    pid: Option<u32>,
    output: Option<OutputLines>,
    exit: Option<oneshot::Receiver<ProcessExit>>,
}

impl ProcessHandle {
    pub fn from_child(
        mut child: Child,
        id: Uuid,
        terminate: CancellationToken,
        grace: Duration,
    ) -> Self {
        let pid = child.id();

        let (line_tx, line_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump_lines(stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, line_tx.clone()));
        }
        drop(line_tx);

        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(async move {
            let exit = watch_child(child, terminate, grace).await;
            let _ = exit_tx.send(exit);
        });

        Self {
            id,
            pid,
            output: Some(OutputLines { rx: line_rx }),
            exit: Some(exit_rx),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Yields the output stream once; later calls return `None`.
    pub fn take_output(&mut self) -> Option<OutputLines> {
        self.output.take()
    }

    /// Yields the exit notification once; later calls return `None`.
    pub fn take_exit(&mut self) -> Option<ExitNotification> {
        self.exit.take().map(|rx| ExitNotification { rx })
    }
}

/// Resolves exactly once, when the process is gone.
pub struct ExitNotification {
    rx: oneshot::Receiver<ProcessExit>,
}

impl ExitNotification {
    pub async fn wait(self) -> ProcessExit {
        self.rx.await.unwrap_or_else(|_| ProcessExit {
            error: Some("process watcher dropped".to_string()),
            ..ProcessExit::default()
        })
    }
}

#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(
        &self,
        invocation: &Invocation,
        id: Uuid,
        terminate: CancellationToken,
    ) -> Result<ProcessHandle, LaunchError>;
}

pub type DynLauncher = Arc<dyn Launcher>;

/// Spawns invocations as real OS processes.
#[derive(Clone, Debug)]
pub struct SystemLauncher {
    grace: Duration,
}

impl SystemLauncher {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

#[async_trait]
impl Launcher for SystemLauncher {
    async fn launch(
        &self,
        invocation: &Invocation,
        id: Uuid,
        terminate: CancellationToken,
    ) -> Result<ProcessHandle, LaunchError> {
        tracing::debug!(job_id = %id, command = %invocation.command_line(), "spawning encoder");

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        command.envs(invocation.env.iter().map(|(key, value)| (key, value)));
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let child = command.spawn().map_err(LaunchError::from_io)?;
        Ok(ProcessHandle::from_child(child, id, terminate, self.grace))
    }
}

async fn watch_child(
    mut child: Child,
    terminate: CancellationToken,
    grace: Duration,
) -> ProcessExit {
    let result = tokio::select! {
        status = child.wait() => status,
        _ = terminate.cancelled() => terminate_child(&mut child, grace).await,
    };

    match result {
        Ok(status) => ProcessExit::from_status(status),
        Err(err) => ProcessExit::from_error(err),
    }
}

async fn terminate_child(
    child: &mut Child,
    grace: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    if send_sigterm(child) {
        if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
            return status;
        }
        tracing::warn!(
            pid = ?child.id(),
            grace_secs = grace.as_secs_f64(),
            "encoder ignored SIGTERM, killing"
        );
    }

    child.start_kill()?;
    child.wait().await
}

#[cfg(unix)]
fn send_sigterm(child: &Child) -> bool {
    use nix::{
        sys::signal::{Signal, kill},
        unistd::Pid,
    };

    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };

    kill(Pid::from_raw(raw), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
fn send_sigterm(_child: &Child) -> bool {
    false
}

/// Splits a byte stream on `\r` / `\n` so carriage-return progress updates
/// become separate lines.
async fn pump_lines<R>(mut reader: R, tx: mpsc::Sender<Vec<u8>>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(8192);
    let mut chunk = [0u8; 4096];

    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) => {
                tracing::debug!(error = %err, "encoder output stream closed with error");
                break;
            }
        };
        buffer.extend_from_slice(&chunk[..read]);

        while let Some(idx) = buffer
            .iter()
            .position(|byte| *byte == b'\r' || *byte == b'\n')
        {
            let mut line_bytes: Vec<u8> = buffer.drain(..=idx).collect();
            while matches!(buffer.first(), Some(b'\r' | b'\n')) {
                buffer.drain(..1);
            }
            while matches!(line_bytes.last(), Some(b'\r' | b'\n')) {
                line_bytes.pop();
            }
            if line_bytes.is_empty() {
                continue;
            }
            if tx.send(line_bytes).await.is_err() {
                return;
            }
        }
    }

    if !buffer.is_empty() {
        let _ = tx.send(buffer).await;
    }
}
