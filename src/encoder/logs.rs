use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{options::Backend, process::OutputLines};

/// Forwards every output line of a job to the tracing subscriber.
///
/// Runs detached; the task ends when the process closes its output.
pub fn spawn_log_sink(job_id: Uuid, backend: Backend, mut output: OutputLines) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = 0usize;
        while let Some(raw) = output.next_line().await {
            let line = String::from_utf8_lossy(&raw);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            lines += 1;
            log_encoder_line(job_id, backend, trimmed);
        }
        tracing::trace!(%job_id, %backend, lines, "encoder output closed");
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LineLevel {
    Error,
    Warn,
    Debug,
    Trace,
}

pub(crate) fn classify_line(line: &str) -> LineLevel {
    let lowered = line.to_ascii_lowercase();

    if lowered.contains("error") || lowered.contains("failed") || lowered.contains("fatal") {
        return LineLevel::Error;
    }

    if lowered.contains("warning") || lowered.contains("deprecated") {
        return LineLevel::Warn;
    }

    if lowered.contains("speed=")
        || lowered.contains("bitrate=")
        || lowered.starts_with("input #")
        || lowered.starts_with("output #")
        || lowered.contains("stream #")
        || lowered.starts_with("setting pipeline")
        || lowered.contains("redistribute latency")
    {
        return LineLevel::Debug;
    }

    LineLevel::Trace
}

fn log_encoder_line(job_id: Uuid, backend: Backend, line: &str) {
    match classify_line(line) {
        LineLevel::Error => tracing::error!(%job_id, %backend, message = %line, "encoder output"),
        LineLevel::Warn => tracing::warn!(%job_id, %backend, message = %line, "encoder output"),
        LineLevel::Debug => tracing::debug!(%job_id, %backend, message = %line, "encoder output"),
        LineLevel::Trace => tracing::trace!(%job_id, %backend, message = %line, "encoder output"),
    }
}
