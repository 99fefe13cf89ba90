use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::{
    config::RelayConfig,
    encoder::{
        Backend, DynLauncher, EncoderOptions, ExitNotification, Installer, Invocation,
        LaunchError, ProcessHandle, SystemLauncher, ToolPaths, build_invocation, spawn_log_sink,
    },
    error::AppError,
};

const SOURCE_SCHEMES: &[&str] = &["srt"];
const DESTINATION_SCHEMES: &[&str] = &["rtmp", "rtmps"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Running,
    Exited,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: Uuid,
    pub source_key: String,
    pub destination: String,
    pub backend: Backend,
    pub status: JobStatus,
    pub pid: Option<u32>,
    pub started_at_unix_ms: u128,
}

/// Caller's view of a started job.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub source_key: String,
    pub backend: Backend,
    pub pid: Option<u32>,
    status: watch::Receiver<JobStatus>,
}

impl JobHandle {
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Resolves once the OS process is gone and the registry entry released.
    pub async fn exited(&self) {
        let mut status = self.status.clone();
        let _ = status.wait_for(|value| *value == JobStatus::Exited).await;
    }
}

struct JobEntry {
    job_id: Uuid,
    destination: String,
    backend: Backend,
    pid: Option<u32>,
    started_at: SystemTime,
    terminate: CancellationToken,
    status: watch::Receiver<JobStatus>,
}

impl JobEntry {
    fn to_snapshot(&self, source_key: &str) -> JobSnapshot {
        JobSnapshot {
            job_id: self.job_id,
            source_key: source_key.to_string(),
            destination: self.destination.clone(),
            backend: self.backend,
            status: *self.status.borrow(),
            pid: self.pid,
            started_at_unix_ms: millis_since_epoch(self.started_at),
        }
    }
}

type Registry = Arc<Mutex<HashMap<String, JobEntry>>>;

#[derive(Clone, Copy)]
enum LaunchAttempt {
    Initial,
    AfterInstall,
}

/// Owns every running relay job, keyed by its SRT source URL.
#[derive(Clone)]
pub struct Supervisor {
    registry: Registry,
    launcher: DynLauncher,
    installer: Installer,
    tools: ToolPaths,
}

impl Supervisor {
    pub fn new(launcher: DynLauncher, installer: Installer, tools: ToolPaths) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            launcher,
            installer,
            tools,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        let launcher: DynLauncher = Arc::new(SystemLauncher::new(config.stop_grace));
        let installer = Installer::new(
            config.auto_install,
            &config.os,
            config.install_override.clone(),
        );
        Self::new(launcher, installer, config.tools.clone())
    }

    pub async fn start(
        &self,
        source_key: &str,
        destination: &str,
        backend: Backend,
        options: EncoderOptions,
    ) -> Result<JobHandle, AppError> {
        validate_endpoint(source_key, "sourceKey", SOURCE_SCHEMES)?;
        validate_endpoint(destination, "destination", DESTINATION_SCHEMES)?;
        let invocation =
            build_invocation(source_key, destination, &options, backend, &self.tools)?;

        let job_id = Uuid::new_v4();
        let terminate = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(JobStatus::Starting);

        {
            let mut guard = self.registry.lock().await;
            if guard.contains_key(source_key) {
                return Err(AppError::already_running(source_key));
            }
            guard.insert(
                source_key.to_string(),
                JobEntry {
                    job_id,
                    destination: destination.to_string(),
                    backend,
                    pid: None,
                    started_at: SystemTime::now(),
                    terminate: terminate.clone(),
                    status: status_rx.clone(),
                },
            );
        }

        let mut process = match self.launch(&invocation, backend, job_id, terminate).await {
            Ok(process) => process,
            Err(err) => {
                remove_if_current(&self.registry, source_key, job_id).await;
                tracing::error!(
                    %job_id,
                    source = %source_key,
                    %backend,
                    error = %err,
                    "encoder failed to start"
                );
                return Err(err);
            }
        };

        let pid = process.pid();
        if let Some(output) = process.take_output() {
            spawn_log_sink(process.id(), backend, output);
        }

        let still_registered = {
            let mut guard = self.registry.lock().await;
            match guard.get_mut(source_key) {
                Some(entry) if entry.job_id == job_id => {
                    entry.pid = pid;
                    true
                }
                _ => false,
            }
        };
        if still_registered {
            status_tx.send_replace(JobStatus::Running);
        }

        if let Some(exit) = process.take_exit() {
            spawn_exit_observer(
                self.registry.clone(),
                source_key.to_string(),
                job_id,
                backend,
                exit,
                status_tx,
            );
        }

        if still_registered {
            tracing::info!(
                %job_id,
                source = %source_key,
                destination,
                %backend,
                ?pid,
                "encoder started"
            );
        } else {
            tracing::info!(%job_id, source = %source_key, ?pid, "encoder stopped while starting");
        }

        Ok(JobHandle {
            job_id,
            source_key: source_key.to_string(),
            backend,
            pid,
            status: status_rx,
        })
    }

    /// Signals the job's process and drops the entry without waiting for exit.
    /// Returns whether a job was registered under `source_key`.
    pub async fn stop(&self, source_key: &str) -> bool {
        let removed = self.registry.lock().await.remove(source_key);

        match removed {
            Some(entry) => {
                entry.terminate.cancel();
                tracing::info!(
                    job_id = %entry.job_id,
                    source = %source_key,
                    pid = ?entry.pid,
                    "encoder stop requested"
                );
                true
            }
            None => {
                tracing::debug!(source = %source_key, "stop requested for unknown encoder");
                false
            }
        }
    }

    pub async fn status(&self, source_key: &str) -> Option<JobSnapshot> {
        let guard = self.registry.lock().await;
        guard
            .get(source_key)
            .map(|entry| entry.to_snapshot(source_key))
    }

    pub async fn list(&self) -> Vec<JobSnapshot> {
        let guard = self.registry.lock().await;
        let mut jobs: Vec<JobSnapshot> = guard
            .iter()
            .map(|(key, entry)| entry.to_snapshot(key))
            .collect();
        jobs.sort_by(|a, b| a.source_key.cmp(&b.source_key));
        jobs
    }

    /// Stops every job and waits up to `timeout` for their processes to exit.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        let drained: Vec<(String, JobEntry)> = self.registry.lock().await.drain().collect();
        let count = drained.len();

        let mut waiters = Vec::with_capacity(count);
        for (source_key, entry) in drained {
            entry.terminate.cancel();
            tracing::info!(
                job_id = %entry.job_id,
                source = %source_key,
                "stopping encoder for shutdown"
            );
            let mut status = entry.status;
            waiters.push(async move {
                let _ = status.wait_for(|value| *value == JobStatus::Exited).await;
            });
        }

        let all_exited = async {
            for waiter in waiters {
                waiter.await;
            }
        };
        if tokio::time::timeout(timeout, all_exited).await.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs_f64(),
                "encoders still running after shutdown timeout"
            );
        }

        count
    }

    async fn launch(
        &self,
        invocation: &Invocation,
        backend: Backend,
        job_id: Uuid,
        terminate: CancellationToken,
    ) -> Result<ProcessHandle, AppError> {
        let mut attempt = LaunchAttempt::Initial;

        loop {
            let err = match self
                .launcher
                .launch(invocation, job_id, terminate.clone())
                .await
            {
                Ok(process) => return Ok(process),
                Err(LaunchError::Spawn(err)) => {
                    return Err(AppError::spawn_failure(format!(
                        "{}: {err}",
                        invocation.program
                    )));
                }
                Err(LaunchError::Missing(err)) => err,
            };

            match attempt {
                LaunchAttempt::Initial => {
                    tracing::warn!(
                        %job_id,
                        %backend,
                        program = %invocation.program,
                        auto_install = self.installer.enabled(),
                        error = %err,
                        "encoder executable missing"
                    );
                    self.installer.install(backend).await?;
                    attempt = LaunchAttempt::AfterInstall;
                }
                LaunchAttempt::AfterInstall => {
                    return Err(AppError::dependency(format!(
                        "{} still missing after installation: {err}",
                        invocation.program
                    )));
                }
            }
        }
    }
}

fn spawn_exit_observer(
    registry: Registry,
    source_key: String,
    job_id: Uuid,
    backend: Backend,
    exit: ExitNotification,
    status: watch::Sender<JobStatus>,
) {
    tokio::spawn(async move {
        let exit = exit.wait().await;

        if let Some(error) = &exit.error {
            tracing::error!(%job_id, source = %source_key, %backend, %error, "encoder process lost");
        } else if exit.success() {
            tracing::info!(%job_id, source = %source_key, %backend, code = ?exit.code, "encoder exited");
        } else {
            tracing::warn!(
                %job_id,
                source = %source_key,
                %backend,
                code = ?exit.code,
                signal = ?exit.signal,
                "encoder exited"
            );
        }

        if remove_if_current(&registry, &source_key, job_id).await {
            tracing::debug!(%job_id, source = %source_key, "removed exited encoder from registry");
        }
        status.send_replace(JobStatus::Exited);
    });
}

async fn remove_if_current(registry: &Registry, source_key: &str, job_id: Uuid) -> bool {
    let mut guard = registry.lock().await;
    if guard
        .get(source_key)
        .is_some_and(|entry| entry.job_id == job_id)
    {
        guard.remove(source_key);
        true
    } else {
        false
    }
}

fn validate_endpoint(value: &str, field: &str, schemes: &[&str]) -> Result<Url, AppError> {
    if value.trim().is_empty() {
        return Err(AppError::invalid_request(format!("{field} is required")));
    }

    let url = Url::parse(value)
        .map_err(|err| AppError::invalid_request(format!("{field} is not a valid url: {err}")))?;

    if !schemes.contains(&url.scheme()) {
        return Err(AppError::invalid_request(format!(
            "{field} must use one of: {}",
            schemes.join(", ")
        )));
    }

    if !url.has_host() {
        return Err(AppError::invalid_request(format!("{field} is missing a host")));
    }

    Ok(url)
}

fn millis_since_epoch(system_time: SystemTime) -> u128 {
    system_time
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis()
}
