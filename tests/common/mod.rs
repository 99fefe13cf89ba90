#![allow(dead_code)]

use std::{
    process::Stdio,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use srt_relay::{
    encoder::{DynLauncher, Installer, Invocation, LaunchError, Launcher, ProcessHandle, ToolPaths},
    supervisor::Supervisor,
};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const SOURCE: &str = "srt://host:1";
pub const DESTINATION: &str = "rtmp://host/live";
pub const WAIT: Duration = Duration::from_secs(10);

/// Runs a fixed `sh -c` script in place of the real encoder and records
/// every invocation it was asked to launch.
pub struct ScriptLauncher {
    script: String,
    launches: Arc<Mutex<Vec<Invocation>>>,
}

impl ScriptLauncher {
    pub fn new(script: &str) -> Self {
        Self {
            script: script.to_string(),
            launches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn launches(&self) -> Arc<Mutex<Vec<Invocation>>> {
        self.launches.clone()
    }
}

#[async_trait]
impl Launcher for ScriptLauncher {
    async fn launch(
        &self,
        invocation: &Invocation,
        id: Uuid,
        terminate: CancellationToken,
    ) -> Result<ProcessHandle, LaunchError> {
        self.launches.lock().unwrap().push(invocation.clone());
        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(LaunchError::from_io)?;
        Ok(ProcessHandle::from_child(
            child,
            id,
            terminate,
            Duration::from_secs(1),
        ))
    }
}

pub fn script_supervisor(script: &str) -> (Supervisor, Arc<Mutex<Vec<Invocation>>>) {
    let launcher = ScriptLauncher::new(script);
    let launches = launcher.launches();
    let launcher: DynLauncher = Arc::new(launcher);
    let supervisor = Supervisor::new(launcher, Installer::disabled(), ToolPaths::default());
    (supervisor, launches)
}

pub async fn wait_until_empty(supervisor: &Supervisor) {
    tokio::time::timeout(WAIT, async {
        while !supervisor.list().await.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("registry did not drain in time");
}
