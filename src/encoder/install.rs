use std::{process::Stdio, sync::Arc};

use tokio::{process::Command, sync::Mutex};

use crate::error::AppError;

use super::options::Backend;

const GST_APT_PACKAGES: &[&str] = &[
    "gstreamer1.0-tools",
    "gstreamer1.0-plugins-good",
    "gstreamer1.0-plugins-bad",
    "gstreamer1.0-plugins-ugly",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
    Unsupported,
}

impl Platform {
    pub fn from_os(os: &str) -> Self {
        match os.trim().to_ascii_lowercase().as_str() {
            "darwin" | "macos" => Platform::MacOs,
            "linux" => Platform::Linux,
            "windows" | "windows_nt" | "win32" => Platform::Windows,
            _ => Platform::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstallCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl InstallCommand {
    /// Splits a whitespace-separated command line; `None` when empty.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

pub fn install_command(platform: Platform, backend: Backend) -> Option<InstallCommand> {
    let command = match (platform, backend) {
        (Platform::MacOs, Backend::Ffmpeg) => InstallCommand::new("brew", &["install", "ffmpeg"]),
        (Platform::MacOs, Backend::Gstreamer) => {
            InstallCommand::new("brew", &["install", "gstreamer"])
        }
        (Platform::Linux, Backend::Ffmpeg) => {
            InstallCommand::new("sudo", &["apt-get", "install", "-y", "ffmpeg"])
        }
        (Platform::Linux, Backend::Gstreamer) => {
            let mut args = vec!["apt-get", "install", "-y"];
            args.extend_from_slice(GST_APT_PACKAGES);
            InstallCommand::new("sudo", &args)
        }
        (Platform::Windows, Backend::Ffmpeg) => {
            InstallCommand::new("choco", &["install", "-y", "ffmpeg"])
        }
        (Platform::Windows, Backend::Gstreamer) => {
            InstallCommand::new("choco", &["install", "-y", "gstreamer"])
        }
        (Platform::Unsupported, _) => return None,
    };
    Some(command)
}

/// Best-effort installer for a missing encoder executable.
///
/// Clones share one lock, so at most one install command runs at a time.
#[derive(Clone, Debug)]
pub struct Installer {
    enabled: bool,
    platform: Platform,
    command_override: Option<InstallCommand>,
    running: Arc<Mutex<()>>,
}

impl Installer {
    pub fn new(enabled: bool, os: &str, command_override: Option<InstallCommand>) -> Self {
        Self {
            enabled,
            platform: Platform::from_os(os),
            command_override,
            running: Arc::new(Mutex::new(())),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, "", None)
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub async fn install(&self, backend: Backend) -> Result<(), AppError> {
        if !self.enabled {
            return Err(AppError::dependency(format!(
                "{backend} is not installed and automatic installation is disabled"
            )));
        }

        let command = self
            .command_override
            .clone()
            .or_else(|| install_command(self.platform, backend))
            .ok_or_else(|| {
                AppError::dependency(format!(
                    "{backend} is not installed and no installer is known for {:?}",
                    self.platform
                ))
            })?;

        // package managers hold a global lock; concurrent runs fail
        let _running = self.running.lock().await;
        tracing::info!(
            %backend,
            program = %command.program,
            args = %command.args.join(" "),
            "installing missing encoder"
        );

        let status = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|err| {
                AppError::dependency(format!("failed to run {}: {err}", command.program))
            })?;

        if !status.success() {
            return Err(AppError::dependency(format!(
                "{} exited with status {status} while installing {backend}",
                command.program
            )));
        }

        tracing::info!(%backend, "encoder installation finished");
        Ok(())
    }
}
