mod install;
mod logs;
mod options;
mod params;
mod process;

pub use install::{InstallCommand, Installer, Platform, install_command};
pub use logs::spawn_log_sink;
pub use options::{Backend, EncoderOptions, EncoderOverrides, Preset};
pub use params::{Invocation, ToolPaths, build_invocation};
pub use process::{
    DynLauncher, ExitNotification, LaunchError, Launcher, OutputLines, ProcessExit,
    ProcessHandle, SystemLauncher,
};
