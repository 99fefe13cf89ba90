use std::{env, net::SocketAddr, time::Duration};

use crate::encoder::{Backend, InstallCommand, ToolPaths};

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub addr: SocketAddr,
    pub tools: ToolPaths,
    pub os: String,
    pub auto_install: bool,
    pub install_override: Option<InstallCommand>,
    pub stop_grace: Duration,
    pub default_backend: Backend,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        let addr = env::var("RELAY_ADDR")
            .ok()
            .and_then(|val| val.parse::<SocketAddr>().ok())
            .unwrap_or_else(|| {
                let port = env::var("PORT")
                    .ok()
                    .and_then(|val| val.parse::<u16>().ok())
                    .unwrap_or(DEFAULT_PORT);
                SocketAddr::from(([0, 0, 0, 0], port))
            });

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            ffmpeg: non_empty_var("FFMPEG").unwrap_or(defaults.ffmpeg),
            gst_launch: non_empty_var("GST").unwrap_or(defaults.gst_launch),
        };

        let os = non_empty_var("OS")
            .map(|val| val.to_ascii_lowercase())
            .unwrap_or_else(|| env::consts::OS.to_string());

        let auto_install = env::var("RELAY_AUTO_INSTALL")
            .ok()
            .and_then(|val| parse_flag(&val))
            .unwrap_or(true);

        let install_override = non_empty_var("RELAY_INSTALL_COMMAND")
            .and_then(|val| InstallCommand::parse(&val));

        let stop_grace = env::var("RELAY_STOP_GRACE_SECS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_STOP_GRACE);

        let default_backend = env::var("RELAY_DEFAULT_BACKEND")
            .ok()
            .and_then(|val| val.parse::<Backend>().ok())
            .unwrap_or_default();

        Self {
            addr,
            tools,
            os,
            auto_install,
            install_override,
            stop_grace,
            default_backend,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tools: ToolPaths::default(),
            os: env::consts::OS.to_string(),
            auto_install: true,
            install_override: None,
            stop_grace: DEFAULT_STOP_GRACE,
            default_backend: Backend::default(),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
