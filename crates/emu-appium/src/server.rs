use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::{AppiumError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppiumServerConfig {
    pub binary: String,
    pub extra_args: Vec<String>,
    pub startup_timeout_secs: u64,
}

impl Default for AppiumServerConfig {
    fn default() -> Self {
        Self {
            binary: "appium".to_owned(),
            extra_args: Vec::new(),
            startup_timeout_secs: 30,
        }
    }
}

impl AppiumServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

/// A locally spawned Appium server.
///
/// The child process is killed when this value is dropped. Crash detection
/// and restarts are not handled.
#[derive(Debug)]
pub struct AppiumServer {
    child: Child,
    port: u16,
}

impl AppiumServer {
    pub fn command(config: &AppiumServerConfig, port: u16) -> Command {
        let mut cmd = Command::new(&config.binary);
        cmd.arg("--port")
            .arg(port.to_string())
            .args(&config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    pub fn spawn(config: &AppiumServerConfig, port: u16) -> Result<Self> {
        let child = Self::command(config, port)
            .spawn()
            .map_err(|source| AppiumError::Spawn {
                binary: config.binary.clone(),
                source,
            })?;

        info!(port, pid = ?child.id(), "Appium server launched");
        Ok(Self { child, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    pub async fn shutdown(mut self) -> Result<()> {
        debug!(port = self.port, "stopping Appium server");
        self.child.kill().await.map_err(AppiumError::Shutdown)
    }
}
