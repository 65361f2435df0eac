use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::container::ContainerManager;
use crate::error::{DockerError, Result};
use crate::runtime::ContainerRuntime;

/// Command run inside the container to read the Android boot flag
pub const BOOT_COMPLETED_COMMAND: [&str; 4] = ["adb", "shell", "getprop", "sys.boot_completed"];

/// Bounded polling for emulator boot.
///
/// A container counts as ready once the daemon reports it running and the
/// boot command, executed inside it, prints `1`. A published host port is
/// not used as a signal: the daemon's port proxy accepts connections long
/// before the emulator's adbd is up.
///
/// # Examples
///
/// ```rust,no_run
/// use emu_docker::{ContainerManager, ManagerOptions, ReadinessProbe};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = ContainerManager::connect(ManagerOptions::default()).await?;
/// let probe = ReadinessProbe::new(Duration::from_secs(300));
/// probe.wait_until_ready(&manager, "dev1").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub boot_command: Vec<String>,
}

pub fn default_boot_command() -> Vec<String> {
    BOOT_COMPLETED_COMMAND.iter().map(|s| s.to_string()).collect()
}

impl ReadinessProbe {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_secs(2),
            boot_command: default_boot_command(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_boot_command(mut self, command: Vec<String>) -> Self {
        self.boot_command = command;
        self
    }

    pub async fn wait_until_ready<R: ContainerRuntime>(
        &self,
        manager: &ContainerManager<R>,
        id: &str,
    ) -> Result<()> {
        let start = Instant::now();
        let mut attempts = 0u32;

        while start.elapsed() < self.timeout {
            attempts += 1;
            if self.check_once(manager, id).await? {
                info!(container = %id, attempts, elapsed = ?start.elapsed(), "emulator booted");
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(DockerError::NotReady {
            id: id.to_owned(),
            timeout: self.timeout,
        })
    }

    async fn check_once<R: ContainerRuntime>(
        &self,
        manager: &ContainerManager<R>,
        id: &str,
    ) -> Result<bool> {
        if !manager.is_running(id).await? {
            debug!(container = %id, "container not running yet");
            return Ok(false);
        }

        // adb itself fails while the emulator is still coming up; that is
        // just another not-ready poll.
        match manager.exec_output(id, &self.boot_command).await {
            Ok(output) if output.trim() == "1" => Ok(true),
            Ok(output) => {
                debug!(container = %id, output = %output.trim(), "boot not completed");
                Ok(false)
            }
            Err(e) => {
                debug!(container = %id, error = %e, "boot check failed");
                Ok(false)
            }
        }
    }
}
