use bollard::container::Config;
use bollard::errors::Error as BollardError;
use bollard::models::HostConfig;
use emu_types::DeviceDescriptor;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DockerError, Result};
use crate::ports::{plan_ports, PortPlan};
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::stats::ContainerStats;

pub const DEFAULT_IMAGE_REPOSITORY: &str = "budtmo/docker-android";
pub const EMULATOR_LANGUAGE: &str = "en";
pub const EMULATOR_COUNTRY: &str = "US";

/// What to do with a container that was created but failed to start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave the stopped container in place for inspection
    #[default]
    Keep,
    /// Force-remove it before reporting the start failure
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerOptions {
    pub image_repository: String,
    pub orphan_policy: OrphanPolicy,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_owned(),
            orphan_policy: OrphanPolicy::Keep,
        }
    }
}

impl ManagerOptions {
    pub fn with_image_repository(mut self, repository: &str) -> Self {
        self.image_repository = repository.to_owned();
        self
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }
}

/// Issues one-shot lifecycle commands against the container runtime.
///
/// The manager owns its runtime handle and keeps no container state of its
/// own; the daemon is the only source of truth.
pub struct ContainerManager<R: ContainerRuntime = DockerRuntime> {
    runtime: R,
    options: ManagerOptions,
}

impl ContainerManager<DockerRuntime> {
    pub async fn connect(options: ManagerOptions) -> Result<Self> {
        let runtime = DockerRuntime::connect()
            .await
            .map_err(DockerError::ConnectionError)?;
        Ok(Self::with_runtime(runtime, options))
    }
}

impl<R: ContainerRuntime> ContainerManager<R> {
    pub fn with_runtime(runtime: R, options: ManagerOptions) -> Self {
        Self { runtime, options }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// `<repository>:emulator_<platform version>`
    pub fn image_reference(&self, platform_version: &str) -> String {
        format!("{}:emulator_{}", self.options.image_repository, platform_version)
    }

    /// Pull `image` and create a plain container from it.
    ///
    /// The pull always runs. A pull cut short by an end-of-file on the
    /// progress stream is tolerated, see [`is_clean_end_of_stream`].
    pub async fn create_container(
        &self,
        image: &str,
        name: &str,
        cmd: Option<Vec<String>>,
    ) -> Result<String> {
        info!(image = %image, "pulling image");
        match self.runtime.pull_image(image).await {
            Ok(()) => {}
            Err(e) if is_clean_end_of_stream(&e) => {
                debug!(image = %image, "pull stream ended early, continuing");
            }
            Err(source) => {
                return Err(DockerError::PullError {
                    image: image.to_owned(),
                    source,
                })
            }
        }

        let config = Config {
            image: Some(image.to_owned()),
            cmd,
            ..Default::default()
        };

        let id = self
            .runtime
            .create_container(name, config)
            .await
            .map_err(|source| DockerError::CreateError {
                name: name.to_owned(),
                source,
            })?;

        info!(container = %name, id = %id, "container created");
        Ok(id)
    }

    /// Provision and start the emulator container for one device.
    pub async fn create_and_start_container(&self, device: &DeviceDescriptor) -> Result<String> {
        let image = self.image_reference(&device.platform_version);
        self.ensure_image(&image).await?;

        let plan = plan_ports(&device.automation_endpoint);
        debug!(device = %device.device_name, ports = ?plan.ports(), "planned ports");

        let config = emulator_config(&image, device, &plan);
        let name = device.device_name.as_str();

        let id = self
            .runtime
            .create_container(name, config)
            .await
            .map_err(|source| DockerError::CreateError {
                name: name.to_owned(),
                source,
            })?;
        info!(container = %name, id = %id, image = %image, "emulator container created");

        if let Err(e) = self.start_container(&id).await {
            self.handle_orphan(&id).await;
            return Err(e);
        }

        Ok(id)
    }

    pub async fn start_container(&self, id: &str) -> Result<()> {
        self.runtime
            .start_container(id)
            .await
            .map_err(|source| DockerError::StartError {
                id: id.to_owned(),
                source,
            })?;
        info!(container = %id, "container started");
        Ok(())
    }

    /// Stop a container. A timeout is passed to the daemon in whole seconds.
    pub async fn stop_container(&self, id: &str, timeout: Option<Duration>) -> Result<()> {
        let timeout_secs = timeout.map(|t| t.as_secs() as i64);

        self.runtime
            .stop_container(id, timeout_secs)
            .await
            .map_err(|source| DockerError::StopError {
                id: id.to_owned(),
                source,
            })?;
        info!(container = %id, "container stopped");
        Ok(())
    }

    pub async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        self.runtime
            .remove_container(id, force)
            .await
            .map_err(|source| DockerError::RemoveError {
                id: id.to_owned(),
                source,
            })?;
        info!(container = %id, "container removed");
        Ok(())
    }

    pub async fn is_running(&self, id: &str) -> Result<bool> {
        self.runtime
            .is_running(id)
            .await
            .map_err(|source| DockerError::InspectError {
                id: id.to_owned(),
                source,
            })
    }

    pub async fn container_stats(&self, id: &str) -> Result<ContainerStats> {
        let sample = self
            .runtime
            .stats_snapshot(id)
            .await
            .map_err(|source| DockerError::StatsError {
                id: id.to_owned(),
                source,
            })?;

        match sample {
            Some(stats) => Ok(ContainerStats::from(&stats)),
            None => Err(DockerError::EmptyStats(id.to_owned())),
        }
    }

    /// Run `cmd` inside a running container and return its combined output.
    pub async fn exec_output(&self, id: &str, cmd: &[String]) -> Result<String> {
        self.runtime
            .exec_output(id, cmd.to_vec())
            .await
            .map_err(|source| DockerError::ExecError {
                id: id.to_owned(),
                source,
            })
    }

    /// Release the runtime connection. Consuming `self` rules out a second call.
    pub async fn close(self) -> Result<()> {
        self.runtime
            .close()
            .await
            .map_err(DockerError::ConnectionError)?;
        drop(self.runtime);
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        let exists = self
            .runtime
            .image_exists(image)
            .await
            .map_err(|source| DockerError::ImageLookupError {
                image: image.to_owned(),
                source,
            })?;

        if exists {
            debug!(image = %image, "image present locally, skipping pull");
            return Ok(());
        }

        info!(image = %image, "pulling image");
        self.runtime
            .pull_image(image)
            .await
            .map_err(|source| DockerError::PullError {
                image: image.to_owned(),
                source,
            })
    }

    async fn handle_orphan(&self, id: &str) {
        match self.options.orphan_policy {
            OrphanPolicy::Keep => {
                warn!(container = %id, "start failed, leaving created container in place");
            }
            OrphanPolicy::Remove => {
                if let Err(e) = self.remove_container(id, true).await {
                    warn!(container = %id, error = %e, "failed to remove container after start failure");
                }
            }
        }
    }
}

/// Container configuration for an emulator device.
pub fn emulator_config(image: &str, device: &DeviceDescriptor, plan: &PortPlan) -> Config<String> {
    Config {
        image: Some(image.to_owned()),
        env: Some(vec![
            format!("DEVICE={}", device.device_name),
            format!("EMULATOR_LANGUAGE={}", EMULATOR_LANGUAGE),
            format!("EMULATOR_COUNTRY={}", EMULATOR_COUNTRY),
        ]),
        exposed_ports: Some(plan.exposed_ports()),
        host_config: Some(emulator_host_config(plan)),
        ..Default::default()
    }
}

/// Host configuration for an emulator container.
///
/// Privileged mode is a trust boundary: hardware-accelerated emulation needs
/// `/dev/kvm` and related kernel capabilities, so every emulator container is
/// granted them. Only run images you trust.
pub fn emulator_host_config(plan: &PortPlan) -> HostConfig {
    HostConfig {
        port_bindings: Some(plan.port_bindings()),
        privileged: Some(true),
        ..Default::default()
    }
}

/// Whether a pull error is the progress stream closing early.
///
/// This is not a completed pull. A pull that finishes normally just ends the
/// stream; `UnexpectedEof` means the daemon connection dropped mid-transfer
/// and the image may be incomplete. `create_container` accepts it anyway and
/// leaves a missing image to surface as a create error.
pub fn is_clean_end_of_stream(err: &BollardError) -> bool {
    matches!(err, BollardError::IOError { err } if err.kind() == ErrorKind::UnexpectedEof)
}
