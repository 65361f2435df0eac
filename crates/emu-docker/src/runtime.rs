//! The container runtime seam
//!
//! [`ContainerManager`](crate::ContainerManager) only talks to the daemon
//! through [`ContainerRuntime`], so lifecycle logic can be exercised against
//! a recording stub. [`DockerRuntime`] is the bollard-backed implementation.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, RemoveContainerOptions,
    StartContainerOptions, Stats, StatsOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tracing::debug;

/// The subset of the Docker API the lifecycle manager depends on.
///
/// Implementations are not required to tolerate concurrent use from
/// several workflows; the manager issues one call at a time.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Whether an image with exactly this reference exists locally
    async fn image_exists(&self, reference: &str) -> Result<bool, BollardError>;

    /// Pull an image, draining the progress stream until it ends
    async fn pull_image(&self, reference: &str) -> Result<(), BollardError>;

    /// Create a named container and return its id
    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String, BollardError>;

    async fn start_container(&self, id: &str) -> Result<(), BollardError>;

    /// `None` leaves the grace period to the daemon
    async fn stop_container(&self, id: &str, timeout_secs: Option<i64>) -> Result<(), BollardError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), BollardError>;

    async fn is_running(&self, id: &str) -> Result<bool, BollardError>;

    /// A single non-streaming stats sample, `None` if the daemon sent nothing
    async fn stats_snapshot(&self, id: &str) -> Result<Option<Stats>, BollardError>;

    /// Run a command inside the container and collect its stdout and stderr
    async fn exec_output(&self, id: &str, cmd: Vec<String>) -> Result<String, BollardError>;

    /// Release the connection. The owning manager calls this once, just
    /// before dropping the runtime.
    async fn close(&self) -> Result<(), BollardError>;
}

/// Docker daemon client.
///
/// `bollard::Docker` is `Send + Sync`, but a `DockerRuntime` is owned by a
/// single manager; create one per worker if devices are ever fanned out.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using `DOCKER_HOST` and related environment settings, falling
    /// back to the local socket, then negotiate the API version.
    pub async fn connect() -> Result<Self, BollardError> {
        let docker = Docker::connect_with_defaults()?;
        let docker = docker.negotiate_version().await?;
        debug!("connected to Docker daemon");
        Ok(Self { docker })
    }

    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn image_exists(&self, reference: &str) -> Result<bool, BollardError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![reference.to_string()]);

        let options = ListImagesOptions::<String> {
            filters,
            ..Default::default()
        };

        let images = self.docker.list_images(Some(options)).await?;
        Ok(!images.is_empty())
    }

    async fn pull_image(&self, reference: &str) -> Result<(), BollardError> {
        let options = CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            let info = progress?;
            if let Some(status) = info.status {
                debug!(image = %reference, status = %status, "pull progress");
            }
        }
        Ok(())
    }

    async fn create_container(&self, name: &str, config: Config<String>) -> Result<String, BollardError> {
        let options = CreateContainerOptions {
            name,
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!(container = %name, warning = %warning, "create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), BollardError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
    }

    async fn stop_container(&self, id: &str, timeout_secs: Option<i64>) -> Result<(), BollardError> {
        let options = timeout_secs.map(|t| StopContainerOptions { t });
        self.docker.stop_container(id, options).await
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), BollardError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(options)).await
    }

    async fn is_running(&self, id: &str) -> Result<bool, BollardError> {
        let info = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        Ok(info
            .state
            .and_then(|state| state.running)
            .unwrap_or(false))
    }

    async fn stats_snapshot(&self, id: &str) -> Result<Option<Stats>, BollardError> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };

        // The response body is released when the stream goes out of scope,
        // whether or not the sample decoded.
        let mut stream = self.docker.stats(id, Some(options));
        stream.next().await.transpose()
    }

    async fn exec_output(&self, id: &str, cmd: Vec<String>) -> Result<String, BollardError> {
        let options = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(id, options).await?;

        let mut result = String::new();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(chunk) = output.next().await {
                result.push_str(&chunk?.to_string());
            }
        }
        Ok(result)
    }

    async fn close(&self) -> Result<(), BollardError> {
        // bollard keeps no session state; the connection pool is released
        // when the client is dropped.
        debug!("closing Docker client");
        Ok(())
    }
}
