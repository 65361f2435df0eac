//! Sequential fleet provisioning
//!
//! Each device goes through container creation, a bounded boot wait and
//! driver attachment before the next one starts. A failing device is
//! recorded and skipped; it never aborts the rest of the fleet.

use anyhow::Context;
use async_trait::async_trait;
use emu_appium::{AppiumClient, AppiumServer, AppiumServerConfig, AppiumSession};
use emu_docker::{plan_ports, ContainerManager, ContainerRuntime, ReadinessProbe};
use emu_types::DeviceDescriptor;
use std::time::Duration;
use tracing::{error, info, warn};

/// Attaches an automation driver to a booted device.
#[async_trait]
pub trait DeviceAttacher: Send + Sync {
    type Attachment: Send;

    async fn attach(&self, device: &DeviceDescriptor, port: u16) -> anyhow::Result<Self::Attachment>;

    async fn detach(&self, attachment: Self::Attachment) -> anyhow::Result<()>;
}

/// Launches a local Appium server per device and opens a session on it.
pub struct AppiumAttacher {
    config: AppiumServerConfig,
    poll_interval: Duration,
}

pub struct AppiumAttachment {
    server: AppiumServer,
    client: AppiumClient,
    session: AppiumSession,
}

impl AppiumAttachment {
    pub fn session(&self) -> &AppiumSession {
        &self.session
    }

    pub fn server_port(&self) -> u16 {
        self.server.port()
    }
}

impl AppiumAttacher {
    pub fn new(config: AppiumServerConfig) -> Self {
        Self {
            config,
            poll_interval: Duration::from_millis(500),
        }
    }
}

#[async_trait]
impl DeviceAttacher for AppiumAttacher {
    type Attachment = AppiumAttachment;

    async fn attach(&self, device: &DeviceDescriptor, port: u16) -> anyhow::Result<AppiumAttachment> {
        let server = AppiumServer::spawn(&self.config, port)?;
        let client = AppiumClient::new(port)?;

        client
            .wait_until_ready(self.config.startup_timeout(), self.poll_interval)
            .await?;
        let session = client.create_session(device).await?;

        Ok(AppiumAttachment {
            server,
            client,
            session,
        })
    }

    async fn detach(&self, attachment: AppiumAttachment) -> anyhow::Result<()> {
        let AppiumAttachment {
            server,
            client,
            session,
        } = attachment;

        if let Err(e) = client.delete_session(&session).await {
            warn!(session = %session.id, error = %e, "failed to end session");
        }
        server.shutdown().await?;
        Ok(())
    }
}

/// Result of provisioning one device.
pub struct DeviceOutcome<T> {
    pub device_name: String,
    /// Set whenever a container was created, even if a later step failed
    pub container_id: Option<String>,
    pub attachment: Option<T>,
    pub error: Option<String>,
}

impl<T> DeviceOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct FleetReport<T> {
    pub outcomes: Vec<DeviceOutcome<T>>,
}

impl<T> FleetReport<T> {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }

    pub fn succeeded(&self) -> usize {
        self.total() - self.failed()
    }
}

pub struct Orchestrator<'a, R: ContainerRuntime, A: DeviceAttacher> {
    manager: &'a ContainerManager<R>,
    probe: ReadinessProbe,
    attacher: A,
}

impl<'a, R: ContainerRuntime, A: DeviceAttacher> Orchestrator<'a, R, A> {
    pub fn new(manager: &'a ContainerManager<R>, probe: ReadinessProbe, attacher: A) -> Self {
        Self {
            manager,
            probe,
            attacher,
        }
    }

    pub async fn run(&self, devices: &[DeviceDescriptor]) -> FleetReport<A::Attachment> {
        let mut outcomes = Vec::with_capacity(devices.len());

        for device in devices {
            let mut outcome = DeviceOutcome {
                device_name: device.device_name.clone(),
                container_id: None,
                attachment: None,
                error: None,
            };

            if let Err(e) = self.provision(device, &mut outcome).await {
                error!(device = %device.device_name, error = %format!("{:#}", e), "device provisioning failed");
                outcome.error = Some(format!("{:#}", e));
            }
            outcomes.push(outcome);
        }

        let report = FleetReport { outcomes };
        info!(
            total = report.total(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "fleet provisioning finished"
        );
        report
    }

    async fn provision(
        &self,
        device: &DeviceDescriptor,
        outcome: &mut DeviceOutcome<A::Attachment>,
    ) -> anyhow::Result<()> {
        let id = self
            .manager
            .create_and_start_container(device)
            .await
            .context("container provisioning")?;
        outcome.container_id = Some(id.clone());

        self.probe
            .wait_until_ready(self.manager, &id)
            .await
            .context("emulator boot")?;

        let port = plan_ports(&device.automation_endpoint).appium_port();
        let attachment = self
            .attacher
            .attach(device, port)
            .await
            .context("driver attachment")?;
        outcome.attachment = Some(attachment);

        info!(device = %device.device_name, container = %id, port, "device ready");
        Ok(())
    }

    /// End driver sessions and stop their Appium servers, leaving containers up.
    pub async fn release_drivers(&self, report: &mut FleetReport<A::Attachment>) {
        for outcome in report.outcomes.iter_mut() {
            if let Some(attachment) = outcome.attachment.take() {
                if let Err(e) = self.attacher.detach(attachment).await {
                    warn!(device = %outcome.device_name, error = %e, "failed to detach driver");
                }
            }
        }
    }

    /// Release drivers, then stop every container the report created.
    pub async fn teardown(&self, mut report: FleetReport<A::Attachment>, stop_timeout: Option<Duration>) {
        self.release_drivers(&mut report).await;

        for outcome in report.outcomes {
            if let Some(id) = outcome.container_id {
                if let Err(e) = self.manager.stop_container(&id, stop_timeout).await {
                    warn!(device = %outcome.device_name, error = %e, "failed to stop container");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::container::{Config, Stats};
    use bollard::errors::Error as BollardError;
    use emu_docker::ManagerOptions;
    use mockall::mock;
    use mockall::predicate::*;
    use std::sync::{Arc, Mutex};

    mock! {
        pub Runtime {}

        #[async_trait]
        impl ContainerRuntime for Runtime {
            async fn image_exists(&self, reference: &str) -> Result<bool, BollardError>;
            async fn pull_image(&self, reference: &str) -> Result<(), BollardError>;
            async fn create_container(&self, name: &str, config: Config<String>) -> Result<String, BollardError>;
            async fn start_container(&self, id: &str) -> Result<(), BollardError>;
            async fn stop_container(&self, id: &str, timeout_secs: Option<i64>) -> Result<(), BollardError>;
            async fn remove_container(&self, id: &str, force: bool) -> Result<(), BollardError>;
            async fn is_running(&self, id: &str) -> Result<bool, BollardError>;
            async fn stats_snapshot(&self, id: &str) -> Result<Option<Stats>, BollardError>;
            async fn exec_output(&self, id: &str, cmd: Vec<String>) -> Result<String, BollardError>;
            async fn close(&self) -> Result<(), BollardError>;
        }
    }

    /// Images present, every create except `failing` succeeds, and
    /// emulators report `boot_flag` from the boot command.
    fn fleet_runtime(failing: &'static str, boot_flag: &'static str) -> MockRuntime {
        let mut runtime = MockRuntime::new();
        runtime.expect_image_exists().returning(|_| Ok(true));
        runtime.expect_create_container().returning(move |name, _| {
            if name == failing {
                return Err(BollardError::DockerResponseServerError {
                    status_code: 409,
                    message: "Conflict".to_string(),
                });
            }
            Ok(format!("id-{}", name))
        });
        runtime.expect_start_container().returning(|_| Ok(()));
        runtime.expect_is_running().returning(|_| Ok(true));
        runtime
            .expect_exec_output()
            .returning(move |_, _| Ok(format!("{}\n", boot_flag)));
        runtime
    }

    #[derive(Clone, Default)]
    struct StubAttacher {
        attached: Arc<Mutex<Vec<(String, u16)>>>,
        detached: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl DeviceAttacher for StubAttacher {
        type Attachment = String;

        async fn attach(&self, device: &DeviceDescriptor, port: u16) -> anyhow::Result<String> {
            self.attached
                .lock()
                .unwrap()
                .push((device.device_name.clone(), port));
            Ok(format!("session-{}", device.device_name))
        }

        async fn detach(&self, attachment: String) -> anyhow::Result<()> {
            self.detached.lock().unwrap().push(attachment);
            Ok(())
        }
    }

    fn device(name: &str, port: u16) -> DeviceDescriptor {
        DeviceDescriptor::new(
            &format!("http://localhost:{}", port),
            "Android",
            "11.0",
            name,
            "UiAutomator2",
        )
    }

    fn probe(timeout: Duration) -> ReadinessProbe {
        ReadinessProbe::new(timeout).with_poll_interval(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_failing_device_does_not_abort_fleet() {
        let mut runtime = fleet_runtime("bad", "1");
        runtime
            .expect_stop_container()
            .with(eq("id-good1"), eq(Some(10)))
            .times(1)
            .returning(|_, _| Ok(()));
        runtime
            .expect_stop_container()
            .with(eq("id-good2"), eq(Some(10)))
            .times(1)
            .returning(|_, _| Ok(()));

        let manager = ContainerManager::with_runtime(runtime, ManagerOptions::default());
        let attacher = StubAttacher::default();

        let orchestrator = Orchestrator::new(&manager, probe(Duration::from_secs(5)), attacher.clone());
        let devices = vec![device("good1", 4725), device("bad", 4726), device("good2", 4727)];
        let report = orchestrator.run(&devices).await;

        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);

        let bad = &report.outcomes[1];
        assert_eq!(bad.device_name, "bad");
        assert!(bad.container_id.is_none());
        assert!(bad.error.as_deref().unwrap().contains("container provisioning"));

        assert_eq!(
            *attacher.attached.lock().unwrap(),
            vec![("good1".to_string(), 4725), ("good2".to_string(), 4727)]
        );
        assert_eq!(
            report.outcomes[2].attachment.as_deref(),
            Some("session-good2")
        );

        orchestrator
            .teardown(report, Some(Duration::from_secs(10)))
            .await;

        assert_eq!(
            *attacher.detached.lock().unwrap(),
            vec!["session-good1".to_string(), "session-good2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_boot_timeout_keeps_container_id() {
        let mut runtime = fleet_runtime("", "0");
        runtime.expect_stop_container().never();

        let manager = ContainerManager::with_runtime(runtime, ManagerOptions::default());
        let attacher = StubAttacher::default();

        let orchestrator = Orchestrator::new(&manager, probe(Duration::from_millis(80)), attacher.clone());
        let report = orchestrator.run(&[device("slow", 4723)]).await;

        let outcome = &report.outcomes[0];
        assert_eq!(outcome.container_id.as_deref(), Some("id-slow"));
        assert!(outcome.error.as_deref().unwrap().contains("emulator boot"));
        assert!(attacher.attached.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_drivers_leaves_containers_running() {
        let mut runtime = fleet_runtime("", "1");
        runtime.expect_stop_container().never();
        runtime.expect_remove_container().never();

        let manager = ContainerManager::with_runtime(runtime, ManagerOptions::default());
        let attacher = StubAttacher::default();

        let orchestrator = Orchestrator::new(&manager, probe(Duration::from_secs(5)), attacher.clone());
        let mut report = orchestrator.run(&[device("dev1", 4725)]).await;
        orchestrator.release_drivers(&mut report).await;

        assert!(report.outcomes[0].attachment.is_none());
        assert_eq!(*attacher.detached.lock().unwrap(), vec!["session-dev1".to_string()]);
    }
}
