use emu_docker::{plan_ports, ContainerManager, ContainerStats, PortPlan};
use emu_types::{load_device_configs, DeviceDescriptor};
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::cli::OutputFormat;
use crate::config::ConfigManager;
use crate::display;
use crate::error::{CliError, Result};
use crate::orchestrator::{AppiumAttacher, AppiumAttachment, FleetReport, Orchestrator};

pub struct CommandHandler {
    config_manager: ConfigManager,
    output_format: OutputFormat,
}

impl CommandHandler {
    pub fn new(config_manager: ConfigManager) -> Self {
        for warning in config_manager.validate_config() {
            display::warning(&warning);
        }

        Self {
            config_manager,
            output_format: OutputFormat::Plain,
        }
    }

    pub fn set_output_format(&mut self, format: OutputFormat) {
        self.output_format = format;
    }

    async fn connect(&self) -> Result<ContainerManager> {
        let options = self.config_manager.get_config().manager_options();
        Ok(ContainerManager::connect(options).await?)
    }

    pub async fn up(&self, devices_path: &Path, detach: bool) -> Result<()> {
        let config = self.config_manager.get_config();
        let devices = load_device_configs(devices_path)?;
        info!(count = devices.len(), path = %devices_path.display(), "loaded devices");

        let manager = self.connect().await?;
        let orchestrator = Orchestrator::new(
            &manager,
            config.readiness_probe(),
            AppiumAttacher::new(config.appium.clone()),
        );

        let mut report = orchestrator.run(&devices).await;
        self.print_report(&report)?;
        let (failed, total) = (report.failed(), report.total());

        if detach {
            orchestrator.release_drivers(&mut report).await;
        } else {
            if report.succeeded() > 0 {
                println!("Press Ctrl-C to tear down the fleet");
                tokio::signal::ctrl_c().await?;
            }
            info!("tearing down fleet");
            orchestrator.teardown(report, config.stop_timeout()).await;
        }

        drop(orchestrator);
        manager.close().await?;

        if failed > 0 {
            return Err(CliError::PartialFailure { failed, total });
        }
        Ok(())
    }

    pub fn devices(&self, devices_path: &Path) -> Result<()> {
        let devices = load_device_configs(devices_path)?;

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&devices)?),
            OutputFormat::Plain => {
                let repository = &self.config_manager.get_config().docker.image_repository;
                for device in &devices {
                    print_device(device, repository);
                }
                display::success(&format!("{} device(s) loaded", devices.len()));
            }
        }
        Ok(())
    }

    pub fn ports(&self, url: &str) -> Result<()> {
        let plan = plan_ports(url);

        match self.output_format {
            OutputFormat::Json => {
                let value = json!({
                    "appium_port": plan.appium_port(),
                    "ports": plan.ports(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Plain => print_port_plan(&plan),
        }
        Ok(())
    }

    pub async fn create(&self, image: &str, name: &str, cmd: Vec<String>) -> Result<()> {
        let manager = self.connect().await?;
        let cmd = if cmd.is_empty() { None } else { Some(cmd) };

        let id = manager.create_container(image, name, cmd).await?;
        manager.close().await?;

        match self.output_format {
            OutputFormat::Json => println!("{}", json!({ "id": id, "name": name })),
            OutputFormat::Plain => display::success(&format!("Created container {} ({})", name, id)),
        }
        Ok(())
    }

    pub async fn start(&self, id: &str) -> Result<()> {
        let manager = self.connect().await?;
        manager.start_container(id).await?;
        manager.close().await?;

        display::success(&format!("Started container {}", id));
        Ok(())
    }

    pub async fn stop(&self, id: &str, timeout_secs: Option<u64>) -> Result<()> {
        let timeout = timeout_secs
            .map(Duration::from_secs)
            .or_else(|| self.config_manager.get_config().stop_timeout());

        let manager = self.connect().await?;
        manager.stop_container(id, timeout).await?;
        manager.close().await?;

        display::success(&format!("Stopped container {}", id));
        Ok(())
    }

    pub async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let manager = self.connect().await?;
        manager.remove_container(id, force).await?;
        manager.close().await?;

        display::success(&format!("Removed container {}", id));
        Ok(())
    }

    pub async fn stats(&self, id: &str) -> Result<()> {
        let manager = self.connect().await?;
        let stats = manager.container_stats(id).await?;
        manager.close().await?;

        match self.output_format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            OutputFormat::Plain => print_stats(id, &stats),
        }
        Ok(())
    }

    fn print_report(&self, report: &FleetReport<AppiumAttachment>) -> Result<()> {
        match self.output_format {
            OutputFormat::Json => {
                let devices: Vec<_> = report
                    .outcomes
                    .iter()
                    .map(|o| {
                        json!({
                            "device": o.device_name,
                            "container_id": o.container_id,
                            "session_id": o.attachment.as_ref().map(|a| a.session().id.clone()),
                            "appium_port": o.attachment.as_ref().map(|a| a.server_port()),
                            "error": o.error,
                        })
                    })
                    .collect();
                let value = json!({
                    "total": report.total(),
                    "succeeded": report.succeeded(),
                    "failed": report.failed(),
                    "devices": devices,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            }
            OutputFormat::Plain => {
                for outcome in &report.outcomes {
                    match (&outcome.error, &outcome.attachment) {
                        (None, Some(attachment)) => display::success(&format!(
                            "{}: session {} on port {}",
                            outcome.device_name,
                            attachment.session().id,
                            attachment.server_port()
                        )),
                        (None, None) => display::success(&outcome.device_name),
                        (Some(error), _) => {
                            display::failure(&format!("{}: {}", outcome.device_name, error))
                        }
                    }
                }
                println!(
                    "{} of {} device(s) ready",
                    report.succeeded(),
                    report.total()
                );
            }
        }
        Ok(())
    }
}

fn print_device(device: &DeviceDescriptor, repository: &str) {
    let plan = plan_ports(&device.automation_endpoint);
    println!(
        "{:<20} {} {:<8} {}:emulator_{}  appium port {}",
        device.device_name,
        device.platform,
        device.platform_version,
        repository,
        device.platform_version,
        plan.appium_port()
    );
}

fn print_port_plan(plan: &PortPlan) {
    for port in plan.ports() {
        println!("{}/tcp -> {}:{}", port, emu_docker::ports::BIND_ALL_INTERFACES, port);
    }
    println!("appium port: {}", plan.appium_port());
}

fn print_stats(id: &str, stats: &ContainerStats) {
    println!("Container:   {}", id);
    println!("CPU:         {:.2}%", stats.cpu_usage_percent);
    println!(
        "Memory:      {} / {} ({:.1}%)",
        display::format_bytes(stats.memory_usage_bytes),
        display::format_bytes(stats.memory_limit_bytes),
        stats.get_memory_usage_percent()
    );
    println!(
        "Network:     rx {} / tx {}",
        display::format_bytes(stats.network_rx_bytes),
        display::format_bytes(stats.network_tx_bytes)
    );
    println!(
        "Block I/O:   read {} / write {}",
        display::format_bytes(stats.block_read_bytes),
        display::format_bytes(stats.block_write_bytes)
    );
    println!("PIDs:        {}", stats.pids);
}
