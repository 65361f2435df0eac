use emu_appium::AppiumServerConfig;
use emu_docker::container::DEFAULT_IMAGE_REPOSITORY;
use emu_docker::{default_boot_command, ManagerOptions, OrphanPolicy, ReadinessProbe};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CliError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "emufleet.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub docker: DockerSettings,
    pub readiness: ReadinessSettings,
    pub appium: AppiumServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerSettings {
    pub image_repository: String,
    /// Grace period for `stop`, e.g. `stop_timeout_secs = 10`. Left out of
    /// the file, the daemon's own default applies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_timeout_secs: Option<u64>,
    pub orphan_policy: OrphanPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessSettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Run inside the container; the emulator is booted once it prints `1`
    pub boot_command: Vec<String>,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image_repository: DEFAULT_IMAGE_REPOSITORY.to_owned(),
            stop_timeout_secs: None,
            orphan_policy: OrphanPolicy::Keep,
        }
    }
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_ms: 2000,
            boot_command: default_boot_command(),
        }
    }
}

impl FleetConfig {
    pub fn manager_options(&self) -> ManagerOptions {
        ManagerOptions::default()
            .with_image_repository(&self.docker.image_repository)
            .with_orphan_policy(self.docker.orphan_policy)
    }

    pub fn readiness_probe(&self) -> ReadinessProbe {
        ReadinessProbe::new(Duration::from_secs(self.readiness.timeout_secs))
            .with_poll_interval(Duration::from_millis(self.readiness.poll_interval_ms))
            .with_boot_command(self.readiness.boot_command.clone())
    }

    pub fn stop_timeout(&self) -> Option<Duration> {
        self.docker.stop_timeout_secs.map(Duration::from_secs)
    }
}

pub struct ConfigManager {
    config: FleetConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load settings. An explicit path must exist; without one,
    /// `emufleet.toml` in the working directory is used when present.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let (config, config_path) = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(CliError::ConfigError(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                (Self::load_config(&path)?, Some(path))
            }
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    (Self::load_config(&path)?, Some(path))
                } else {
                    (FleetConfig::default(), None)
                }
            }
        };

        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn get_config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn load_config(path: &Path) -> Result<FleetConfig> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn validate_config(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.config.docker.image_repository.trim().is_empty() {
            warnings.push("Image repository is empty".to_string());
        }

        if self.config.readiness.timeout_secs == 0 {
            warnings.push("Readiness timeout is zero, devices will never be considered booted".to_string());
        }

        if self.config.readiness.poll_interval_ms == 0 {
            warnings.push("Readiness poll interval is zero".to_string());
        }

        if self.config.readiness.boot_command.is_empty() {
            warnings.push("Readiness boot command is empty".to_string());
        }

        if self.config.appium.binary.trim().is_empty() {
            warnings.push("Appium binary is empty".to_string());
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_roundtrip_and_validation() {
        let config = FleetConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: FleetConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);

        let manager = ConfigManager {
            config,
            config_path: None,
        };
        assert!(manager.validate_config().is_empty(), "Default config should be valid");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emufleet.toml");
        std::fs::write(
            &path,
            "[docker]\nimage_repository = \"registry.local/android\"\norphan_policy = \"remove\"\n",
        )
        .unwrap();

        let manager = ConfigManager::new(Some(path.clone())).unwrap();
        let config = manager.get_config();

        assert_eq!(config.docker.image_repository, "registry.local/android");
        assert_eq!(config.docker.orphan_policy, OrphanPolicy::Remove);
        assert_eq!(config.docker.stop_timeout_secs, None);
        assert_eq!(config.stop_timeout(), None);
        assert_eq!(config.readiness, ReadinessSettings::default());
        assert_eq!(config.appium.binary, "appium");
        assert_eq!(manager.config_path(), Some(path.as_path()));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempdir().unwrap();
        let result = ConfigManager::new(Some(dir.path().join("missing.toml")));
        assert!(matches!(result, Err(CliError::ConfigError(_))));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[docker\nimage_repository = 3").unwrap();
        assert!(matches!(ConfigManager::new(Some(path)), Err(CliError::TomlError(_))));
    }

    #[test]
    fn test_validation_warnings() {
        let mut config = FleetConfig::default();
        config.readiness.timeout_secs = 0;
        config.docker.image_repository = String::new();

        let manager = ConfigManager {
            config,
            config_path: None,
        };
        assert_eq!(manager.validate_config().len(), 2);
    }

    #[test]
    fn test_derived_runtime_settings() {
        let mut config = FleetConfig::default();
        config.readiness.boot_command = vec!["getprop".to_string(), "dev.bootcomplete".to_string()];

        let probe = config.readiness_probe();
        assert_eq!(probe.boot_command, config.readiness.boot_command);
        assert_eq!(probe.timeout, Duration::from_secs(300));
        assert_eq!(probe.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.manager_options().image_repository, DEFAULT_IMAGE_REPOSITORY);
    }

    #[test]
    fn test_stop_timeout_defaults_to_daemon() {
        let config: FleetConfig = toml::from_str("[docker]\nimage_repository = \"x\"\n").unwrap();
        assert_eq!(config.stop_timeout(), None);

        let config: FleetConfig = toml::from_str("[docker]\nstop_timeout_secs = 10\n").unwrap();
        assert_eq!(config.stop_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_boot_command_from_file() {
        let config: FleetConfig =
            toml::from_str("[readiness]\nboot_command = [\"adb\", \"wait-for-device\"]\n").unwrap();
        assert_eq!(config.readiness.boot_command, vec!["adb", "wait-for-device"]);
        assert_eq!(config.readiness.timeout_secs, 300);
        assert_eq!(FleetConfig::default().readiness.boot_command, default_boot_command());
    }
}
