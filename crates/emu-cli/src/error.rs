use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{failed} of {total} devices failed to provision")]
    PartialFailure { failed: usize, total: usize },

    #[error("Device configuration error: {0}")]
    DeviceConfigError(#[from] emu_types::ConfigError),

    #[error("Docker error: {0}")]
    DockerError(#[from] emu_docker::DockerError),

    #[error("Appium error: {0}")]
    AppiumError(#[from] emu_appium::AppiumError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
