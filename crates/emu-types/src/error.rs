//! Errors raised while loading device configuration

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// The device file could not be read
    #[error("Failed to read device file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The device file is not a JSON array of well-formed descriptors
    #[error("Failed to parse device file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Two descriptors share a device name, which is also the container name
    #[error("Duplicate device name: {0}")]
    DuplicateDevice(String),
}
