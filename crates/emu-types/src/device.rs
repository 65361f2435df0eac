//! Device descriptors and the device file loader

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// One emulator configuration record.
///
/// Field names on the wire follow the device file format; the Rust names
/// describe what each value is used for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// URL of the Appium server this device is driven through
    #[serde(rename = "appium_url")]
    pub automation_endpoint: String,

    #[serde(rename = "capability_platform")]
    pub platform: String,

    /// Interpolated into the emulator image tag
    #[serde(rename = "capability_platform_version")]
    pub platform_version: String,

    /// Also used as the container name, so it must be unique per run
    #[serde(rename = "capability_device_name")]
    pub device_name: String,

    #[serde(rename = "capability_automation_name")]
    pub automation_framework: String,
}

impl DeviceDescriptor {
    pub fn new(
        automation_endpoint: &str,
        platform: &str,
        platform_version: &str,
        device_name: &str,
        automation_framework: &str,
    ) -> Self {
        Self {
            automation_endpoint: automation_endpoint.to_owned(),
            platform: platform.to_owned(),
            platform_version: platform_version.to_owned(),
            device_name: device_name.to_owned(),
            automation_framework: automation_framework.to_owned(),
        }
    }
}

/// Load device descriptors from a JSON file, preserving file order.
///
/// A single malformed record fails the whole load.
pub fn load_device_configs(path: impl AsRef<Path>) -> Result<Vec<DeviceDescriptor>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let devices: Vec<DeviceDescriptor> =
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    ensure_unique_names(&devices)?;

    tracing::debug!(path = %path.display(), count = devices.len(), "loaded device configs");
    Ok(devices)
}

fn ensure_unique_names(devices: &[DeviceDescriptor]) -> Result<()> {
    let mut seen = HashSet::with_capacity(devices.len());
    for device in devices {
        if !seen.insert(device.device_name.as_str()) {
            return Err(ConfigError::DuplicateDevice(device.device_name.clone()));
        }
    }
    Ok(())
}
