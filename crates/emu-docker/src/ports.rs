//! Port planning for emulator containers
//!
//! Every emulator container exposes the ADB port, the emulator console port
//! and the Appium port taken from the device's automation endpoint. Host
//! ports always equal container ports.

use bollard::models::PortBinding;
use http::Uri;
use std::collections::HashMap;

pub const ADB_PORT: u16 = 5555;
pub const EMULATOR_CONSOLE_PORT: u16 = 5554;
pub const DEFAULT_APPIUM_PORT: u16 = 4723;

/// Host interface every planned port is published on
pub const BIND_ALL_INTERFACES: &str = "0.0.0.0";

/// Ports to expose and publish for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPlan {
    ports: Vec<u16>,
    appium_port: u16,
}

impl PortPlan {
    /// Distinct planned ports in insertion order
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// The Appium port resolved from the endpoint URL
    pub fn appium_port(&self) -> u16 {
        self.appium_port
    }

    /// Exposed-port set in the shape the Docker API expects
    pub fn exposed_ports(&self) -> HashMap<String, HashMap<(), ()>> {
        self.ports
            .iter()
            .map(|port| (container_port_key(*port), HashMap::new()))
            .collect()
    }

    /// Port bindings publishing each port on all host interfaces
    pub fn port_bindings(&self) -> HashMap<String, Option<Vec<PortBinding>>> {
        self.ports
            .iter()
            .map(|port| {
                let binding = PortBinding {
                    host_ip: Some(BIND_ALL_INTERFACES.to_string()),
                    host_port: Some(port.to_string()),
                };
                (container_port_key(*port), Some(vec![binding]))
            })
            .collect()
    }
}

/// Build the port plan for an automation endpoint URL. Never fails.
pub fn plan_ports(automation_endpoint: &str) -> PortPlan {
    let appium_port = extract_port(automation_endpoint);

    let mut ports = Vec::with_capacity(3);
    for port in [ADB_PORT, EMULATOR_CONSOLE_PORT, appium_port] {
        if !ports.contains(&port) {
            ports.push(port);
        }
    }

    PortPlan { ports, appium_port }
}

/// Explicit port of an absolute URL, or [`DEFAULT_APPIUM_PORT`] when the
/// URL does not parse, has no scheme, or carries no port.
pub fn extract_port(url: &str) -> u16 {
    let uri = match url.parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return DEFAULT_APPIUM_PORT,
    };

    if uri.scheme().is_none() {
        return DEFAULT_APPIUM_PORT;
    }

    uri.port_u16().unwrap_or(DEFAULT_APPIUM_PORT)
}

fn container_port_key(port: u16) -> String {
    format!("{}/tcp", port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_extract_port_explicit() {
        assert_eq!(extract_port("http://localhost:4725"), 4725);
        assert_eq!(extract_port("http://127.0.0.1:4800/wd/hub"), 4800);
        assert_eq!(extract_port("https://grid.internal:443"), 443);
    }

    #[test]
    fn test_extract_port_fallbacks() {
        assert_eq!(extract_port("not a url"), DEFAULT_APPIUM_PORT);
        assert_eq!(extract_port("http://localhost"), DEFAULT_APPIUM_PORT);
        assert_eq!(extract_port("http://localhost/wd/hub"), DEFAULT_APPIUM_PORT);
        assert_eq!(extract_port("localhost:4725"), DEFAULT_APPIUM_PORT);
        assert_eq!(extract_port(""), DEFAULT_APPIUM_PORT);
    }

    #[test]
    fn test_plan_for_device_endpoint() {
        let plan = plan_ports("http://localhost:4725");
        assert_eq!(plan.ports(), &[5555, 5554, 4725]);
        assert_eq!(plan.appium_port(), 4725);

        let exposed = plan.exposed_ports();
        assert_eq!(exposed.len(), 3);
        assert!(exposed.contains_key("5555/tcp"));
        assert!(exposed.contains_key("5554/tcp"));
        assert!(exposed.contains_key("4725/tcp"));
    }

    #[test]
    fn test_plan_for_malformed_url() {
        let plan = plan_ports("not a url");
        assert_eq!(plan.ports(), &[5555, 5554, 4723]);
    }

    #[test]
    fn test_colliding_port_gets_single_binding() {
        let plan = plan_ports("http://localhost:5555");
        assert_eq!(plan.ports(), &[5555, 5554]);
        assert_eq!(plan.appium_port(), 5555);
        assert_eq!(plan.exposed_ports().len(), 2);

        let bindings = plan.port_bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings["5555/tcp"].as_ref().map(Vec::len), Some(1));
    }

    proptest! {
        #[test]
        fn prop_explicit_port_is_planned(port in 1u16..=65535, host in "[a-z][a-z0-9]{0,15}") {
            let url = format!("http://{}:{}", host, port);
            let plan = plan_ports(&url);

            let mut expected = vec![ADB_PORT, EMULATOR_CONSOLE_PORT];
            if !expected.contains(&port) {
                expected.push(port);
            }
            prop_assert_eq!(plan.ports(), expected.as_slice());
            prop_assert_eq!(plan.exposed_ports().len(), expected.len());
        }

        #[test]
        fn prop_bindings_mirror_container_ports(port in 1u16..=65535) {
            let plan = plan_ports(&format!("http://localhost:{}", port));

            for (key, bindings) in plan.port_bindings() {
                let bindings = bindings.expect("binding list");
                prop_assert_eq!(bindings.len(), 1);
                prop_assert_eq!(bindings[0].host_ip.as_deref(), Some(BIND_ALL_INTERFACES));
                let host_port = bindings[0].host_port.clone().expect("host port");
                prop_assert_eq!(key, format!("{}/tcp", host_port));
            }
        }

        #[test]
        fn prop_arbitrary_input_never_panics(input in ".{0,64}") {
            let plan = plan_ports(&input);
            prop_assert!(plan.ports().len() >= 2);
        }
    }
}
