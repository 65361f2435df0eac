pub mod container;
pub mod error;
pub mod ports;
pub mod readiness;
pub mod runtime;
pub mod stats;

pub use container::{ContainerManager, ManagerOptions, OrphanPolicy};
pub use error::{DockerError, Result};
pub use ports::{plan_ports, PortPlan};
pub use readiness::{default_boot_command, ReadinessProbe};
pub use runtime::{ContainerRuntime, DockerRuntime};
pub use stats::ContainerStats;
