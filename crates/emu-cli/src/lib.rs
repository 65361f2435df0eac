pub mod cli;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod orchestrator;

pub use cli::{Cli, Commands, OutputFormat};
pub use commands::CommandHandler;
pub use config::{ConfigManager, FleetConfig};
pub use error::{CliError, Result};
pub use orchestrator::{DeviceAttacher, FleetReport, Orchestrator};
