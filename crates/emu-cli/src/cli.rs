use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "emufleet",
    about = "Android emulator fleet provisioning on Docker",
    version = env!("CARGO_PKG_VERSION"),
    long_about = "Creates one privileged Docker container per configured Android emulator, waits for it to boot, then starts an Appium server and attaches a driver session."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file path (defaults to ./emufleet.toml when present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress log output
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(long, default_value = "plain")]
    pub format: OutputFormat,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Provision every device in the device file
    Up {
        /// Device file (JSON array of descriptors)
        #[arg(short, long, default_value = "devices.json")]
        devices: PathBuf,

        /// End sessions and exit, leaving the emulator containers running
        #[arg(long)]
        detach: bool,
    },

    /// Validate and list the device file
    Devices {
        #[arg(short, long, default_value = "devices.json")]
        devices: PathBuf,
    },

    /// Show the port plan for an Appium URL
    Ports {
        url: String,
    },

    /// Pull an image and create a container from it
    Create {
        #[arg(long)]
        image: String,

        #[arg(long)]
        name: String,

        /// Command to run in the container
        #[arg(trailing_var_arg = true)]
        cmd: Vec<String>,
    },

    /// Start a container
    Start {
        id: String,
    },

    /// Stop a container
    Stop {
        id: String,

        /// Grace period in seconds (overrides the settings file)
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Remove a container
    Rm {
        id: String,

        #[arg(short, long)]
        force: bool,
    },

    /// Show a one-shot resource snapshot of a container
    Stats {
        id: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Plain,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_up_defaults() {
        let cli = Cli::try_parse_from(["emufleet", "up"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Plain);
        match cli.command {
            Commands::Up { devices, detach } => {
                assert_eq!(devices, PathBuf::from("devices.json"));
                assert!(!detach);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_create_with_trailing_command() {
        let cli = Cli::try_parse_from([
            "emufleet", "create", "--image", "alpine:3", "--name", "box", "sleep", "60",
        ])
        .unwrap();

        match cli.command {
            Commands::Create { image, name, cmd } => {
                assert_eq!(image, "alpine:3");
                assert_eq!(name, "box");
                assert_eq!(cmd, vec!["sleep", "60"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_stop_timeout_and_globals() {
        let cli = Cli::try_parse_from([
            "emufleet", "-c", "fleet.toml", "--format", "json", "stop", "abc", "--timeout", "5",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("fleet.toml")));
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Stop { id, timeout } => {
                assert_eq!(id, "abc");
                assert_eq!(timeout, Some(5));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
