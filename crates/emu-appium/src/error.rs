use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppiumError {
    #[error("Failed to launch Appium server {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stop Appium server: {0}")]
    Shutdown(#[source] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Session request rejected: {0}")]
    Session(String),

    #[error("Appium server on port {port} not ready within {timeout:?}")]
    NotReady { port: u16, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, AppiumError>;
