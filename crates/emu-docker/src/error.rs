use bollard::errors::Error as BollardError;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DockerError {
    #[error("Docker connection failed: {0}")]
    ConnectionError(#[source] BollardError),

    #[error("Image lookup failed for {image}: {source}")]
    ImageLookupError {
        image: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to pull image {image}: {source}")]
    PullError {
        image: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to create container {name}: {source}")]
    CreateError {
        name: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to start container {id}: {source}")]
    StartError {
        id: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to stop container {id}: {source}")]
    StopError {
        id: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to remove container {id}: {source}")]
    RemoveError {
        id: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to inspect container {id}: {source}")]
    InspectError {
        id: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to get stats for container {id}: {source}")]
    StatsError {
        id: String,
        #[source]
        source: BollardError,
    },

    #[error("Failed to exec in container {id}: {source}")]
    ExecError {
        id: String,
        #[source]
        source: BollardError,
    },

    #[error("Stats stream for container {0} ended without a sample")]
    EmptyStats(String),

    #[error("Container {id} was not ready within {timeout:?}")]
    NotReady { id: String, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, DockerError>;
