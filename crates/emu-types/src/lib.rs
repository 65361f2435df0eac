//! Common types shared across emufleet crates
//!
//! Holds the device descriptor model and the loader for the JSON device
//! file, so the Docker and Appium crates do not depend on each other.

pub mod device;
pub mod error;

pub use device::*;
pub use error::*;
