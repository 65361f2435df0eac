pub mod error;
pub mod server;
pub mod session;

pub use error::{AppiumError, Result};
pub use server::{AppiumServer, AppiumServerConfig};
pub use session::{session_capabilities, AppiumClient, AppiumSession};
