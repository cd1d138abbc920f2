//! Standalone runtime for running the whole pipeline in one process.
//!
//! Wires the Event Log, change relay, relay queue, projector and read
//! model together and runs the relay and projector loops as background
//! tasks.
//!
//! # Example
//!
//! ```ignore
//! use classconnect::standalone::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = Runtime::builder()
//!         .with_sqlite_file("./data/classconnect.db")
//!         .build()
//!         .await?;
//!
//!     let handle = runtime.start();
//!     let id = runtime.commands().create_room("Algebra", None).await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

mod builder;
mod runtime;

pub use builder::RuntimeBuilder;
pub use runtime::{Runtime, RuntimeHandle};

use crate::bus::QueueError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Errors raised while assembling a runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Relay queue initialization failed: {0}")]
    Queue(#[from] QueueError),
}
