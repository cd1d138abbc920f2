//! classconnect-standalone: the whole pipeline in one process.
//!
//! Runs the change relay and projector loops against the configured
//! storage and relay queue until Ctrl+C.
//!
//! ## Configuration
//! ```yaml
//! resources:
//!   aggregates_table: aggregates
//!   events_table: events
//!   read_model_table: classconnect
//!   relay_queue: new-events
//!
//! storage:
//!   type: sqlite
//!   sqlite:
//!     path: ./data/classconnect.db
//!
//! messaging:
//!   type: channel
//! ```
//!
//! The legacy variables `DYNAMODB_TABLE_AGGREGATES`, `DYNAMODB_TABLE_EVENTS`,
//! `DYNAMODB_TABLE_CLASSCONNECT` and `NEW_EVENTS_QUEUE` override the
//! resource names.

use tracing::{error, info};

use classconnect::config::Config;
use classconnect::standalone::Runtime;
use classconnect::utils::bootstrap::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;

    // Refuse to start without every table and queue name.
    let resources = match config.resources() {
        Ok(resources) => resources,
        Err(e) => {
            error!(error = %e, "Missing resource configuration");
            return Err(e.into());
        }
    };
    info!(
        aggregates = %resources.aggregates_table,
        events = %resources.events_table,
        read_model = %resources.read_model_table,
        queue = %resources.relay_queue,
        "Starting classconnect-standalone"
    );

    let runtime = Runtime::from_config(&config).await?;
    runtime.run().await
}
