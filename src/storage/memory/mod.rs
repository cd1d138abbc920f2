//! In-memory implementations of storage interfaces.

mod event_log;
mod read_model;

pub use event_log::MemoryEventLog;
pub use read_model::MemoryReadModel;
