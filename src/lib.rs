//! classconnect - event-sourced room aggregates.
//!
//! Commands append versioned events to an Event Log under optimistic
//! concurrency. A change relay forwards committed events to an
//! at-least-once queue, and a projector folds them into a read model
//! that tolerates duplicates, reordering and gaps.

pub mod bus;
pub mod commands;
pub mod config;
pub mod dlq;
pub mod domain;
pub mod projector;
pub mod query;
pub mod relay;
pub mod standalone;
pub mod storage;
pub mod utils;
