//! Runtime for managing broker connections.
//!
//! This module provides:
//! - `RabbitMqDriver`: shared driver state (client, slot pool, counters, tunables)
//! - `DriverSlot`: one worker's connection and configuration
//! - `SlotWorker`: an OS thread that owns a slot and feeds it from a queue
//!
//! A slot's lifecycle:
//! - Claimed from the pool at allocation
//! - Connected lazily, rotating through the configured hosts
//! - Heartbeats and inbound frames handled inline after each publish
//! - Torn down on any protocol error, reconnected by the next submission
//! - Released back to the pool when dropped

mod connection;
mod driver;
mod publisher;
mod slot;
mod worker;

pub(crate) use driver::DriverShared;

pub use driver::RabbitMqDriver;
pub use slot::DriverSlot;
pub use worker::{SlotWorker, WorkerReport};
