//! # RabbitMQ Driver
//!
//! AMQP 0-9-1 publishing driver for event-processing pipelines.
//!
//! The driver forwards journal records into a broker exchange. It owns a
//! fixed pool of per-worker slots, each holding at most one broker connection,
//! and handles everything between the pipeline and the broker-client library:
//! host failover, login and channel setup, heartbeats, inbound frame draining
//! and routing-key derivation.
//!
//! ## Overview
//!
//! - **Slots**: each worker claims one [`DriverSlot`] for its lifetime; the
//!   pool holds [`MAX_CONCURRENCY`] of them
//! - **Failover**: a slot rotates through up to [`MAX_HOSTS`] hosts, one step
//!   per connect attempt
//! - **Routing**: records carrying a check identity are published with a key
//!   that encodes account, check and UUID (see [`routing`])
//! - **Broker client**: connections are opened through a [`BrokerClient`]
//!   implementation, so the wire protocol lives outside this crate
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rabbitmq_driver::testing::MemoryBroker;
//! use rabbitmq_driver::{DriverConfig, DriverResult, DriverSettings, RabbitMqDriver};
//!
//! fn main() -> DriverResult<()> {
//!     let driver = RabbitMqDriver::new(MemoryBroker::new(), DriverSettings::default());
//!
//!     let mut config = DriverConfig::from_file("rabbitmq.toml")?;
//!     config.apply_env_overrides();
//!
//!     let mut slot = driver.allocate(&config)?;
//!     slot.submit(b"M192.0.2.1\t1700000000\t550e8400-e29b-41d4-a716-446655440000\tcpu\n")?;
//!     slot.disconnect();
//!
//!     println!("{}", driver.status());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Pooled slots**: claims are exclusive and released on drop
//! - **Inline keep-alive**: heartbeats and inbound frames are serviced after
//!   each publish, without blocking
//! - **Worker threads**: [`SlotWorker`] owns a slot on its own thread and
//!   retries failed submissions with backoff
//! - **Observability**: structured logging, `metrics` counters and a status
//!   report

mod config;
mod error;
pub mod message;
mod metrics;
mod pool;
mod retry;
pub mod routing;
mod runtime;
mod status;
pub mod testing;
mod traits;

// Re-export public API
pub use config::{
    DriverConfig, DriverSettings, Endpoint, RetrySettings, DEFAULT_SOCKET_BUFFER, MAX_HOSTS,
};
pub use error::{BrokerError, DriverError, DriverResult};
pub use metrics::{StatsCounters, StatsSnapshot};
pub use pool::{OwnerToken, MAX_CONCURRENCY};
pub use routing::RoutingKeyDeriver;
pub use runtime::{DriverSlot, RabbitMqDriver, SlotWorker, WorkerReport};
pub use status::{ConnectionSummary, DriverStatus, SlotSummary};
pub use traits::{
    submit_code, BrokerClient, BrokerConnection, ConnectOutcome, DisconnectOutcome, MqDriver,
};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
