//! The driver value shared by every worker

use crate::config::SlotConfig;
use crate::pool::{SlotPool, SlotProbe};
use crate::runtime::DriverSlot;
use crate::status::{ConnectionSummary, DriverStatus, SlotSummary};
use crate::{
    BrokerClient, ConnectOutcome, DisconnectOutcome, DriverConfig, DriverResult, DriverSettings,
    MqDriver, StatsCounters, StatsSnapshot,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// State every slot of a driver refers back to
pub(crate) struct DriverShared<C> {
    pub(crate) client: C,
    pub(crate) pool: SlotPool,
    pub(crate) stats: StatsCounters,
    sndbuf: AtomicUsize,
    rcvbuf: AtomicUsize,
}

impl<C> DriverShared<C> {
    /// Current (send, receive) socket buffer hints
    pub(crate) fn socket_buffers(&self) -> (usize, usize) {
        (
            self.sndbuf.load(Ordering::Relaxed),
            self.rcvbuf.load(Ordering::Relaxed),
        )
    }

    fn set_socket_buffers(&self, sndbuf: usize, rcvbuf: usize) {
        self.sndbuf.store(sndbuf, Ordering::Relaxed);
        self.rcvbuf.store(rcvbuf, Ordering::Relaxed);
    }
}

/// AMQP publishing driver
///
/// Owns the broker client, the slot pool and the process-wide counters.
/// Cloning is cheap and every clone refers to the same pool.
///
/// # Example
///
/// ```rust,no_run
/// use rabbitmq_driver::testing::MemoryBroker;
/// use rabbitmq_driver::{DriverConfig, DriverSettings, RabbitMqDriver};
///
/// # fn main() -> rabbitmq_driver::DriverResult<()> {
/// let driver = RabbitMqDriver::new(MemoryBroker::new(), DriverSettings::default());
/// let mut slot = driver.allocate(&DriverConfig {
///     exchange: "events".to_string(),
///     routingkey: "check".to_string(),
///     hostname: "mq1,mq2".to_string(),
///     ..DriverConfig::default()
/// })?;
/// slot.submit(b"M\t192.0.2.1\t1700000000\tplain-record")?;
/// println!("{}", driver.status());
/// # Ok(())
/// # }
/// ```
pub struct RabbitMqDriver<C: BrokerClient> {
    shared: Arc<DriverShared<C>>,
}

impl<C: BrokerClient> RabbitMqDriver<C> {
    /// Create a driver with the default slot capacity
    pub fn new(client: C, settings: DriverSettings) -> Self {
        Self::with_capacity(client, settings, crate::MAX_CONCURRENCY)
    }

    /// Create a driver whose pool holds `capacity` slots
    pub fn with_capacity(client: C, settings: DriverSettings, capacity: usize) -> Self {
        Self::init_tracing(&settings);

        info!("Initializing RabbitMQ driver");
        info!("Concurrency: {}", capacity);

        Self {
            shared: Arc::new(DriverShared {
                client,
                pool: SlotPool::with_capacity(capacity),
                stats: StatsCounters::new(),
                sndbuf: AtomicUsize::new(settings.sndbuf),
                rcvbuf: AtomicUsize::new(settings.rcvbuf),
            }),
        }
    }

    /// Update process-wide tunables
    ///
    /// Socket buffer hints apply to connections opened afterwards.
    pub fn configure(&self, settings: &DriverSettings) {
        self.shared
            .set_socket_buffers(settings.sndbuf, settings.rcvbuf);
        debug!(
            "rabbitmq: sndbuf={} rcvbuf={}",
            settings.sndbuf, settings.rcvbuf
        );
    }

    /// Claim a slot and configure it from `config`
    ///
    /// Fails with [`DriverError::Exhausted`](crate::DriverError::Exhausted)
    /// when every slot is owned, or with a configuration error. No connection
    /// is made until the first connect or submit.
    pub fn allocate(&self, config: &DriverConfig) -> DriverResult<DriverSlot<C>> {
        let slot_config = SlotConfig::from_config(config)?;
        let probe = Arc::new(SlotProbe::new(
            slot_config.username.clone(),
            slot_config.vhost.clone(),
            slot_config.exchange.clone(),
            slot_config.endpoints.clone(),
        ));

        let token = self.shared.pool.claim(probe.clone())?;
        self.shared.stats.increment_live_slots();
        debug!(
            "Allocated {} for exchange {} ({} hosts)",
            token,
            slot_config.exchange,
            slot_config.endpoints.len()
        );

        let host_cursor = u64::from(rand::random::<u32>());
        Ok(DriverSlot::new(
            token,
            self.shared.clone(),
            slot_config,
            probe,
            host_cursor,
        ))
    }

    /// Disconnect and release a slot
    pub fn deallocate(&self, slot: DriverSlot<C>) {
        drop(slot);
    }

    /// Read every counter
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Number of slots the pool holds
    pub fn capacity(&self) -> usize {
        self.shared.pool.capacity()
    }

    /// Counters plus a summary of every claimed slot
    pub fn status(&self) -> DriverStatus {
        let slots = self
            .shared
            .pool
            .claims()
            .into_iter()
            .map(|(owner, probe)| SlotSummary {
                owner,
                connection: probe.connected_endpoint().map(|endpoint| ConnectionSummary {
                    username: probe.username.clone(),
                    host: endpoint.host.clone(),
                    port: endpoint.port,
                    vhost: probe.vhost.clone(),
                    exchange: probe.exchange.clone(),
                }),
            })
            .collect();

        DriverStatus {
            capacity: self.capacity(),
            stats: self.stats(),
            slots,
        }
    }

    /// The broker client connections are opened through
    pub fn client(&self) -> &C {
        &self.shared.client
    }

    /// Initialize tracing
    fn init_tracing(settings: &DriverSettings) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(); // Ignore if already initialized
    }
}

impl<C: BrokerClient> Clone for RabbitMqDriver<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: BrokerClient> std::fmt::Debug for RabbitMqDriver<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RabbitMqDriver")
            .field("pool", &self.shared.pool)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl<C: BrokerClient> MqDriver for RabbitMqDriver<C> {
    type Handle = DriverSlot<C>;

    fn allocate(&self, config: &DriverConfig) -> Option<DriverSlot<C>> {
        match RabbitMqDriver::allocate(self, config) {
            Ok(slot) => Some(slot),
            Err(e) => {
                error!("rabbitmq: allocate failed: {}", e);
                None
            }
        }
    }

    fn connect(&self, handle: &mut DriverSlot<C>) -> DriverResult<ConnectOutcome> {
        handle.connect()
    }

    fn submit(&self, handle: &mut DriverSlot<C>, payload: &[u8]) -> DriverResult<()> {
        handle.submit(payload)
    }

    fn disconnect(&self, handle: &mut DriverSlot<C>) -> DisconnectOutcome {
        handle.disconnect()
    }

    fn deallocate(&self, handle: DriverSlot<C>) {
        RabbitMqDriver::deallocate(self, handle)
    }
}
