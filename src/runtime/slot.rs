//! Per-worker slot state

use crate::config::SlotConfig;
use crate::pool::{OwnerToken, SlotProbe};
use crate::routing::RoutingKeyDeriver;
use crate::runtime::DriverShared;
use crate::{BrokerClient, Endpoint};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// One worker's claim on the driver: configuration plus at most one live
/// broker connection
///
/// Created by [`RabbitMqDriver::allocate`](crate::RabbitMqDriver::allocate).
/// Dropping the slot closes its connection and returns it to the pool.
pub struct DriverSlot<C: BrokerClient> {
    pub(crate) token: OwnerToken,
    pub(crate) shared: Arc<DriverShared<C>>,
    pub(crate) config: SlotConfig,
    pub(crate) routing: RoutingKeyDeriver,
    /// Present iff login and channel open succeeded on an open transport
    pub(crate) connection: Option<C::Connection>,
    /// Advances on every connect attempt, used modulo the host count
    pub(crate) host_cursor: u64,
    pub(crate) host_index: usize,
    pub(crate) last_heartbeat: Instant,
    /// Set by the inbound drain, cleared on connect
    pub(crate) error_flag: bool,
    pub(crate) last_signal: Option<String>,
    pub(crate) probe: Arc<SlotProbe>,
}

impl<C: BrokerClient> DriverSlot<C> {
    pub(crate) fn new(
        token: OwnerToken,
        shared: Arc<DriverShared<C>>,
        config: SlotConfig,
        probe: Arc<SlotProbe>,
        host_cursor: u64,
    ) -> Self {
        let routing = RoutingKeyDeriver::new(config.routing_key.clone());
        Self {
            token,
            shared,
            config,
            routing,
            connection: None,
            host_cursor,
            host_index: 0,
            last_heartbeat: Instant::now(),
            error_flag: false,
            last_signal: None,
            probe,
        }
    }

    /// Start host rotation at `cursor` instead of the random default
    ///
    /// Only meaningful before the first connect attempt.
    pub fn starting_at_host(mut self, cursor: u64) -> Self {
        self.host_cursor = cursor;
        self
    }

    /// Token identifying this slot's claim
    pub fn owner(&self) -> OwnerToken {
        self.token
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Number of connect attempts made so far, offset by the starting cursor
    pub fn host_cursor(&self) -> u64 {
        self.host_cursor
    }

    /// Endpoint of the live connection
    pub fn current_endpoint(&self) -> Option<&Endpoint> {
        self.connection
            .as_ref()
            .and_then(|_| self.config.endpoints.get(self.host_index))
    }

    /// Hosts in rotation order
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.config.endpoints
    }

    pub fn exchange(&self) -> &str {
        &self.config.exchange
    }

    /// Heartbeat interval negotiated at login, in seconds
    pub fn heartbeat_secs(&self) -> u16 {
        self.config.heartbeat_secs
    }

    /// Routing key a submission of `payload` would be published with
    pub fn routing_key_for(&self, payload: &[u8]) -> String {
        self.routing.derive(payload).into_owned()
    }
}

impl<C: BrokerClient> Drop for DriverSlot<C> {
    fn drop(&mut self) {
        self.disconnect();
        if self.shared.pool.release(self.token) {
            self.shared.stats.decrement_live_slots();
            debug!("Released {}", self.token);
        }
    }
}

impl<C: BrokerClient> fmt::Debug for DriverSlot<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverSlot")
            .field("owner", &self.token)
            .field("connected", &self.is_connected())
            .field("host_cursor", &self.host_cursor)
            .field("exchange", &self.config.exchange)
            .field("routing_key", &self.routing.base())
            .finish_non_exhaustive()
    }
}
