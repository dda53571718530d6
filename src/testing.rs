//! In-memory broker client for exercising drivers without a broker.
//!
//! [`MemoryBroker`] accepts every connection by default and journals what the
//! driver does with it. Failures and inbound frames are scripted through its
//! methods; clones share the same state, so keep one to inspect the journal
//! after handing the other to a driver.

use crate::message::{InboundFrame, LoginParams, Publish};
use crate::{BrokerClient, BrokerConnection, BrokerError, Endpoint};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Something the driver did against the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    Opened {
        endpoint: Endpoint,
        timeout: Option<Duration>,
    },
    SendBuffer(usize),
    RecvBuffer(usize),
    Login {
        vhost: String,
        username: String,
        frame_max: u32,
        heartbeat_secs: u16,
    },
    ChannelOpened(u16),
    Published(PublishedMessage),
    HeartbeatSent,
    BuffersReleased,
    /// `reply_code` is `None` when the connection was dropped without a close handshake
    Closed {
        endpoint: Endpoint,
        reply_code: Option<u16>,
    },
}

/// Copy of a basic.publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub mandatory: bool,
    pub immediate: bool,
    pub body: Vec<u8>,
}

#[derive(Debug, Default)]
struct BrokerState {
    unreachable: HashSet<String>,
    refuse_login: bool,
    refuse_channel: bool,
    failing_publishes: usize,
    reject_socket_options: bool,
    inbound: VecDeque<InboundFrame>,
    read_error: bool,
    open_connections: usize,
    events: Vec<BrokerEvent>,
}

/// Scripted in-memory [`BrokerClient`]
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse transports to `host`
    pub fn make_unreachable(&self, host: &str) {
        self.state().unreachable.insert(host.to_string());
    }

    /// Accept transports to `host` again
    pub fn make_reachable(&self, host: &str) {
        self.state().unreachable.remove(host);
    }

    /// Reject every login with 403 ACCESS_REFUSED
    pub fn refuse_login(&self, refuse: bool) {
        self.state().refuse_login = refuse;
    }

    /// Reject every channel.open
    pub fn refuse_channel(&self, refuse: bool) {
        self.state().refuse_channel = refuse;
    }

    /// Fail the next `count` publishes
    pub fn fail_next_publishes(&self, count: usize) {
        self.state().failing_publishes = count;
    }

    /// Make SO_SNDBUF / SO_RCVBUF hints fail
    pub fn reject_socket_options(&self, reject: bool) {
        self.state().reject_socket_options = reject;
    }

    /// Queue a frame for the next drain
    pub fn push_inbound(&self, frame: InboundFrame) {
        self.state().inbound.push_back(frame);
    }

    /// Make the next frame read fail
    pub fn fail_next_read(&self) {
        self.state().read_error = true;
    }

    /// Connections currently holding a transport
    pub fn open_connections(&self) -> usize {
        self.state().open_connections
    }

    /// Every event so far, in order
    pub fn events(&self) -> Vec<BrokerEvent> {
        self.state().events.clone()
    }

    /// Every accepted publish, in order
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                BrokerEvent::Published(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    /// Hosts a transport was opened to, in order
    pub fn opened_hosts(&self) -> Vec<String> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                BrokerEvent::Opened { endpoint, .. } => Some(endpoint.host.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of heartbeats the driver sent
    pub fn heartbeats_sent(&self) -> usize {
        self.count(|e| matches!(e, BrokerEvent::HeartbeatSent))
    }

    /// Number of connections released, gracefully or not
    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, BrokerEvent::Closed { .. }))
    }

    fn count(&self, pred: impl Fn(&BrokerEvent) -> bool) -> usize {
        self.state().events.iter().filter(|e| pred(e)).count()
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        lock(&self.state)
    }
}

impl BrokerClient for MemoryBroker {
    type Connection = MemoryConnection;

    fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Option<Duration>,
    ) -> Result<MemoryConnection, BrokerError> {
        let mut state = self.state();
        if state.unreachable.contains(&endpoint.host) {
            return Err(BrokerError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} refused the connection", endpoint),
            )));
        }

        state.open_connections += 1;
        state.events.push(BrokerEvent::Opened {
            endpoint: endpoint.clone(),
            timeout,
        });

        Ok(MemoryConnection {
            state: self.state.clone(),
            endpoint: endpoint.clone(),
            closed: false,
        })
    }
}

/// Connection handed out by [`MemoryBroker`]
#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<Mutex<BrokerState>>,
    endpoint: Endpoint,
    closed: bool,
}

impl MemoryConnection {
    fn state(&self) -> MutexGuard<'_, BrokerState> {
        lock(&self.state)
    }

    fn release(&mut self, reply_code: Option<u16>) {
        if self.closed {
            return;
        }
        self.closed = true;
        let endpoint = self.endpoint.clone();
        let mut state = self.state();
        state.open_connections = state.open_connections.saturating_sub(1);
        state.events.push(BrokerEvent::Closed {
            endpoint,
            reply_code,
        });
    }
}

impl BrokerConnection for MemoryConnection {
    fn set_send_buffer(&mut self, bytes: usize) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.reject_socket_options {
            return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
        }
        state.events.push(BrokerEvent::SendBuffer(bytes));
        Ok(())
    }

    fn set_recv_buffer(&mut self, bytes: usize) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.reject_socket_options {
            return Err(io::Error::from(io::ErrorKind::InvalidInput).into());
        }
        state.events.push(BrokerEvent::RecvBuffer(bytes));
        Ok(())
    }

    fn login(&mut self, params: &LoginParams<'_>) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.refuse_login {
            return Err(BrokerError::rejected(403, "ACCESS_REFUSED"));
        }
        state.events.push(BrokerEvent::Login {
            vhost: params.vhost.to_string(),
            username: params.username.to_string(),
            frame_max: params.frame_max,
            heartbeat_secs: params.heartbeat_secs,
        });
        Ok(())
    }

    fn open_channel(&mut self, channel: u16) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.refuse_channel {
            return Err(BrokerError::rejected(504, "CHANNEL_ERROR"));
        }
        state.events.push(BrokerEvent::ChannelOpened(channel));
        Ok(())
    }

    fn basic_publish(&mut self, publish: &Publish<'_>) -> Result<(), BrokerError> {
        let mut state = self.state();
        if state.failing_publishes > 0 {
            state.failing_publishes -= 1;
            return Err(BrokerError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        state.events.push(BrokerEvent::Published(PublishedMessage {
            exchange: publish.exchange.to_string(),
            routing_key: publish.routing_key.to_string(),
            mandatory: publish.mandatory,
            immediate: publish.immediate,
            body: publish.body.to_vec(),
        }));
        Ok(())
    }

    fn send_heartbeat(&mut self) -> Result<(), BrokerError> {
        self.state().events.push(BrokerEvent::HeartbeatSent);
        Ok(())
    }

    fn poll_readable(&mut self) -> Result<bool, BrokerError> {
        let state = self.state();
        Ok(state.read_error || !state.inbound.is_empty())
    }

    fn read_frame(&mut self) -> Result<Option<InboundFrame>, BrokerError> {
        let mut state = self.state();
        if state.read_error {
            state.read_error = false;
            return Err(BrokerError::Io(io::Error::from(
                io::ErrorKind::ConnectionReset,
            )));
        }
        Ok(state.inbound.pop_front())
    }

    fn release_buffers(&mut self) {
        self.state().events.push(BrokerEvent::BuffersReleased);
    }

    fn close(mut self, reply_code: u16) {
        self.release(Some(reply_code));
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.release(None);
    }
}

fn lock(state: &Mutex<BrokerState>) -> MutexGuard<'_, BrokerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
