//! Trait definitions at the driver's two seams.
//!
//! - `BrokerClient` / `BrokerConnection`: the broker-client library the driver
//!   sits on (socket, login, channel, frames, publish)
//! - `MqDriver`: the contract the host pipeline dispatches records through

use crate::message::{InboundFrame, LoginParams, Publish};
use crate::{BrokerError, DriverConfig, Endpoint};
use std::time::Duration;

/// Factory for connections to single broker nodes
///
/// Implement this over the AMQP client library of your choice. The driver only
/// relies on the contract documented on each method, never on wire encoding.
///
/// # Example
///
/// ```rust,no_run
/// use rabbitmq_driver::{BrokerClient, BrokerError, Endpoint};
/// use rabbitmq_driver::testing::MemoryConnection;
/// use std::time::Duration;
///
/// struct Refusing;
///
/// impl BrokerClient for Refusing {
///     type Connection = MemoryConnection;
///
///     fn open(
///         &self,
///         endpoint: &Endpoint,
///         _timeout: Option<Duration>,
///     ) -> Result<MemoryConnection, BrokerError> {
///         Err(BrokerError::protocol(format!("{} is not reachable", endpoint)))
///     }
/// }
/// ```
pub trait BrokerClient: Send + Sync + 'static {
    type Connection: BrokerConnection + 'static;

    /// Open the transport to `endpoint`
    ///
    /// Blocks for at most `timeout` when one is given. No protocol handshake
    /// happens yet; the returned connection owns the socket.
    fn open(
        &self,
        endpoint: &Endpoint,
        timeout: Option<Duration>,
    ) -> Result<Self::Connection, BrokerError>;
}

/// One open transport plus the protocol state layered on it
///
/// Dropping a connection must release the socket without any handshake.
pub trait BrokerConnection: Send {
    /// Socket send buffer hint (SO_SNDBUF)
    fn set_send_buffer(&mut self, bytes: usize) -> Result<(), BrokerError>;

    /// Socket receive buffer hint (SO_RCVBUF)
    fn set_recv_buffer(&mut self, bytes: usize) -> Result<(), BrokerError>;

    /// Protocol header, SASL login, tune and connection.open
    fn login(&mut self, params: &LoginParams<'_>) -> Result<(), BrokerError>;

    /// channel.open / channel.open-ok
    fn open_channel(&mut self, channel: u16) -> Result<(), BrokerError>;

    /// Write a basic.publish with its content frames
    fn basic_publish(&mut self, publish: &Publish<'_>) -> Result<(), BrokerError>;

    /// Write a heartbeat frame on channel 0
    fn send_heartbeat(&mut self) -> Result<(), BrokerError>;

    /// Whether a frame can be read without blocking (zero-timeout poll)
    fn poll_readable(&mut self) -> Result<bool, BrokerError>;

    /// Read the next frame; `None` when nothing is pending
    fn read_frame(&mut self) -> Result<Option<InboundFrame>, BrokerError>;

    /// Give back client-side buffer memory between publishes
    fn release_buffers(&mut self) {}

    /// Polite connection.close with `reply_code`, then release the socket
    fn close(self, reply_code: u16)
    where
        Self: Sized;
}

/// Contract between the host pipeline and an output driver
///
/// The pipeline allocates one handle per worker thread and drives it
/// sequentially. The integer codes the pipeline expects are available through
/// the `as_code` helpers on each outcome.
pub trait MqDriver: Send + Sync {
    type Handle: Send;

    /// Claim and configure a handle; `None` when no slot is free or the
    /// configuration is unusable
    fn allocate(&self, config: &DriverConfig) -> Option<Self::Handle>;

    /// Establish the broker connection if needed
    fn connect(&self, handle: &mut Self::Handle) -> crate::DriverResult<ConnectOutcome>;

    /// Publish one record
    fn submit(&self, handle: &mut Self::Handle, payload: &[u8]) -> crate::DriverResult<()>;

    /// Drop the broker connection; reports whether there was one
    fn disconnect(&self, handle: &mut Self::Handle) -> DisconnectOutcome;

    /// Release the handle and its slot
    fn deallocate(&self, handle: Self::Handle);

    /// Record-level filtering hook; drivers may ignore it
    fn set_filters(&self, handle: &mut Self::Handle, filters: &[String]) {
        let _ = (handle, filters);
    }
}

/// Result of a successful connect call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new connection was established
    Connected,
    /// The slot already had a live connection
    AlreadyConnected,
}

impl ConnectOutcome {
    /// Pipeline code: 0 connected now, 1 already connected, -1 failure
    pub fn as_code(result: &crate::DriverResult<Self>) -> i32 {
        match result {
            Ok(ConnectOutcome::Connected) => 0,
            Ok(ConnectOutcome::AlreadyConnected) => 1,
            Err(_) => -1,
        }
    }
}

/// Result of a disconnect call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A live connection was closed
    Closed,
    /// There was nothing to close
    NotConnected,
}

impl DisconnectOutcome {
    /// Pipeline code: 0 had a connection, -1 none
    pub fn as_code(&self) -> i32 {
        match self {
            DisconnectOutcome::Closed => 0,
            DisconnectOutcome::NotConnected => -1,
        }
    }
}

/// Pipeline code for a submit result: 0 ok, -1 failure
pub fn submit_code(result: &crate::DriverResult<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}
