//! Connection lifecycle for a slot: host selection, handshake, teardown

use crate::message::{LoginParams, SaslMechanism, FRAME_MAX, PUBLISH_CHANNEL, REPLY_SUCCESS};
use crate::runtime::DriverSlot;
use crate::{
    BrokerClient, BrokerConnection, ConnectOutcome, DisconnectOutcome, DriverError, DriverResult,
};
use std::time::Instant;
use tracing::{debug, error, info};

impl<C: BrokerClient> DriverSlot<C> {
    /// Connect to the next host in rotation unless already connected
    ///
    /// Every attempt advances the host cursor, whether it succeeds or not, so
    /// a dead host is retried once per full rotation. Socket buffer hints that
    /// cannot be applied are logged and ignored; any other failure leaves the
    /// slot disconnected.
    pub fn connect(&mut self) -> DriverResult<ConnectOutcome> {
        if self.connection.is_some() {
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let hosts = self.config.endpoints.len() as u64;
        if hosts == 0 {
            return Err(DriverError::config("slot has no hosts"));
        }
        let index = (self.host_cursor % hosts) as usize;
        self.host_cursor = self.host_cursor.wrapping_add(1);
        self.host_index = index;

        let endpoint = self.config.endpoints[index].clone();
        info!("AMQP connect: {}", endpoint);
        self.shared.stats.record_connect();

        let mut conn = self
            .shared
            .client
            .open(&endpoint, self.config.connect_timeout())
            .map_err(|source| {
                error!("AMQP connect failed: {}: {}", endpoint, source);
                DriverError::Transport {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;

        let (sndbuf, rcvbuf) = self.shared.socket_buffers();
        if let Err(e) = conn.set_send_buffer(sndbuf) {
            debug!("rabbitmq: SO_SNDBUF {} -> {}", sndbuf, e);
        }
        if let Err(e) = conn.set_recv_buffer(rcvbuf) {
            debug!("rabbitmq: SO_RCVBUF {} -> {}", rcvbuf, e);
        }

        self.error_flag = false;
        self.last_signal = None;

        let params = LoginParams {
            vhost: &self.config.vhost,
            channel_max: 0,
            frame_max: FRAME_MAX,
            heartbeat_secs: self.config.heartbeat_secs,
            mechanism: SaslMechanism::Plain,
            username: &self.config.username,
            password: &self.config.password,
        };
        if let Err(source) = conn.login(&params) {
            error!("AMQP login failed on {}: {}", endpoint, source);
            conn.close(REPLY_SUCCESS);
            return Err(DriverError::Login {
                endpoint: endpoint.to_string(),
                source,
            });
        }

        if let Err(source) = conn.open_channel(PUBLISH_CHANNEL) {
            error!("AMQP channel.open failed on {}: {}", endpoint, source);
            conn.close(REPLY_SUCCESS);
            return Err(DriverError::Channel {
                channel: PUBLISH_CHANNEL,
                source,
            });
        }

        self.last_heartbeat = Instant::now();
        self.connection = Some(conn);
        self.probe.set_connected(index);
        info!("AMQP connected: {} (vhost: {})", endpoint, self.config.vhost);

        Ok(ConnectOutcome::Connected)
    }

    /// Drop the connection without a close handshake
    ///
    /// Safe to call repeatedly; reports whether anything was closed.
    pub fn disconnect(&mut self) -> DisconnectOutcome {
        match self.connection.take() {
            Some(conn) => {
                drop(conn);
                self.probe.set_disconnected();
                debug!("AMQP disconnected {}", self.token);
                DisconnectOutcome::Closed
            }
            None => DisconnectOutcome::NotConnected,
        }
    }

    /// Close the connection politely after a failure
    pub(crate) fn teardown(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close(REPLY_SUCCESS);
        }
        self.probe.set_disconnected();
    }
}
