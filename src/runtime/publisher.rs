//! Publishing plus the inline heartbeat and inbound drain

use crate::message::{InboundFrame, Method, Publish, PUBLISH_CHANNEL};
use crate::runtime::DriverSlot;
use crate::{BrokerClient, BrokerConnection, DriverError, DriverResult};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

impl<C: BrokerClient> DriverSlot<C> {
    /// Publish one record to the slot's exchange
    ///
    /// Connects first when the slot has no connection. After a successful
    /// publish the heartbeat is serviced and every pending inbound frame is
    /// drained without blocking. If the drain saw a method frame the record
    /// still counts as published, but the connection is torn down and the
    /// call fails.
    pub fn submit(&mut self, payload: &[u8]) -> DriverResult<()> {
        self.connect()?;

        let published = {
            let Some(conn) = self.connection.as_mut() else {
                return Err(DriverError::protocol_signal("connection lost before publish"));
            };
            let routing_key = self.routing.derive(payload);
            conn.basic_publish(&Publish {
                channel: PUBLISH_CHANNEL,
                exchange: &self.config.exchange,
                routing_key: &routing_key,
                mandatory: true,
                immediate: false,
                body: payload,
            })
        };
        if let Err(e) = published {
            error!("AMQP publish failed, disconnecting: {}", e);
            self.teardown();
            return Err(DriverError::Publish(e));
        }
        self.shared.stats.record_publication();

        self.heartbeat();
        self.drain_inbound();

        if let Some(conn) = self.connection.as_mut() {
            conn.release_buffers();
        }

        if self.error_flag {
            let signal = self
                .last_signal
                .take()
                .unwrap_or_else(|| "an unexpected frame".to_string());
            self.teardown();
            return Err(DriverError::protocol_signal(signal));
        }
        Ok(())
    }

    /// Send a heartbeat if the interval has elapsed since the last one
    fn heartbeat(&mut self) {
        let interval = Duration::from_secs(u64::from(self.config.heartbeat_secs));
        if self.last_heartbeat.elapsed() < interval {
            return;
        }
        let Some(conn) = self.connection.as_mut() else {
            return;
        };
        match conn.send_heartbeat() {
            Ok(()) => debug!("AMQP heartbeat sent"),
            Err(e) => {
                error!("AMQP heartbeat failed: {}", e);
                self.flag_error(format!("heartbeat failure: {}", e));
            }
        }
        self.last_heartbeat = Instant::now();
    }

    /// Read every frame that is available right now
    fn drain_inbound(&mut self) {
        loop {
            let Some(conn) = self.connection.as_mut() else {
                return;
            };
            let frame = match conn.poll_readable() {
                Ok(false) => return,
                Ok(true) => conn.read_frame(),
                Err(e) => Err(e),
            };

            match frame {
                Ok(Some(frame)) => self.handle_inbound(frame),
                Ok(None) => return,
                Err(e) => {
                    error!("AMQP read failed: {}", e);
                    self.flag_error(format!("read failure: {}", e));
                    return;
                }
            }
        }
    }

    fn handle_inbound(&mut self, frame: InboundFrame) {
        let stats = &self.shared.stats;
        match frame {
            InboundFrame::Heartbeat => {
                stats.record_inbound_heartbeat();
                debug!("AMQP heartbeat received");
            }
            InboundFrame::Method(frame) => {
                stats.record_inbound_method();
                match &frame.method {
                    Method::ChannelClose { .. } | Method::ConnectionClose { .. } => {
                        error!("AMQP {} on channel {}", frame.method, frame.channel);
                    }
                    Method::Other { .. } => {
                        info!("AMQP method {} on channel {}", frame.method, frame.channel);
                    }
                }
                self.flag_error(frame.method.to_string());
            }
            InboundFrame::Returned(ret) => {
                stats.record_basic_return();
                debug!(
                    "AMQP basic.return {}: {} (exchange: {}, routing key: {})",
                    ret.reply_code, ret.reply_text, ret.exchange, ret.routing_key
                );
            }
            InboundFrame::Other {
                frame_type,
                channel,
            } => {
                debug!("AMQP frame type {} on channel {}", frame_type, channel);
            }
        }
    }

    fn flag_error(&mut self, signal: String) {
        self.error_flag = true;
        self.last_signal.get_or_insert(signal);
    }
}

#[cfg(test)]
mod tests {
    use crate::message::{BasicReturn, InboundFrame, Method, MethodFrame, FRAME_BODY};
    use crate::testing::{BrokerEvent, MemoryBroker};
    use crate::{DriverConfig, DriverError, DriverSettings, RabbitMqDriver};

    const UUID: &str = "550e8400-e29b-41d4-a716-446655440000";

    fn driver(broker: &MemoryBroker) -> RabbitMqDriver<MemoryBroker> {
        RabbitMqDriver::new(broker.clone(), DriverSettings::default())
    }

    fn config(heartbeat_ms: u64) -> DriverConfig {
        DriverConfig {
            exchange: "events".to_string(),
            routingkey: "events".to_string(),
            username: "guest".to_string(),
            password: "guest".to_string(),
            heartbeat: heartbeat_ms,
            hostname: "mq1,mq2".to_string(),
            ..DriverConfig::default()
        }
    }

    fn record() -> Vec<u8> {
        format!("M192.0.2.1\t1700000000\t`c_42_7`{}\tsome.metric", UUID).into_bytes()
    }

    #[test]
    fn test_submit_connects_and_publishes() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap();

        slot.submit(&record()).unwrap();
        assert!(slot.is_connected());

        let published = broker.published();
        assert_eq!(published.len(), 1);
        let msg = &published[0];
        assert_eq!(msg.exchange, "events");
        assert!(msg.routing_key.starts_with("events.a.2.42.7.5.5.0.e"));
        assert!(msg.mandatory);
        assert!(!msg.immediate);
        assert_eq!(msg.body, record());

        let stats = driver.stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.publications, 1);
        assert!(broker.events().contains(&BrokerEvent::BuffersReleased));
    }

    #[test]
    fn test_connection_close_in_drain_tears_down() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap().starting_at_host(0);

        slot.connect().unwrap();
        broker.push_inbound(InboundFrame::Method(MethodFrame::new(
            0,
            Method::connection_close(320, "CONNECTION_FORCED"),
        )));

        let err = slot.submit(b"plain record").unwrap_err();
        assert!(matches!(err, DriverError::ProtocolSignal(_)));
        assert!(err.to_string().contains("connection.close 320"));
        assert!(!slot.is_connected());
        assert_eq!(broker.open_connections(), 0);

        let stats = driver.stats();
        assert_eq!(stats.publications, 1);
        assert_eq!(stats.inbound_methods, 1);

        // Next submission reconnects to the next host before publishing
        slot.submit(b"plain record").unwrap();
        assert_eq!(broker.opened_hosts(), vec!["mq1", "mq2"]);
        let events = broker.events();
        let reopened = events
            .iter()
            .rposition(|e| matches!(e, BrokerEvent::ChannelOpened(_)))
            .unwrap();
        let published = events
            .iter()
            .rposition(|e| matches!(e, BrokerEvent::Published(_)))
            .unwrap();
        assert!(reopened < published);
        assert_eq!(driver.stats().publications, 2);
    }

    #[test]
    fn test_channel_close_fails_the_call() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap();

        slot.connect().unwrap();
        broker.push_inbound(InboundFrame::Method(MethodFrame::new(
            1,
            Method::channel_close(404, "NOT_FOUND - no exchange 'events'"),
        )));

        let err = slot.submit(b"plain record").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Broker signalled channel.close 404: NOT_FOUND - no exchange 'events'"
        );
        assert!(!slot.is_connected());
    }

    #[test]
    fn test_any_method_frame_fails_the_call() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap();

        slot.connect().unwrap();
        broker.push_inbound(InboundFrame::Method(MethodFrame::new(
            0,
            Method::Other {
                class_id: 10,
                method_id: 60,
            },
        )));

        let err = slot.submit(b"plain record").unwrap_err();
        assert!(matches!(err, DriverError::ProtocolSignal(ref m) if m == "connection.blocked"));
        assert!(!slot.is_connected());
        assert_eq!(broker.open_connections(), 0);

        let stats = driver.stats();
        assert_eq!(stats.inbound_methods, 1);
        assert_eq!(stats.publications, 1);
    }

    #[test]
    fn test_heartbeat_sent_when_interval_elapsed() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(0)).unwrap();

        slot.submit(b"one").unwrap();
        slot.submit(b"two").unwrap();
        assert_eq!(broker.heartbeats_sent(), 2);
    }

    #[test]
    fn test_heartbeat_not_sent_before_interval() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(60_000)).unwrap();

        slot.submit(b"one").unwrap();
        assert_eq!(broker.heartbeats_sent(), 0);
    }

    #[test]
    fn test_inbound_heartbeats_and_returns_are_counted() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap();

        slot.connect().unwrap();
        broker.push_inbound(InboundFrame::Heartbeat);
        broker.push_inbound(InboundFrame::Returned(BasicReturn {
            channel: 1,
            reply_code: 312,
            reply_text: "NO_ROUTE".to_string(),
            exchange: "events".to_string(),
            routing_key: "events".to_string(),
        }));
        broker.push_inbound(InboundFrame::Other {
            frame_type: FRAME_BODY,
            channel: 1,
        });

        slot.submit(b"plain record").unwrap();
        assert!(slot.is_connected());

        let stats = driver.stats();
        assert_eq!(stats.inbound_heartbeats, 1);
        assert_eq!(stats.basic_returns, 1);
        assert_eq!(stats.inbound_methods, 0);
    }

    #[test]
    fn test_read_failure_tears_down() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap();

        slot.connect().unwrap();
        broker.fail_next_read();

        let err = slot.submit(b"plain record").unwrap_err();
        assert!(err.is_connection_failure());
        assert!(!slot.is_connected());
        assert_eq!(driver.stats().publications, 1);
    }

    #[test]
    fn test_publish_failure_tears_down() {
        let broker = MemoryBroker::new();
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap();

        broker.fail_next_publishes(1);
        let err = slot.submit(b"plain record").unwrap_err();
        assert!(matches!(err, DriverError::Publish(_)));
        assert!(!slot.is_connected());
        assert_eq!(driver.stats().publications, 0);
        assert_eq!(broker.open_connections(), 0);

        slot.submit(b"plain record").unwrap();
        assert_eq!(driver.stats().publications, 1);
    }

    #[test]
    fn test_submit_fails_when_no_host_reachable() {
        let broker = MemoryBroker::new();
        broker.make_unreachable("mq1");
        broker.make_unreachable("mq2");
        let driver = driver(&broker);
        let mut slot = driver.allocate(&config(5000)).unwrap();

        let err = slot.submit(b"plain record").unwrap_err();
        assert!(matches!(err, DriverError::Transport { .. }));
        assert!(broker.published().is_empty());
    }
}
