//! Driver status report.

use crate::pool::OwnerToken;
use crate::{DriverResult, StatsSnapshot};
use serde::Serialize;
use std::fmt;

/// Snapshot of a driver for status reporters
///
/// `Display` renders the console layout; `to_json` serves machine readers.
#[derive(Debug, Clone, Serialize)]
pub struct DriverStatus {
    /// Slots the pool can hold
    pub capacity: usize,
    pub stats: StatsSnapshot,
    /// Claimed slots, in registry order
    pub slots: Vec<SlotSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub owner: OwnerToken,
    /// `None` while the slot is disconnected
    pub connection: Option<ConnectionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSummary {
    pub username: String,
    pub host: String,
    pub port: u16,
    pub vhost: String,
    pub exchange: String,
}

impl DriverStatus {
    /// Render as JSON
    pub fn to_json(&self) -> DriverResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.stats;
        writeln!(f, " == RabbitMQ ==")?;
        writeln!(f, " Concurrency:           {}", s.live_slots)?;
        writeln!(f, " Connects:              {}", s.connects)?;
        writeln!(f, " AMQP basic returns:    {}", s.basic_returns)?;
        writeln!(f, " AMQP methods (in):     {}", s.inbound_methods)?;
        writeln!(f, " AMQP heartbeats (in):  {}", s.inbound_heartbeats)?;
        writeln!(f, " AMQP basic publish:    {}", s.publications)?;
        for slot in &self.slots {
            writeln!(f, "   == connection: {} ==", slot.owner)?;
            match &slot.connection {
                Some(c) => writeln!(
                    f,
                    "     {}@{}:{} (vhost: {}, exchange: {})",
                    c.username, c.host, c.port, c.vhost, c.exchange
                )?,
                None => writeln!(f, "     not connected")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::MemoryBroker;
    use crate::{DriverConfig, DriverSettings, RabbitMqDriver};

    #[test]
    fn test_console_layout() {
        let driver = RabbitMqDriver::new(MemoryBroker::new(), DriverSettings::default());
        let config = DriverConfig {
            exchange: "events".to_string(),
            username: "noit".to_string(),
            vhost: "/noit".to_string(),
            hostname: "mq1".to_string(),
            ..DriverConfig::default()
        };
        let mut connected = driver.allocate(&config).unwrap();
        let idle = driver.allocate(&config).unwrap();
        connected.submit(b"plain record").unwrap();

        let text = driver.status().to_string();
        let expected = format!(
            " == RabbitMQ ==\n \
             Concurrency:           2\n \
             Connects:              1\n \
             AMQP basic returns:    0\n \
             AMQP methods (in):     0\n \
             AMQP heartbeats (in):  0\n \
             AMQP basic publish:    1\n   \
             == connection: {} ==\n     \
             noit@mq1:5672 (vhost: /noit, exchange: events)\n   \
             == connection: {} ==\n     \
             not connected\n",
            connected.owner(),
            idle.owner()
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_json_report() {
        let driver = RabbitMqDriver::new(MemoryBroker::new(), DriverSettings::default());
        let _slot = driver
            .allocate(&DriverConfig {
                hostname: "mq1".to_string(),
                ..DriverConfig::default()
            })
            .unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&driver.status().to_json().unwrap()).unwrap();
        assert_eq!(json["capacity"], 16);
        assert_eq!(json["stats"]["live_slots"], 1);
        assert_eq!(json["slots"][0]["owner"]["index"], 0);
        assert!(json["slots"][0]["connection"].is_null());
    }
}
