//! Error types for driver operations.

use thiserror::Error;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Failure reported by a [`BrokerClient`](crate::BrokerClient) primitive.
///
/// Client implementations map their own errors into this type so the driver can
/// log and classify them without knowing the wire encoding.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Socket-level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The broker answered an RPC with a non-success reply
    #[error("broker replied {reply_code}: {reply_text}")]
    Rejected { reply_code: u16, reply_text: String },

    /// The peer violated the protocol or sent something the client cannot decode
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The connection is already closed
    #[error("connection closed")]
    Closed,
}

impl BrokerError {
    /// Create a protocol error from a message
    pub fn protocol(message: impl Into<String>) -> Self {
        BrokerError::Protocol(message.into())
    }

    /// Create a rejection with the broker's reply code and text
    pub fn rejected(reply_code: u16, reply_text: impl Into<String>) -> Self {
        BrokerError::Rejected {
            reply_code,
            reply_text: reply_text.into(),
        }
    }
}

/// Error types for driver operations
///
/// Every variant except [`DriverError::Exhausted`] and
/// [`DriverError::Configuration`] leaves the slot disconnected; the next
/// submission starts over with a fresh connect.
#[derive(Error, Debug)]
pub enum DriverError {
    /// The transport to a broker node could not be opened
    #[error("Transport failure for {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: BrokerError,
    },

    /// SASL login was refused or the broker replied abnormally
    #[error("Login failed for {endpoint}: {source}")]
    Login {
        endpoint: String,
        #[source]
        source: BrokerError,
    },

    /// The logical channel could not be opened
    #[error("Channel {channel} open failed: {source}")]
    Channel {
        channel: u16,
        #[source]
        source: BrokerError,
    },

    /// The broker sent a method frame on an established connection
    ///
    /// The record that triggered the drain was already handed to the broker.
    #[error("Broker signalled {0}")]
    ProtocolSignal(String),

    /// The client refused the basic-publish call
    #[error("Publish failed: {0}")]
    Publish(#[source] BrokerError),

    /// Every slot in the pool is owned
    #[error("Slot pool exhausted ({capacity} slots in use)")]
    Exhausted { capacity: usize },

    /// Configuration error - detected at allocation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The worker owning the slot has stopped
    #[error("Worker stopped: {0}")]
    WorkerStopped(String),

    /// Serialization of a status report failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DriverError {
    /// Check if this error tore down (or prevented) a broker connection
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            DriverError::Transport { .. }
                | DriverError::Login { .. }
                | DriverError::Channel { .. }
                | DriverError::ProtocolSignal(_)
                | DriverError::Publish(_)
        )
    }

    /// Check if the pool had no free slot
    pub fn is_exhausted(&self) -> bool {
        matches!(self, DriverError::Exhausted { .. })
    }

    /// Check if this is a configuration problem
    pub fn is_configuration(&self) -> bool {
        matches!(self, DriverError::Configuration(_))
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        DriverError::Configuration(message.into())
    }

    /// Create a protocol-signal error from a method description
    pub fn protocol_signal(detail: impl Into<String>) -> Self {
        DriverError::ProtocolSignal(detail.into())
    }
}

impl From<serde_json::Error> for DriverError {
    fn from(err: serde_json::Error) -> Self {
        DriverError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for DriverError {
    fn from(err: toml::de::Error) -> Self {
        DriverError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let transport = DriverError::Transport {
            endpoint: "127.0.0.1:5672".to_string(),
            source: BrokerError::Closed,
        };
        assert!(transport.is_connection_failure());
        assert!(!transport.is_exhausted());

        let exhausted = DriverError::Exhausted { capacity: 16 };
        assert!(exhausted.is_exhausted());
        assert!(!exhausted.is_connection_failure());

        let config = DriverError::config("bad port");
        assert!(config.is_configuration());
        assert!(!config.is_connection_failure());

        assert!(DriverError::protocol_signal("connection.close").is_connection_failure());
    }

    #[test]
    fn test_error_display() {
        let err = DriverError::Login {
            endpoint: "mq1:5672".to_string(),
            source: BrokerError::rejected(403, "ACCESS_REFUSED"),
        };
        assert_eq!(
            err.to_string(),
            "Login failed for mq1:5672: broker replied 403: ACCESS_REFUSED"
        );

        let err = DriverError::Exhausted { capacity: 16 };
        assert_eq!(err.to_string(), "Slot pool exhausted (16 slots in use)");
    }
}
