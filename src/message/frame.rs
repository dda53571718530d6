//! Inbound frames observed while draining a connection

use std::fmt;

pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;

/// A frame (or client-side event) read from an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Peer keep-alive
    Heartbeat,
    /// Method frame; on a publish-only connection any method is unexpected
    Method(MethodFrame),
    /// A mandatory message came back unroutable (basic.return)
    ///
    /// Clients deliver this from their return hook rather than as a raw
    /// method frame, so it is accounted separately.
    Returned(BasicReturn),
    /// Content header, content body or anything else the driver does not act on
    Other { frame_type: u8, channel: u16 },
}

impl InboundFrame {
    /// AMQP frame type octet
    pub fn frame_type(&self) -> u8 {
        match self {
            InboundFrame::Heartbeat => FRAME_HEARTBEAT,
            InboundFrame::Method(_) | InboundFrame::Returned(_) => FRAME_METHOD,
            InboundFrame::Other { frame_type, .. } => *frame_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFrame {
    pub channel: u16,
    pub method: Method,
}

impl MethodFrame {
    pub fn new(channel: u16, method: Method) -> Self {
        Self { channel, method }
    }
}

/// Decoded method payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    ChannelClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    ConnectionClose {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },
    Other {
        class_id: u16,
        method_id: u16,
    },
}

impl Method {
    /// Channel close carrying only a reply
    pub fn channel_close(reply_code: u16, reply_text: impl Into<String>) -> Self {
        Method::ChannelClose {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// Connection close carrying only a reply
    pub fn connection_close(reply_code: u16, reply_text: impl Into<String>) -> Self {
        Method::ConnectionClose {
            reply_code,
            reply_text: reply_text.into(),
            class_id: 0,
            method_id: 0,
        }
    }

    /// Dotted AMQP method name, e.g. `channel.close`
    pub fn name(&self) -> String {
        match self {
            Method::ChannelClose { .. } => "channel.close".to_string(),
            Method::ConnectionClose { .. } => "connection.close".to_string(),
            Method::Other {
                class_id,
                method_id,
            } => method_name(*class_id, *method_id),
        }
    }

    /// Reply code and text for close methods
    pub fn close_reply(&self) -> Option<(u16, &str)> {
        match self {
            Method::ChannelClose {
                reply_code,
                reply_text,
                ..
            }
            | Method::ConnectionClose {
                reply_code,
                reply_text,
                ..
            } => Some((*reply_code, reply_text.as_str())),
            Method::Other { .. } => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.close_reply() {
            Some((code, text)) => write!(f, "{} {}: {}", self.name(), code, text),
            None => f.write_str(&self.name()),
        }
    }
}

fn method_name(class_id: u16, method_id: u16) -> String {
    let known = match (class_id, method_id) {
        (10, 10) => "connection.start",
        (10, 30) => "connection.tune",
        (10, 41) => "connection.open-ok",
        (10, 51) => "connection.close-ok",
        (10, 60) => "connection.blocked",
        (10, 61) => "connection.unblocked",
        (20, 11) => "channel.open-ok",
        (20, 20) => "channel.flow",
        (20, 41) => "channel.close-ok",
        (60, 50) => "basic.return",
        (60, 60) => "basic.deliver",
        (60, 80) => "basic.ack",
        (60, 120) => "basic.nack",
        _ => return format!("method {}.{}", class_id, method_id),
    };
    known.to_string()
}

/// Unroutable message handed back by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicReturn {
    pub channel: u16,
    pub reply_code: u16,
    pub reply_text: String,
    pub exchange: String,
    pub routing_key: String,
}
