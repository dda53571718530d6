//! Protocol-level values exchanged with the broker client.
//!
//! These types describe what the driver asks of a [`BrokerClient`](crate::BrokerClient)
//! and what it gets back, without committing to any wire encoding.

mod frame;
mod outbound;

pub use frame::{
    BasicReturn, InboundFrame, Method, MethodFrame, FRAME_BODY, FRAME_HEADER, FRAME_HEARTBEAT,
    FRAME_METHOD,
};
pub use outbound::{LoginParams, Publish, SaslMechanism};

/// Channel every slot publishes on
pub const PUBLISH_CHANNEL: u16 = 1;

/// Maximum frame size offered during login
pub const FRAME_MAX: u32 = 131072;

/// Reply code sent with a polite connection close
pub const REPLY_SUCCESS: u16 = 200;
