//! Requests the driver issues to the broker client

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaslMechanism {
    Plain,
}

/// Connection handshake parameters
#[derive(Clone, PartialEq, Eq)]
pub struct LoginParams<'a> {
    pub vhost: &'a str,
    /// 0 lets the broker choose
    pub channel_max: u16,
    pub frame_max: u32,
    pub heartbeat_secs: u16,
    pub mechanism: SaslMechanism,
    pub username: &'a str,
    pub password: &'a str,
}

// Keep the password out of logs.
impl fmt::Debug for LoginParams<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginParams")
            .field("vhost", &self.vhost)
            .field("channel_max", &self.channel_max)
            .field("frame_max", &self.frame_max)
            .field("heartbeat_secs", &self.heartbeat_secs)
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A basic.publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publish<'a> {
    pub channel: u16,
    pub exchange: &'a str,
    pub routing_key: &'a str,
    pub mandatory: bool,
    pub immediate: bool,
    pub body: &'a [u8],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_params_debug_hides_password() {
        let params = LoginParams {
            vhost: "/",
            channel_max: 0,
            frame_max: 131072,
            heartbeat_secs: 5,
            mechanism: SaslMechanism::Plain,
            username: "guest",
            password: "hunter2",
        };
        let shown = format!("{:?}", params);
        assert!(shown.contains("guest"));
        assert!(!shown.contains("hunter2"));
    }
}
