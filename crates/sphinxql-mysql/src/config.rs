//! Connection configuration.
//!
//! Timeouts default to one second for connecting and three seconds for
//! each socket write and read. A configuration can be built in code or
//! loaded from JSON, where timeouts are whole seconds:
//!
//! ```
//! use sphinxql_mysql::SphinxConfig;
//!
//! let config = SphinxConfig::from_json(r#"{"read_timeout": 10}"#).unwrap();
//! assert_eq!(config.read_timeout.as_secs(), 10);
//! assert_eq!(config.connect_timeout.as_secs(), 1);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sphinxql_core::{ConfigError, Endpoint, Error, Result};

use crate::protocol::capabilities::DEFAULT_CLIENT_FLAGS;
use crate::protocol::charset;

/// Transport selection hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    /// Follow the endpoint: TCP for `host:port`, unix socket for a path
    #[default]
    Default,
    /// Require a TCP endpoint
    Tcp,
    /// Require a local socket endpoint
    Socket,
}

impl TransportProtocol {
    /// Check that the hint agrees with `endpoint`.
    pub fn check(self, endpoint: &Endpoint) -> Result<()> {
        let mismatch = match self {
            TransportProtocol::Default => false,
            TransportProtocol::Tcp => endpoint.is_socket(),
            TransportProtocol::Socket => !endpoint.is_socket(),
        };
        if mismatch {
            return Err(config_error(format!(
                "Protocol {:?} cannot reach endpoint {}",
                self, endpoint
            )));
        }
        Ok(())
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Connection configuration shared by every connection a batch or pool
/// opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphinxConfig {
    /// Timeout for establishing the connection and the handshake
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
    /// Timeout for each socket write
    #[serde(with = "secs")]
    pub write_timeout: Duration,
    /// Timeout for each socket read
    #[serde(with = "secs")]
    pub read_timeout: Duration,
    /// Transport selection hint
    pub protocol: TransportProtocol,
    /// User name sent in the handshake
    pub user: String,
    /// Password, if the listener checks one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Character set code
    pub charset: u8,
    /// Max packet size announced to the server
    pub max_packet_size: u32,
}

impl Default for SphinxConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
            protocol: TransportProtocol::Default,
            user: String::new(),
            password: None,
            charset: charset::DEFAULT_CHARSET,
            max_packet_size: 16 * 1024 * 1024,
        }
    }
}

impl SphinxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with the three timeouts given in seconds.
    pub fn with_timeouts(connect: u64, write: u64, read: u64) -> Self {
        Self::new()
            .connect_timeout(Duration::from_secs(connect))
            .write_timeout(Duration::from_secs(write))
            .read_timeout(Duration::from_secs(read))
    }

    /// Parse a JSON configuration; missing keys keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            Error::Config(ConfigError {
                message: format!("Invalid configuration: {}", e),
                source: Some(Box::new(e)),
            })
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn protocol(mut self, protocol: TransportProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    pub fn max_packet_size(mut self, size: u32) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Reject zero timeouts, which sockets cannot apply.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("connect_timeout", self.connect_timeout),
            ("write_timeout", self.write_timeout),
            ("read_timeout", self.read_timeout),
        ] {
            if value.is_zero() {
                return Err(config_error(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }

    /// Capability flags requested in the handshake response.
    pub fn capability_flags(&self) -> u32 {
        DEFAULT_CLIENT_FLAGS
    }
}

fn config_error(message: String) -> Error {
    Error::Config(ConfigError {
        message,
        source: None,
    })
}
