//! Pool configuration.

use std::time::Duration;

use crate::error::PoolError;

/// Delay between failed connect attempts for the same member.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Configuration for a connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Remote endpoint as `host:port`.
    pub address: String,

    /// Number of connections the pool maintains.
    pub capacity: u32,

    /// Read timeout applied to connections once connected (zero disables it).
    pub read_timeout: Duration,

    /// Timeout for each individual connect attempt.
    pub connect_timeout: Duration,

    /// Backoff before retrying a failed connect attempt.
    pub reconnect_delay: Duration,

    /// Whether TCP keep-alive is enabled on pooled sockets.
    pub keep_alive: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address: "localhost:9999".to_string(),
            capacity: 1,
            read_timeout: Duration::ZERO,
            connect_timeout: Duration::from_secs(2),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            keep_alive: true,
        }
    }
}

impl PoolConfig {
    /// Create a configuration for `address` with default values.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Parse a connection string into configuration.
    ///
    /// ```text
    /// Address=10.0.0.5:9998;Capacity=4;Read Timeout=5;Connect Timeout=1;
    /// ```
    ///
    /// Timeouts and delays are whole seconds.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, PoolError> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part.split_once('=').ok_or_else(|| {
                PoolError::InvalidConfiguration(format!("invalid key-value: {part}"))
            })?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "address" | "server" | "host" => {
                    config.address = value.to_string();
                }
                "capacity" | "pool size" | "size" => {
                    config.capacity = value.parse().map_err(|_| {
                        PoolError::InvalidConfiguration(format!("invalid capacity: {value}"))
                    })?;
                }
                "read timeout" => {
                    config.read_timeout = parse_secs(value)?;
                }
                "connect timeout" | "connection timeout" => {
                    config.connect_timeout = parse_secs(value)?;
                }
                "reconnect delay" => {
                    config.reconnect_delay = parse_secs(value)?;
                }
                "keep alive" | "keepalive" => {
                    config.keep_alive = value.eq_ignore_ascii_case("true")
                        || value.eq_ignore_ascii_case("yes")
                        || value == "1";
                }
                _ => {
                    tracing::debug!(
                        key = key,
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        Ok(config)
    }

    /// Check the configuration before a pool is built from it.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.capacity < 1 {
            return Err(PoolError::InvalidConfiguration(
                "connection pool size must be greater than zero".into(),
            ));
        }
        if self.address.trim().is_empty() {
            return Err(PoolError::InvalidConfiguration(
                "remote address must not be empty".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(PoolError::InvalidConfiguration(
                "connect timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Set the remote address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the number of pooled connections.
    #[must_use]
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the steady-state read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the backoff between failed connect attempts.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Enable or disable TCP keep-alive.
    #[must_use]
    pub fn keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }
}

fn parse_secs(value: &str) -> Result<Duration, PoolError> {
    let secs: u64 = value
        .parse()
        .map_err(|_| PoolError::InvalidConfiguration(format!("invalid timeout: {value}")))?;
    Ok(Duration::from_secs(secs))
}
