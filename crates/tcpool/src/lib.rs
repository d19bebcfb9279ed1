//! # tcpool
//!
//! Fixed-size pool of persistent TCP connections to a single remote endpoint.
//!
//! The pool dials every member in the background, hands healthy connections
//! to callers on demand and transparently reconnects members that fail.
//! Callers never dial a socket per request and never block indefinitely on a
//! dead peer unless they explicitly ask to.
//!
//! ## Features
//!
//! - Non-blocking construction; members connect concurrently in the background
//! - Acquire with a timeout or wait indefinitely ([`INFINITE`])
//! - Automatic reconnection with a fixed backoff delay
//! - Pool-wide lifecycle notifications delivered off the hot path
//! - Status snapshot and checkout metrics
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use tcpool::{Pool, PoolConfig};
//!
//! let config = PoolConfig::new("127.0.0.1:9998")
//!     .capacity(4)
//!     .read_timeout(Duration::from_secs(5))
//!     .connect_timeout(Duration::from_secs(1));
//!
//! let pool = Pool::new(config, None)?;
//!
//! let mut conn = pool.get(Duration::from_secs(2)).await?;
//! conn.send_data(b"hello").await?;
//! let reply = conn.read_data(5, None).await?;
//! // Hand the connection back; unusable ones are reconnected
//! conn.close();
//!
//! pool.shutdown();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod pool;
pub mod queue;
mod reconnect;

// Configuration
pub use config::PoolConfig;

// Error types
pub use error::{ConnectionError, PoolError};

// Connection types
pub use connection::Connection;

// Pool types
pub use pool::{INFINITE, Pool, PoolBuilder, PoolMetrics, PoolStatus, PooledConnection};

// Lifecycle management
pub use lifecycle::{ConnectionMetadata, ConnectionState};

// Notifications
pub use notifier::{Notifier, PoolEvent};
