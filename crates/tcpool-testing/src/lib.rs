//! # tcpool-testing
//!
//! Test infrastructure for exercising the pool against real sockets.
//!
//! ## Features
//!
//! - Loopback [`TestServer`] that echoes bytes or answers framed requests
//! - Forced peer-side close of individual accepted connections
//! - [`unreachable_address`] for pools whose endpoint never answers

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod server;

pub use server::{ServerMode, TestServer, unreachable_address};
