//! # tcpool-frame
//!
//! Length-prefixed framing for messages exchanged over pooled connections.
//!
//! Every frame is a 4-byte big-endian payload length followed by the payload
//! itself. The pool never looks inside frames; this crate exists for the
//! programs built on top of it (the demo driver and the loopback test
//! servers).
//!
//! ## Features
//!
//! - Frame reassembly across TCP segment boundaries
//! - Configurable maximum frame size
//! - Integration with tokio-util's codec framework
//! - Helpers for callers that read the header and payload by hand

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod error;
pub mod framed;

pub use codec::{FrameCodec, HEADER_LEN, DEFAULT_MAX_FRAME_LEN, decode_header, encode_frame};
pub use error::FrameError;
pub use framed::FrameStream;
