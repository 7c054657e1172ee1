//! Duplex byte-stream transport for the pan/tilt link.
//!
//! Every boundary in the system is a [`DuplexStream`]:
//! - the TCP connection between a sensor node and its detection service
//! - a Unix domain socket (local deployments and tests)
//! - the stdin/stdout pipe pair of a spawned detection worker
//!
//! This is the lowest layer of pantilt. Framing and the dispatch loop build
//! on top of the `Read + Write` impls and the zero-timeout readiness check
//! provided here.

pub mod error;
pub mod pipe;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use pipe::ChildPipe;
pub use stream::{DuplexStream, Readiness};
pub use tcp::TcpEndpoint;
