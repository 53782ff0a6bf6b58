//! # Callifornia Transport
//!
//! The shared real-time plumbing used by both the client and the server:
//! a fragmenting UDP datagram transport (§4.1), a per-endpoint ping
//! controller (§4.2), and a reliable-request manager for signalling
//! messages that need an application-layer ack (§4.3).
//!
//! Nothing here runs on an async executor; each piece owns its own OS
//! thread and communicates through channels and callbacks, per the
//! concurrency model described in §5.

pub mod error;
pub mod ping;
pub mod reassembly;
pub mod reliable;
pub mod transport;

pub use error::TransportError;
pub use ping::PingController;
pub use reassembly::ReassemblyTable;
pub use reliable::ReliableRequestManager;
pub use transport::{DatagramTransport, Delivery, TransportHandlers};
