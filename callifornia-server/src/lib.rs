//! # Callifornia Server
//!
//! The rendezvous server (§4.6-§4.9): the authoritative user registry,
//! the call/pending-call graph, the packet handlers that mutate it, the
//! O(1) media relay, and the background ping/eviction loops that keep
//! it honest.

pub mod app;
pub mod entities;
pub mod error;
pub mod ids;
pub mod outbound;
pub mod state;

pub use app::ServerApp;
pub use error::ServerError;
pub use state::ServerState;
