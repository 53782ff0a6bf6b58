//! # Callifornia Client
//!
//! The client-side signaling engine (§4.5, §4.7, §4.9): a session state
//! machine, the call lifecycle built on top of it, and the
//! establishment/reconnection service, all wired to the shared
//! transport and exposed through the embedding API of §6.2.
//!
//! This crate has no opinion about audio/video capture, codecs, or a
//! graphical front end — it hands decrypted media bytes and lifecycle
//! events to whatever [`events::ClientEventListener`] the embedder
//! supplies.

pub mod app;
pub mod entities;
pub mod error;
pub mod events;
pub mod outbound;
pub mod state;

pub use app::ClientApp;
pub use entities::SessionPhase;
pub use error::ClientError;
pub use events::ClientEventListener;
