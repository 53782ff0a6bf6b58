//! The embedding API's event side (§6.2): callbacks an embedding
//! application implements to learn about things the engine could not
//! have been told to do, because the network decided them.

use callifornia_protocol::ErrorKind;

/// Implemented by the embedding application, supplied once to
/// [`crate::app::ClientApp::connect`]. Every method has a default no-op
/// body so an embedder only overrides what it cares about.
///
/// Called from background threads (the transport worker, the ring
/// timer, the reconnection service) — never from the thread that calls
/// an embedding-API method. Implementations must be `Send + Sync` and
/// should not block.
pub trait ClientEventListener: Send + Sync + 'static {
    fn on_authorization_result(&self, _ok: bool, _err: Option<ErrorKind>) {}
    fn on_incoming_call(&self, _peer_nickname: &str) {}
    fn on_incoming_call_expired(&self, _peer_nickname: &str, _err: Option<ErrorKind>) {}
    fn on_outgoing_call_accepted(&self, _peer_nickname: &str) {}
    fn on_outgoing_call_declined(&self, _peer_nickname: &str, _err: Option<ErrorKind>) {}
    fn on_outgoing_call_timeout(&self, _peer_nickname: &str, _err: Option<ErrorKind>) {}
    fn on_call_ended_by_remote(&self, _peer_nickname: &str, _err: Option<ErrorKind>) {}
    fn on_call_participant_connection_down(&self, _peer_nickname: &str) {}
    fn on_call_participant_connection_restored(&self, _peer_nickname: &str) {}
    fn on_connection_down(&self) {}
    fn on_connection_restored(&self) {}
    fn on_connection_restored_authorization_needed(&self) {}
    fn on_incoming_voice(&self, _peer_nickname: &str, _pcm: &[u8]) {}
    fn on_incoming_screen(&self, _peer_nickname: &str, _frame: &[u8]) {}
    fn on_incoming_camera(&self, _peer_nickname: &str, _frame: &[u8]) {}
}
