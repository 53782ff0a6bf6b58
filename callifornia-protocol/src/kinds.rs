//! Error kinds shared by both sides of the connection (§7).
//!
//! These are values carried in event callbacks and signalling replies —
//! distinct from [`crate::error::ProtocolError`], which only covers wire
//! decode failures.

use std::fmt;

/// One of the error kinds the core distinguishes, per §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local socket or reassembly failure.
    NetworkError,
    /// Authorization denied because the nickname is already registered.
    TakenNickname,
    /// An outgoing-call target is not authorised.
    UnexistingUser,
    /// The call or ring partner's link dropped.
    ConnectionDownWithUser,
    /// The partner was evicted (logout or reconnection timeout).
    UserLogout,
    /// A ring was not answered within the ring timeout.
    Timeout,
    /// Declined because the recipient was already busy on another ring
    /// or call, rather than because they chose a different peer (§9 open
    /// question: declines triggered by the accept-while-busy cascade
    /// carry this distinct kind so UIs can explain it).
    DeclinedBusy,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NetworkError => "network_error",
            ErrorKind::TakenNickname => "taken_nickname",
            ErrorKind::UnexistingUser => "unexisting_user",
            ErrorKind::ConnectionDownWithUser => "connection_down_with_user",
            ErrorKind::UserLogout => "user_logout",
            ErrorKind::Timeout => "timeout",
            ErrorKind::DeclinedBusy => "declined_busy",
        };
        write!(f, "{s}")
    }
}
