//! Arena-style identifiers for the `Call`/`PendingCall` owning maps.
//!
//! §9 notes that a language without weak pointers should realise the
//! `User ↔ Call`/`PendingCall` graph with arena+index IDs freed on
//! removal from the owning map, rather than `Arc`/`Weak`. Since all of
//! it already lives behind [`crate::state::ServerState`]'s single mutex
//! (§5), a `HashMap` keyed by one of these ids *is* the weak-reference
//! realisation: a `User` holds the id, not a pointer, and a dangling id
//! simply fails the next lookup instead of needing to be upgraded.

use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

arena_id!(CallId);
arena_id!(PendingCallId);

/// Hands out strictly increasing, never-reused ids for one arena.
#[derive(Default)]
pub struct IdCounter(u64);

impl IdCounter {
    pub fn next(&mut self) -> u64 {
        let id = self.0;
        self.0 += 1;
        id
    }
}
