//! # Relations
//!
//! A relation is a directed wire from one source socket to one destination
//! socket. It carries the last value propagated along it.

use crate::{NodeId, RelId, SockId, State};

/// A single directed wire.
///
/// The `(to, to_sock)` pair is unique across a scene; `(from, from_sock)`
/// may fan out to many relations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rel {
    pub id: RelId,
    pub from: NodeId,
    pub to: NodeId,
    /// Source socket. Only meaningful for components and boundary inputs.
    pub from_sock: SockId,
    pub to_sock: SockId,
    pub value: State,
}

impl Rel {
    /// Create a relation carrying `Disabled`.
    #[must_use]
    pub const fn new(id: RelId, to: NodeId, to_sock: SockId, from: NodeId, from_sock: SockId) -> Self {
        Self {
            id,
            from,
            to,
            from_sock,
            to_sock,
            value: State::Disabled,
        }
    }

    /// Whether a new value must be pushed downstream.
    ///
    /// A `Disabled` cached value is always stale, so it re-propagates even
    /// when the same tag arrives again.
    #[must_use]
    pub fn is_stale(&self, incoming: State) -> bool {
        self.value != incoming || self.value.is_disabled()
    }
}
