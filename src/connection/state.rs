//! WebSocket session states.

/// Where a WebSocket connection is in its lifecycle.
///
/// A session starts in `Handshaking` and moves to `Established` once an
/// upgrade request is accepted. A rejected request leaves it in
/// `Handshaking`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Reading HTTP request tokens.
    #[default]
    Handshaking,
    /// Reading frames.
    Established,
}

impl SessionState {
    /// Whether the upgrade is done and frames flow both ways.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, SessionState::Established)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Handshaking => write!(f, "Handshaking"),
            SessionState::Established => write!(f, "Established"),
        }
    }
}
