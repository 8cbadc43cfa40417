//! The connection lifecycle state machine. Transitions not named in
//! [`ConnectionState::apply`] are a no-op: `apply` returns `false` ("not
//! taken") and the state is left unchanged.

use crate::server_info::ServerInfo;

/// The set of states a connection can be in.
#[derive(Debug, Clone)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    TlsHandshake,
    Connected(ServerInfo),
    Reconnecting { attempt: u64 },
    Draining,
    Closed,
}

/// Events that drive transitions between states.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connect,
    TlsRequired,
    TlsComplete,
    Connected(ServerInfo),
    Disconnected,
    Reconnecting { attempt: u64 },
    Drain,
    Close,
}

impl ConnectionState {
    /// Applies `event`, mutating `self` in place if the transition is legal.
    /// Returns `true` if a transition was taken, `false` ("not taken") if
    /// `(state, event)` has no entry in the table.
    pub fn apply(&mut self, event: ConnectionEvent) -> bool {
        use ConnectionEvent as E;
        use ConnectionState as S;

        let next = match (&*self, &event) {
            (S::Disconnected, E::Connect) => S::Connecting,
            (S::Disconnected, E::Close) => S::Closed,

            (S::Connecting, E::TlsRequired) => S::TlsHandshake,
            (S::Connecting, E::Connected(info)) => S::Connected(info.clone()),
            (S::Connecting, E::Disconnected) => S::Disconnected,
            (S::Connecting, E::Close) => S::Closed,

            (S::TlsHandshake, E::TlsComplete) => S::Connecting,
            (S::TlsHandshake, E::Disconnected) => S::Disconnected,
            (S::TlsHandshake, E::Close) => S::Closed,

            (S::Connected(_), E::Disconnected) => S::Disconnected,
            (S::Connected(_), E::Reconnecting { attempt }) => S::Reconnecting { attempt: *attempt },
            (S::Connected(_), E::Drain) => S::Draining,
            (S::Connected(_), E::Close) => S::Closed,

            (S::Reconnecting { .. }, E::Connected(info)) => S::Connected(info.clone()),
            (S::Reconnecting { .. }, E::Reconnecting { attempt }) => {
                S::Reconnecting { attempt: *attempt }
            }
            (S::Reconnecting { .. }, E::Disconnected) => S::Disconnected,
            (S::Reconnecting { .. }, E::Close) => S::Closed,

            (S::Draining, E::Disconnected) => S::Disconnected,
            (S::Draining, E::Close) => S::Closed,

            (S::Closed, _) => return false,

            _ => return false,
        };

        *self = next;
        true
    }

    /// Forced escape hatch for error recovery. Never call this to leave
    /// `Closed` during normal operation.
    pub fn force_set(&mut self, state: ConnectionState) {
        if matches!(self, ConnectionState::Closed) {
            return;
        }
        *self = state;
    }

    /// `true` iff the state accepts continuing in-flight traffic
    /// (`Connected` or `Draining`).
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connected(_) | ConnectionState::Draining)
    }

    /// `true` iff new operations may be submitted.
    pub fn can_accept_operations(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        match self {
            ConnectionState::Connected(info) => Some(info),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ServerInfo {
        ServerInfo::default()
    }

    #[test]
    fn closed_rejects_every_event() {
        for event in [
            ConnectionEvent::Connect,
            ConnectionEvent::TlsRequired,
            ConnectionEvent::TlsComplete,
            ConnectionEvent::Connected(info()),
            ConnectionEvent::Disconnected,
            ConnectionEvent::Reconnecting { attempt: 1 },
            ConnectionEvent::Drain,
            ConnectionEvent::Close,
        ] {
            let mut state = ConnectionState::Closed;
            assert!(!state.apply(event));
            assert!(matches!(state, ConnectionState::Closed));
        }
    }

    #[test]
    fn full_happy_path() {
        let mut state = ConnectionState::Disconnected;
        assert!(state.apply(ConnectionEvent::Connect));
        assert!(matches!(state, ConnectionState::Connecting));

        assert!(state.apply(ConnectionEvent::TlsRequired));
        assert!(matches!(state, ConnectionState::TlsHandshake));

        assert!(state.apply(ConnectionEvent::TlsComplete));
        assert!(matches!(state, ConnectionState::Connecting));

        assert!(state.apply(ConnectionEvent::Connected(info())));
        assert!(state.is_active());
        assert!(state.can_accept_operations());

        assert!(state.apply(ConnectionEvent::Drain));
        assert!(matches!(state, ConnectionState::Draining));
        assert!(state.is_active());
        assert!(!state.can_accept_operations());

        assert!(state.apply(ConnectionEvent::Close));
        assert!(state.is_closed());
    }

    #[test]
    fn reconnect_path() {
        let mut state = ConnectionState::Connected(info());
        assert!(state.apply(ConnectionEvent::Reconnecting { attempt: 1 }));
        assert!(matches!(state, ConnectionState::Reconnecting { attempt: 1 }));
        assert!(!state.is_active());

        assert!(state.apply(ConnectionEvent::Reconnecting { attempt: 2 }));
        assert!(matches!(state, ConnectionState::Reconnecting { attempt: 2 }));

        assert!(state.apply(ConnectionEvent::Connected(info())));
        assert!(state.can_accept_operations());
    }

    #[test]
    fn illegal_transition_is_not_taken() {
        let mut state = ConnectionState::Disconnected;
        assert!(!state.apply(ConnectionEvent::Drain));
        assert!(matches!(state, ConnectionState::Disconnected));
    }

    #[test]
    fn force_set_cannot_escape_closed() {
        let mut state = ConnectionState::Closed;
        state.force_set(ConnectionState::Disconnected);
        assert!(state.is_closed());
    }
}
