//! Per-connection session state.

use crate::peer::PeerHandle;
use drops_transport::ConnectionId;
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The connection already registered a station.
    #[error("Connection already registered as {0}")]
    AlreadyRegistered(String),

    /// The session has ended.
    #[error("Session closed")]
    Closed,
}

/// Lifecycle of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, acting as a client.
    Unregistered,
    /// Registered as the named station.
    Registered {
        /// Station name.
        name: String,
    },
    /// Stream ended.
    Closed,
}

/// State owned by one connection's read loop.
#[derive(Debug)]
pub struct Session {
    peer: PeerHandle,
    state: SessionState,
}

impl Session {
    /// Start an unregistered session writing through `peer`.
    #[must_use]
    pub fn new(peer: PeerHandle) -> Self {
        Self {
            peer,
            state: SessionState::Unregistered,
        }
    }

    /// Connection id.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        self.peer.id()
    }

    /// This connection's own outbound queue.
    #[must_use]
    pub fn peer(&self) -> &PeerHandle {
        &self.peer
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Name of the station this connection registered, if any.
    #[must_use]
    pub fn station_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Registered { name } => Some(name),
            _ => None,
        }
    }

    /// Check that a REGISTER may still be attempted.
    ///
    /// # Errors
    ///
    /// Fails if the session is already registered or closed.
    pub fn ensure_can_register(&self) -> Result<(), SessionError> {
        match &self.state {
            SessionState::Unregistered => Ok(()),
            SessionState::Registered { name } => Err(SessionError::AlreadyRegistered(name.clone())),
            SessionState::Closed => Err(SessionError::Closed),
        }
    }

    /// Transition `Unregistered -> Registered`.
    ///
    /// # Errors
    ///
    /// Fails without changing state unless the session is unregistered.
    pub fn mark_registered(&mut self, name: impl Into<String>) -> Result<(), SessionError> {
        self.ensure_can_register()?;
        self.state = SessionState::Registered { name: name.into() };
        Ok(())
    }

    /// Transition to `Closed`, returning the station to unregister.
    pub fn close(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Registered { name } => Some(name),
            _ => None,
        }
    }
}
