//! Host/guest pairing state
//!
//! A session is opened when a host registers and is keyed by the host's
//! connection id. It accepts exactly one claim: the first guest to claim a
//! `Waiting` session flips it to `Active`, and every later claim is refused.
//!
//! ```text
//!   host:   Waiting ──claim──> Active ──host gone──> Closed
//!                     ^           │
//!                     └─Reopen────┘ (guest gone, policy dependent)
//!
//!   guest:  Searching ──claim──> Claimed ──first relay──> Active ──> Released
//! ```

use crate::registry::ConnectionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Host registered, no guest
    Waiting,
    /// One guest claimed the host
    Active,
    /// Pairing finished; no further claims
    Closed,
}

/// Matching state of a guest connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestState {
    /// Registered, not matched yet
    Searching,
    /// Claim accepted, no traffic relayed yet
    Claimed,
    /// Traffic has flowed through the session
    Active,
    /// Host went away or the pairing ended
    Released,
}

/// What happens to a session when its guest disconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestLeavePolicy {
    /// Single-use pairing: the session closes and refuses further claims
    #[default]
    Close,
    /// The host returns to `Waiting` and may accept a new guest
    Reopen,
}

/// Why a claim was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimError {
    /// Session already has a guest
    AlreadyActive,
    /// Session is closed
    Closed,
    /// Guest tried to claim its own session
    SelfClaim,
}

/// Logical pairing of one host with at most one guest
#[derive(Debug, Clone)]
pub struct Session {
    /// Host connection
    pub host: ConnectionId,
    /// Guest connection, once claimed
    pub guest: Option<ConnectionId>,
    /// Current status
    pub status: SessionStatus,
    /// When the host registered
    pub created_at: Instant,
    /// When the current guest claimed
    pub matched_at: Option<Instant>,
}

impl Session {
    /// Open a waiting session for a host
    #[must_use]
    pub fn new(host: ConnectionId) -> Self {
        Self {
            host,
            guest: None,
            status: SessionStatus::Waiting,
            created_at: Instant::now(),
            matched_at: None,
        }
    }

    /// Attach a guest; only succeeds from `Waiting`
    ///
    /// # Errors
    ///
    /// Returns the reason the claim was refused.
    pub fn claim(&mut self, guest: ConnectionId) -> Result<(), ClaimError> {
        if guest == self.host {
            return Err(ClaimError::SelfClaim);
        }
        match self.status {
            SessionStatus::Waiting => {
                self.guest = Some(guest);
                self.status = SessionStatus::Active;
                self.matched_at = Some(Instant::now());
                Ok(())
            }
            SessionStatus::Active => Err(ClaimError::AlreadyActive),
            SessionStatus::Closed => Err(ClaimError::Closed),
        }
    }

    /// Detach the guest according to `policy`, returning it
    pub fn release_guest(&mut self, policy: GuestLeavePolicy) -> Option<ConnectionId> {
        let guest = self.guest.take()?;
        self.matched_at = None;
        self.status = match policy {
            GuestLeavePolicy::Close => SessionStatus::Closed,
            GuestLeavePolicy::Reopen => SessionStatus::Waiting,
        };
        Some(guest)
    }

    /// Close the session, returning the guest that was attached
    pub fn close(&mut self) -> Option<ConnectionId> {
        self.status = SessionStatus::Closed;
        self.guest.take()
    }

    /// Put the session back to `Waiting` (host re-registration)
    ///
    /// Only valid when no guest is attached.
    pub fn reset(&mut self) -> bool {
        if self.guest.is_some() {
            return false;
        }
        self.status = SessionStatus::Waiting;
        self.created_at = Instant::now();
        true
    }

    /// Check if `id` is the host or the guest
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.host == id || self.guest == Some(id)
    }

    /// Members other than `id`
    pub fn others(&self, id: ConnectionId) -> impl Iterator<Item = ConnectionId> + '_ {
        std::iter::once(self.host)
            .chain(self.guest)
            .filter(move |member| *member != id)
    }
}

/// All sessions, keyed by host connection id
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ConnectionId, Session>,
}

impl SessionTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or reuse) the session for a host
    ///
    /// An existing session without a guest is reset to `Waiting`. Returns
    /// `None` if the host's session currently has a guest attached.
    pub fn open(&mut self, host: ConnectionId) -> Option<&mut Session> {
        let session = self
            .sessions
            .entry(host)
            .or_insert_with(|| Session::new(host));
        if session.reset() {
            Some(session)
        } else {
            None
        }
    }

    /// Get a host's session
    #[must_use]
    pub fn get(&self, host: ConnectionId) -> Option<&Session> {
        self.sessions.get(&host)
    }

    /// Get a host's session mutably
    pub fn get_mut(&mut self, host: ConnectionId) -> Option<&mut Session> {
        self.sessions.get_mut(&host)
    }

    /// Remove a host's session
    pub fn remove(&mut self, host: ConnectionId) -> Option<Session> {
        self.sessions.remove(&host)
    }

    /// Number of sessions with the given status
    #[must_use]
    pub fn count(&self, status: SessionStatus) -> usize {
        self.sessions.values().filter(|s| s.status == status).count()
    }

    /// Total number of sessions
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if there are no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
