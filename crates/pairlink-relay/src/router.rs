//! Signaling relay
//!
//! Forwards `SIGNAL` and `MULTIPLEX` traffic between the members of one
//! session. The router never reads payloads; it only decides who may receive
//! a message:
//!
//! - the sender must belong to an `Active` session
//! - an explicit target must resolve (through the peer index) to the other
//!   party of that same session
//! - no target fans out to every other member
//!
//! Anything else is dropped silently. A connection can never reach a peer
//! outside its own session, whichever id it names.

use crate::protocol::ServerMessage;
use crate::registry::{ConnectionId, Registry, Role};
use crate::session::{GuestState, SessionStatus, SessionTable};

/// Why a relayed message was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Sender is not part of any session
    NoSession,
    /// Sender's session is not `Active`
    SessionInactive,
    /// Target id does not resolve to a live connection
    UnknownTarget,
    /// Target exists but belongs to another session
    ForeignTarget,
    /// Host sent a signal without naming the guest
    MissingTarget,
}

/// Resolve the recipients of a relayed message
///
/// # Errors
///
/// Returns the [`DropReason`] when the message must not be delivered.
pub fn resolve(
    registry: &Registry,
    sessions: &SessionTable,
    from: ConnectionId,
    target_id: Option<&str>,
) -> Result<Vec<ConnectionId>, DropReason> {
    let session_host = registry
        .connection(from)
        .and_then(|conn| conn.session)
        .ok_or(DropReason::NoSession)?;

    let session = sessions.get(session_host).ok_or(DropReason::NoSession)?;
    if !session.contains(from) {
        return Err(DropReason::NoSession);
    }
    if session.status != SessionStatus::Active {
        return Err(DropReason::SessionInactive);
    }

    match target_id {
        Some(target_id) => {
            let target = registry
                .lookup_peer(target_id)
                .map_err(|_| DropReason::UnknownTarget)?;
            if target == from || !session.contains(target) {
                return Err(DropReason::ForeignTarget);
            }
            Ok(vec![target])
        }
        None => Ok(session.others(from).collect()),
    }
}

/// Relay `message` from `from` to its session peers
///
/// `require_target` enforces an explicit target (host-originated signals).
/// Delivery to or from a `Claimed` guest promotes it to `Active`. Returns the
/// number of connections the message was queued for.
///
/// # Errors
///
/// Returns the [`DropReason`] when nothing was delivered.
pub fn relay(
    registry: &mut Registry,
    sessions: &SessionTable,
    from: ConnectionId,
    target_id: Option<&str>,
    require_target: bool,
    message: &ServerMessage,
) -> Result<usize, DropReason> {
    if require_target && target_id.is_none() {
        return Err(DropReason::MissingTarget);
    }

    let recipients = resolve(registry, sessions, from, target_id)?;

    let mut delivered = 0;
    for recipient in recipients.iter().copied().chain(std::iter::once(from)) {
        if let Some(conn) = registry.connection_mut(recipient) {
            if conn.role == Role::Guest && conn.guest_state == Some(GuestState::Claimed) {
                conn.guest_state = Some(GuestState::Active);
            }
        }
    }
    for recipient in recipients {
        if registry.send_to(recipient, message.clone()) {
            delivered += 1;
        }
    }

    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Connection, Outbound};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        registry: Registry,
        sessions: SessionTable,
        host: ConnectionId,
        guest: ConnectionId,
        stranger: ConnectionId,
        rx: Vec<(ConnectionId, mpsc::UnboundedReceiver<Outbound>)>,
    }

    impl Fixture {
        fn new() -> Self {
            let mut registry = Registry::new();
            let mut rx = Vec::new();
            let mut ids = Vec::new();
            for _ in 0..3 {
                let (tx, conn_rx) = mpsc::unbounded_channel();
                let id = ConnectionId::random();
                registry.insert_connection(Connection::new(id, tx));
                rx.push((id, conn_rx));
                ids.push(id);
            }
            let (host, guest, stranger) = (ids[0], ids[1], ids[2]);

            let mut sessions = SessionTable::new();
            sessions.open(host).unwrap().claim(guest).unwrap();

            let conn = registry.connection_mut(host).unwrap();
            conn.role = Role::Host;
            conn.session = Some(host);
            let conn = registry.connection_mut(guest).unwrap();
            conn.role = Role::Guest;
            conn.session = Some(host);
            conn.guest_state = Some(GuestState::Claimed);

            Self {
                registry,
                sessions,
                host,
                guest,
                stranger,
                rx,
            }
        }

        fn inbox(&mut self, id: ConnectionId) -> Vec<Outbound> {
            let (_, rx) = self.rx.iter_mut().find(|(cid, _)| *cid == id).unwrap();
            let mut out = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn signal(from: &str) -> ServerMessage {
        ServerMessage::Signal {
            from: from.to_string(),
            payload: json!({"sdp": "offer"}),
        }
    }

    #[test]
    fn test_guest_fanout_reaches_host() {
        let mut f = Fixture::new();
        let msg = signal("guest");

        let delivered = relay(&mut f.registry, &f.sessions, f.guest, None, false, &msg).unwrap();

        assert_eq!(delivered, 1);
        assert_eq!(f.inbox(f.host), vec![Outbound::Message(msg)]);
        assert!(f.inbox(f.stranger).is_empty());
    }

    #[test]
    fn test_host_targets_guest() {
        let mut f = Fixture::new();
        let target = f.guest.to_hex();
        let msg = signal("host");

        relay(&mut f.registry, &f.sessions, f.host, Some(&target), true, &msg).unwrap();
        assert_eq!(f.inbox(f.guest), vec![Outbound::Message(msg)]);
    }

    #[test]
    fn test_host_without_target_dropped() {
        let mut f = Fixture::new();
        let result = relay(&mut f.registry, &f.sessions, f.host, None, true, &signal("h"));
        assert_eq!(result, Err(DropReason::MissingTarget));
        assert!(f.inbox(f.guest).is_empty());
    }

    #[test]
    fn test_foreign_target_dropped() {
        let mut f = Fixture::new();
        let target = f.stranger.to_hex();

        let result = relay(
            &mut f.registry,
            &f.sessions,
            f.guest,
            Some(&target),
            false,
            &signal("g"),
        );

        assert_eq!(result, Err(DropReason::ForeignTarget));
        assert!(f.inbox(f.stranger).is_empty());
        assert!(f.inbox(f.host).is_empty());
    }

    #[test]
    fn test_self_target_dropped() {
        let mut f = Fixture::new();
        let target = f.guest.to_hex();
        let result = resolve(&f.registry, &f.sessions, f.guest, Some(&target));
        assert_eq!(result, Err(DropReason::ForeignTarget));
    }

    #[test]
    fn test_unknown_target_dropped() {
        let f = Fixture::new();
        let result = resolve(&f.registry, &f.sessions, f.guest, Some("nobody"));
        assert_eq!(result, Err(DropReason::UnknownTarget));
    }

    #[test]
    fn test_sender_without_session_dropped() {
        let f = Fixture::new();
        let target = f.host.to_hex();
        let result = resolve(&f.registry, &f.sessions, f.stranger, Some(&target));
        assert_eq!(result, Err(DropReason::NoSession));
    }

    #[test]
    fn test_inactive_session_dropped() {
        let mut f = Fixture::new();
        f.sessions.get_mut(f.host).unwrap().close();

        // Detached guest is no longer a member
        let result = resolve(&f.registry, &f.sessions, f.guest, None);
        assert_eq!(result, Err(DropReason::NoSession));

        let result = resolve(&f.registry, &f.sessions, f.host, None);
        assert_eq!(result, Err(DropReason::SessionInactive));
    }

    #[test]
    fn test_relay_promotes_claimed_guest() {
        let mut f = Fixture::new();
        let target = f.guest.to_hex();

        relay(&mut f.registry, &f.sessions, f.host, Some(&target), true, &signal("h")).unwrap();

        let guest = f.registry.connection(f.guest).unwrap();
        assert_eq!(guest.guest_state, Some(GuestState::Active));
    }
}
