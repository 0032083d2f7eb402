//! Property-based tests for PAIRLINK
//!
//! Uses proptest to verify invariants across large input spaces.

use proptest::prelude::*;

// ============================================================================
// Registry Properties
// ============================================================================

mod registry_properties {
    use super::*;
    use pairlink_relay::registry::{Connection, Outbound};
    use pairlink_relay::{ConnectionId, Registry};
    use std::collections::HashMap;
    use tokio::sync::mpsc;

    /// Insert `count` live connections; the returned inboxes must outlive
    /// the lookups or every connection reads as stale
    fn populate(
        registry: &mut Registry,
        count: usize,
    ) -> (Vec<ConnectionId>, Vec<mpsc::UnboundedReceiver<Outbound>>) {
        (0..count)
            .map(|_| {
                let (tx, rx) = mpsc::unbounded_channel();
                let id = ConnectionId::random();
                registry.insert_connection(Connection::new(id, tx));
                (id, rx)
            })
            .unzip()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Every registered key resolves to the connection that registered it
        #[test]
        fn host_lookup_returns_registrant(
            keys in prop::collection::hash_set("[A-Z0-9]{4,8}", 1..2000),
        ) {
            let mut registry = Registry::new();
            let (ids, _inboxes) = populate(&mut registry, keys.len());

            let expected: HashMap<String, ConnectionId> =
                keys.into_iter().zip(ids.iter().copied()).collect();
            for (key, id) in &expected {
                registry.register_host(key, *id).unwrap();
            }

            prop_assert_eq!(registry.host_count(), expected.len());
            for (key, id) in &expected {
                prop_assert_eq!(registry.lookup_host(key).unwrap(), *id);
            }
        }

        /// Peer ids resolve to their connection and disappear with it
        #[test]
        fn peer_ids_follow_connection(
            peer_ids in prop::collection::hash_set("[a-z]{3,12}", 1..500),
        ) {
            let mut registry = Registry::new();
            let (ids, _inboxes) = populate(&mut registry, peer_ids.len());

            let expected: Vec<(String, ConnectionId)> =
                peer_ids.into_iter().zip(ids.iter().copied()).collect();
            for (peer_id, id) in &expected {
                registry.register_peer(peer_id, *id).unwrap();
            }
            for (peer_id, id) in &expected {
                prop_assert_eq!(registry.lookup_peer(peer_id).unwrap(), *id);
            }

            for (peer_id, id) in &expected {
                registry.remove_connection(*id);
                prop_assert!(registry.lookup_peer(peer_id).is_err());
            }
            prop_assert!(registry.is_empty());
            prop_assert_eq!(registry.peer_count(), 0);
        }
    }
}

// ============================================================================
// Session Properties
// ============================================================================

mod session_properties {
    use super::*;
    use pairlink_relay::session::Session;
    use pairlink_relay::{ConnectionId, SessionStatus};

    proptest! {
        /// However many guests claim a waiting session, exactly one gets it
        #[test]
        fn at_most_one_guest(claimers in 1usize..64) {
            let host = ConnectionId::random();
            let mut session = Session::new(host);

            let guests: Vec<ConnectionId> = (0..claimers).map(|_| ConnectionId::random()).collect();
            let winners: Vec<ConnectionId> = guests
                .iter()
                .copied()
                .filter(|guest| session.claim(*guest).is_ok())
                .collect();

            prop_assert_eq!(winners.len(), 1);
            prop_assert_eq!(session.guest, Some(winners[0]));
            prop_assert_eq!(session.status, SessionStatus::Active);
        }
    }
}

// ============================================================================
// Backoff Properties
// ============================================================================

mod backoff_properties {
    use super::*;
    use pairlink_client::ReconnectPolicy;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::time::Duration;

    fn policy() -> impl Strategy<Value = ReconnectPolicy> {
        (1u64..2_000, 1u64..50, 0u64..1_000).prop_map(|(base, factor, jitter)| ReconnectPolicy {
            base: Duration::from_millis(base),
            cap: Duration::from_millis(base * factor),
            jitter: Duration::from_millis(jitter),
            max_attempts: 10,
        })
    }

    proptest! {
        /// Pre-jitter delays never decrease and stop at the cap
        #[test]
        fn schedule_monotonic_until_cap(policy in policy()) {
            let mut previous = Duration::ZERO;
            for attempt in 0..64 {
                let delay = policy.base_delay(attempt);
                prop_assert!(delay >= previous);
                prop_assert!(delay <= policy.cap);
                previous = delay;
            }
            prop_assert_eq!(previous, policy.cap);
        }

        /// Jittered delays stay within cap + jitter
        #[test]
        fn jittered_delay_bounded(policy in policy(), seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            for attempt in 0..policy.max_attempts {
                let delay = policy.delay(attempt, &mut rng);
                prop_assert!(delay >= policy.base_delay(attempt));
                prop_assert!(delay <= policy.max_delay());
            }
        }
    }
}
