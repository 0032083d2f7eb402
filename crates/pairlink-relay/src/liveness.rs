//! Liveness sweep
//!
//! Every sweep interval each connection is checked once:
//!
//! - still `AwaitingPong` from the previous sweep: marked `Dead` and reported
//!   for termination
//! - otherwise: flagged `AwaitingPong` and sent a ping frame
//!
//! A pong frame or a `HEARTBEAT` message flips the connection back to
//! `Alive`. This is the only path that reclaims clients which vanish without a
//! close frame (crashed browsers, network partitions).

use crate::registry::{ConnectionId, Liveness, Registry};
use std::time::{Duration, Instant};

/// Result of one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Connections pinged this round
    pub pinged: usize,
    /// Connections that missed a full interval
    pub dead: Vec<ConnectionId>,
}

/// Running sweep counters
#[derive(Debug, Clone, Default)]
pub struct LivenessMonitor {
    sweeps: u64,
    reaped: u64,
    last_sweep: Option<Instant>,
}

impl LivenessMonitor {
    /// Create a monitor with zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one sweep over the registry
    ///
    /// Dead connections are only marked here; the caller terminates them so
    /// registry and session cleanup run through the normal disconnect path.
    pub fn sweep(&mut self, registry: &mut Registry) -> SweepReport {
        let mut report = SweepReport::default();

        for conn in registry.connections_mut() {
            match conn.liveness {
                Liveness::AwaitingPong | Liveness::Dead => {
                    conn.liveness = Liveness::Dead;
                    report.dead.push(conn.id);
                }
                Liveness::Alive => {
                    conn.liveness = Liveness::AwaitingPong;
                    if conn.ping() {
                        report.pinged += 1;
                    } else {
                        // Writer already gone
                        conn.liveness = Liveness::Dead;
                        report.dead.push(conn.id);
                    }
                }
            }
        }

        self.sweeps += 1;
        self.reaped += report.dead.len() as u64;
        self.last_sweep = Some(Instant::now());
        report
    }

    /// Number of sweeps run
    #[must_use]
    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    /// Connections reaped across all sweeps
    #[must_use]
    pub fn reaped(&self) -> u64 {
        self.reaped
    }

    /// Time since the last sweep
    #[must_use]
    pub fn since_last_sweep(&self) -> Option<Duration> {
        self.last_sweep.map(|at| at.elapsed())
    }
}
