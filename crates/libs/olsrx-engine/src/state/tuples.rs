//! Protocol state tuples.
//!
//! Shapes follow RFC 3626 extended with the ETX / mobility fields carried
//! by this protocol variant. All addresses are IPv4; "main" addresses are
//! canonical per-node addresses, interface addresses are per-link.

use std::net::Ipv4Addr;

use olsrx_wire::{Willingness, ETX_SATURATION};

use crate::node::Vec3;
use crate::time::Timestamp;

/// Bound on the per-link distance history feeding the LSD estimator.
pub const DISTANCE_HISTORY: usize = 5;

/// Link-hold-time sentinel for parallel relative motion ("very stable").
pub const LHT_STABLE: f64 = 1000.0;

/// Link-hold-time sentinel for a neighbor already out of range.
pub const LHT_OUT_OF_RANGE: f64 = -1.0;

/// A sensed link between one local and one neighbor interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTuple {
    pub local_iface: Ipv4Addr,
    pub neighbor_iface: Ipv4Addr,
    /// Bidirectional until this instant.
    pub sym_expiry: Timestamp,
    /// Unidirectional until this instant.
    pub asym_expiry: Timestamp,
    /// The tuple itself lives until this instant.
    pub expiry: Timestamp,
    /// Forward ETX, mirrored from the link-quality set.
    pub etx: u32,
}

impl LinkTuple {
    pub fn is_symmetric(&self, now: Timestamp) -> bool {
        self.sym_expiry >= now
    }
}

/// Directional link-quality accounting for one interface pair.
///
/// The forward tuple (local → neighbor) carries the probe counters and
/// the mobility predictors; the reverse tuple only mirrors the ETX the
/// neighbor advertises for its own forward direction.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkQualityTuple {
    pub local_iface: Ipv4Addr,
    pub neighbor_iface: Ipv4Addr,
    pub hellos_sent: u32,
    pub acks_received: u32,
    pub etx: u32,
    pub expiry: Timestamp,
    /// Neighbor churn rate last heard from this neighbor's HELLO.
    pub neighbor_churn: u16,
    pub relative_position: Vec3,
    pub relative_velocity: Vec3,
    /// Predicted seconds until the link leaves communication range.
    /// Negative means "already out of range, avoid".
    pub hold_time: f64,
    /// Variance of the recent inter-node distances.
    pub stability_deviation: f64,
    pub distances: Vec<f64>,
}

impl LinkQualityTuple {
    pub fn new(local_iface: Ipv4Addr, neighbor_iface: Ipv4Addr, expiry: Timestamp) -> Self {
        Self {
            local_iface,
            neighbor_iface,
            hellos_sent: 0,
            acks_received: 0,
            etx: ETX_SATURATION,
            expiry,
            neighbor_churn: 0,
            relative_position: Vec3::default(),
            relative_velocity: Vec3::default(),
            hold_time: 0.0,
            stability_deviation: 0.0,
            distances: Vec::new(),
        }
    }

    /// ETX is the expected transmissions per delivered probe, at least 1;
    /// saturated while no acknowledgment has been seen. Integer division
    /// keeps the estimate from flickering to 2 on the in-flight probe.
    pub fn recompute_etx(&mut self) {
        self.etx = if self.acks_received == 0 {
            ETX_SATURATION
        } else {
            (self.hellos_sent / self.acks_received).max(1)
        };
    }

    /// Append a distance sample and refresh the stability deviation.
    pub fn push_distance(&mut self, distance: f64) {
        if self.distances.len() >= DISTANCE_HISTORY {
            self.distances.remove(0);
        }
        self.distances.push(distance);

        let n = self.distances.len() as f64;
        let mean = self.distances.iter().sum::<f64>() / n;
        self.stability_deviation =
            self.distances.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborStatus {
    NotSym,
    Sym,
}

/// A 1-hop neighbor, derived from the link set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborTuple {
    pub main_addr: Ipv4Addr,
    pub status: NeighborStatus,
    pub willingness: Willingness,
}

/// A neighbor's advertised symmetric neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoHopTuple {
    pub neighbor_main: Ipv4Addr,
    pub two_hop_main: Ipv4Addr,
    pub expiry: Timestamp,
}

/// A neighbor that elected us as its MPR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MprSelectorTuple {
    pub main_addr: Ipv4Addr,
    pub expiry: Timestamp,
}

/// One TC-advertised edge: `last` can reach `dest` at cost `etx`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyTuple {
    pub dest: Ipv4Addr,
    pub last: Ipv4Addr,
    pub seq: u16,
    pub expiry: Timestamp,
    pub etx: u32,
}

/// Seen-message record for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateTuple {
    pub originator: Ipv4Addr,
    pub seq: u16,
    pub retransmitted: bool,
    pub ifaces: Vec<Ipv4Addr>,
    pub expiry: Timestamp,
}

/// Secondary-interface binding learned from MID (or seeded for our own
/// interfaces, which never expire).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfaceAssocTuple {
    pub iface: Ipv4Addr,
    pub main: Ipv4Addr,
    pub expiry: Option<Timestamp>,
}

/// A locally announced (network, netmask) association.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Association {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

/// External reachability learned from a gateway's HNA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationTuple {
    pub gateway: Ipv4Addr,
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub expiry: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn etx_saturates_without_acks_and_never_drops_below_one() {
        let mut q = LinkQualityTuple::new(addr(1), addr(2), Timestamp::ZERO);
        q.hellos_sent = 7;
        q.recompute_etx();
        assert_eq!(q.etx, ETX_SATURATION);

        q.acks_received = 14;
        q.recompute_etx();
        assert_eq!(q.etx, 1);

        q.hellos_sent = 70;
        q.recompute_etx();
        assert_eq!(q.etx, 5);

        // the not-yet-acknowledged probe in flight must not inflate it
        q.hellos_sent = 15;
        q.acks_received = 14;
        q.recompute_etx();
        assert_eq!(q.etx, 1);
    }

    #[test]
    fn distance_history_is_bounded_and_variance_tracks_it() {
        let mut q = LinkQualityTuple::new(addr(1), addr(2), Timestamp::ZERO);
        for d in [10.0, 10.0, 10.0] {
            q.push_distance(d);
        }
        assert_eq!(q.stability_deviation, 0.0);

        for d in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            q.push_distance(d);
        }
        assert_eq!(q.distances, vec![2.0, 3.0, 4.0, 5.0, 6.0]);
        // variance of 2..=6 is 2
        assert!((q.stability_deviation - 2.0).abs() < 1e-9);
    }
}
