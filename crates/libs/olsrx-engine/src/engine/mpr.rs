//! MPR election: the smallest set of symmetric neighbors that covers
//! every 2-hop neighbor, greedily approximated per RFC 3626 section 8.3
//! with willingness and degree tie-breakers.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use olsrx_wire::Willingness;

use crate::state::{NeighborStatus, NeighborTuple, State};
use crate::time::Timestamp;

use super::Engine;

/// One candidate 2-hop edge: `anchor` (a SYM neighbor) reaches `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    anchor: Ipv4Addr,
    target: Ipv4Addr,
}

pub(crate) fn compute(engine: &mut Engine, _now: Timestamp) {
    let selection = elect(&engine.state, engine.main_address);
    if engine.state.set_mpr_set(selection) {
        log::debug!(
            "olsr({}): MPR set now {:?}",
            engine.main_address,
            engine.state.mpr_set()
        );
    }
}

fn elect(state: &State, main_address: Ipv4Addr) -> BTreeSet<Ipv4Addr> {
    let mut mpr_set = BTreeSet::new();

    let n: Vec<NeighborTuple> = state
        .neighbors()
        .iter()
        .filter(|neighbor| neighbor.status == NeighborStatus::Sym)
        .cloned()
        .collect();

    // N2: 2-hop edges excluding ourselves, targets that are themselves
    // SYM neighbors, and anchors unwilling (or unable) to relay.
    let mut n2: Vec<Edge> = Vec::new();
    for tuple in state.two_hop_neighbors() {
        if tuple.two_hop_main == main_address {
            continue;
        }
        let Some(anchor) = n.iter().find(|nb| nb.main_addr == tuple.neighbor_main) else {
            continue;
        };
        if anchor.willingness == Willingness::NEVER {
            continue;
        }
        if n.iter().any(|nb| nb.main_addr == tuple.two_hop_main) {
            continue;
        }
        n2.push(Edge { anchor: tuple.neighbor_main, target: tuple.two_hop_main });
    }

    // 1. WILL_ALWAYS neighbors are in unconditionally.
    for neighbor in n.iter().filter(|nb| nb.willingness == Willingness::ALWAYS) {
        mpr_set.insert(neighbor.main_addr);
        cover(&mut n2, neighbor.main_addr);
    }

    // 2. Anchors that are the only road to some target.
    let mut covered: BTreeSet<Ipv4Addr> = BTreeSet::new();
    for edge in &n2 {
        let only_one = !n2
            .iter()
            .any(|other| other.target == edge.target && other.anchor != edge.anchor);
        if only_one {
            mpr_set.insert(edge.anchor);
            covered.extend(
                n2.iter().filter(|other| other.anchor == edge.anchor).map(|other| other.target),
            );
        }
    }
    n2.retain(|edge| !covered.contains(&edge.target));

    // 3. Greedy: highest willingness, then reachability, then degree.
    while !n2.is_empty() {
        let mut best: Option<(&NeighborTuple, usize)> = None;
        for neighbor in &n {
            let reach = n2.iter().filter(|edge| edge.anchor == neighbor.main_addr).count();
            if reach == 0 {
                continue;
            }
            best = match best {
                None => Some((neighbor, reach)),
                Some((current, current_reach)) => {
                    if neighbor.willingness > current.willingness
                        || (neighbor.willingness == current.willingness && reach > current_reach)
                        || (neighbor.willingness == current.willingness
                            && reach == current_reach
                            && degree(state, neighbor.main_addr) > degree(state, current.main_addr))
                    {
                        Some((neighbor, reach))
                    } else {
                        Some((current, current_reach))
                    }
                }
            };
        }

        match best {
            Some((winner, _)) => {
                mpr_set.insert(winner.main_addr);
                cover(&mut n2, winner.main_addr);
            }
            None => break,
        }
    }

    mpr_set
}

/// Drop every edge whose target the new MPR already reaches.
fn cover(n2: &mut Vec<Edge>, mpr: Ipv4Addr) {
    let reached: BTreeSet<Ipv4Addr> =
        n2.iter().filter(|edge| edge.anchor == mpr).map(|edge| edge.target).collect();
    n2.retain(|edge| !reached.contains(&edge.target));
}

/// D(y): how many of y's advertised neighbors are strangers to us.
///
/// Static over the full 2-hop set, unlike reachability which shrinks as
/// the election covers targets.
fn degree(state: &State, neighbor_main: Ipv4Addr) -> usize {
    state
        .two_hop_neighbors()
        .iter()
        .filter(|tuple| {
            tuple.neighbor_main == neighbor_main && state.find_neighbor(tuple.two_hop_main).is_none()
        })
        .count()
}
