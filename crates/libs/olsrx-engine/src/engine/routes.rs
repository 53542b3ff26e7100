//! ETX-weighted routing-table computation and the forwarding API.
//!
//! The table is rebuilt from scratch on every invocation: symmetric
//! neighbors first, then their advertised 2-hop neighbors, then a
//! fixed-point relaxation over the TC-learned topology, then interface
//! aliases and HNA network routes. Costs accumulate multiplicatively per
//! directional link and additively along paths, so the result minimizes
//! expected transmissions rather than hops.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use olsrx_wire::{Willingness, ETX_SATURATION};

use crate::error::EngineError;
use crate::node::InterfaceAddr;
use crate::state::NeighborStatus;
use crate::time::Timestamp;

use super::Engine;

/// One host route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub local_iface: Ipv4Addr,
    pub distance: u32,
    pub etx: u32,
}

/// One HNA-learned network route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRoute {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub local_iface: Ipv4Addr,
    pub distance: u32,
}

/// A route from a non-OLSR static table, offered for HNA announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    pub network: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub interface_index: u32,
}

/// Outcome of a forwarding query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardDecision {
    /// Self-originated traffic looping back; swallow it.
    Consumed,
    /// Addressed to this node.
    Deliver,
    Forward { next_hop: Ipv4Addr, local_iface: Ipv4Addr, source: Ipv4Addr },
    NoRoute,
}

/// Immutable routing snapshot: host routes plus HNA network routes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteTable {
    host: BTreeMap<Ipv4Addr, RouteEntry>,
    network: Vec<NetworkRoute>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.host.len()
    }

    pub fn is_empty(&self) -> bool {
        self.host.is_empty()
    }

    pub fn lookup(&self, destination: Ipv4Addr) -> Option<&RouteEntry> {
        self.host.get(&destination)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.host.values()
    }

    pub fn network_routes(&self) -> &[NetworkRoute] {
        &self.network
    }

    /// Longest-prefix match against the HNA network routes.
    pub fn lookup_network(&self, destination: Ipv4Addr) -> Option<&NetworkRoute> {
        self.network
            .iter()
            .filter(|route| {
                let mask = u32::from(route.netmask);
                u32::from(destination) & mask == u32::from(route.network) & mask
            })
            .max_by_key(|route| u32::from(route.netmask))
    }

    /// Dereference next-hops until a directly reachable gateway is found
    /// (an entry whose next hop is its own destination). Bounded by the
    /// table size so a corrupt cycle returns `None` instead of spinning.
    pub fn resolve(&self, destination: Ipv4Addr) -> Option<RouteEntry> {
        let mut entry = self.host.get(&destination)?;
        let mut hops = 0;
        while entry.destination != entry.next_hop {
            hops += 1;
            if hops > self.host.len() {
                return None;
            }
            entry = self.host.get(&entry.next_hop)?;
        }
        Some(RouteEntry { destination, ..entry.clone() })
    }

    fn insert(&mut self, entry: RouteEntry) {
        self.host.insert(entry.destination, entry);
    }
}

impl fmt::Display for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "destination      next-hop         iface            dist  etx")?;
        for entry in self.host.values() {
            writeln!(
                f,
                "{:<16} {:<16} {:<16} {:<5} {}",
                entry.destination, entry.next_hop, entry.local_iface, entry.distance, entry.etx
            )?;
        }
        for route in &self.network {
            writeln!(
                f,
                "{}/{} via {} iface {} dist {}",
                route.network, route.netmask, route.next_hop, route.local_iface, route.distance
            )?;
        }
        Ok(())
    }
}

/// Rebuild and publish the routing table.
pub(crate) fn compute(engine: &mut Engine, now: Timestamp) {
    let mut table = RouteTable::new();
    let main_address = engine.main_address;

    {
        let state = &engine.state;

        // Symmetric 1-hop neighbors: cost is the product of every live
        // directional quality figure on the links to them.
        for neighbor in state.neighbors().iter().filter(|n| n.status == NeighborStatus::Sym) {
            let mut etx_forward: u32 = 1;
            let mut etx_reverse: u32 = 1;
            let mut chosen: Option<(Ipv4Addr, Ipv4Addr)> = None;
            let mut main_covered = false;

            for quality in state.link_quality_set() {
                if quality.expiry < now {
                    continue;
                }
                if state.main_address_of(quality.neighbor_iface) == neighbor.main_addr {
                    etx_forward = etx_forward.saturating_mul(quality.etx);
                    chosen = Some((quality.local_iface, quality.neighbor_iface));
                    if quality.neighbor_iface == neighbor.main_addr {
                        main_covered = true;
                    }
                }
                if state.main_address_of(quality.local_iface) == neighbor.main_addr {
                    etx_reverse = etx_reverse.saturating_mul(quality.etx);
                }
            }

            let Some((local_iface, neighbor_iface)) = chosen else {
                continue;
            };
            let etx = etx_forward.saturating_mul(etx_reverse);
            table.insert(RouteEntry {
                destination: neighbor_iface,
                next_hop: neighbor_iface,
                local_iface,
                distance: 1,
                etx,
            });
            if !main_covered {
                table.insert(RouteEntry {
                    destination: neighbor.main_addr,
                    next_hop: neighbor_iface,
                    local_iface,
                    distance: 1,
                    etx,
                });
            }
        }

        // 2-hop neighbors through willing anchors.
        for tuple in state.two_hop_neighbors() {
            if tuple.two_hop_main == main_address {
                continue;
            }
            if state.find_sym_neighbor(tuple.two_hop_main).is_some() {
                continue;
            }
            let anchor_ok = state
                .neighbors()
                .iter()
                .any(|n| n.main_addr == tuple.neighbor_main && n.willingness != Willingness::NEVER);
            if !anchor_ok {
                continue;
            }
            let Some(via) = table.lookup(tuple.neighbor_main).cloned() else {
                continue;
            };

            // Edge cost if we happen to know the far link's quality;
            // unknown edges contribute no penalty.
            let mut edge: u32 = 1;
            for quality in state.link_quality_set() {
                let local_main = state.main_address_of(quality.local_iface);
                let neighbor_main = state.main_address_of(quality.neighbor_iface);
                if (local_main == tuple.two_hop_main && neighbor_main == tuple.neighbor_main)
                    || (local_main == tuple.neighbor_main && neighbor_main == tuple.two_hop_main)
                {
                    edge = edge.saturating_mul(quality.etx);
                }
            }

            table.insert(RouteEntry {
                destination: tuple.two_hop_main,
                next_hop: via.next_hop,
                local_iface: via.local_iface,
                distance: 2,
                etx: via.etx.saturating_add(edge.min(ETX_SATURATION * ETX_SATURATION)),
            });
        }

        // Topology relaxation to fixed point. Terminates because every
        // edge costs at least 1 and routes only ever improve.
        let mut edges: BTreeMap<Ipv4Addr, Vec<(Ipv4Addr, u32)>> = BTreeMap::new();
        for tuple in state.topology_set() {
            edges.entry(tuple.dest).or_default().push((tuple.last, tuple.etx.max(1)));
        }
        let mut changed = true;
        while changed {
            changed = false;
            for (dest, incoming) in &edges {
                if *dest == main_address {
                    continue;
                }
                for (last, edge_cost) in incoming {
                    let Some(via) = table.lookup(*last).cloned() else {
                        continue;
                    };
                    let candidate = via.etx.saturating_add(*edge_cost);
                    let better = match table.lookup(*dest) {
                        None => true,
                        Some(current) => current.etx > candidate,
                    };
                    if better {
                        table.insert(RouteEntry {
                            destination: *dest,
                            next_hop: via.next_hop,
                            local_iface: via.local_iface,
                            distance: via.distance + 1,
                            etx: candidate,
                        });
                        changed = true;
                    }
                }
            }
        }

        // Clone routes for known interface aliases of routed mains.
        let clones: Vec<RouteEntry> = state
            .iface_assoc_set()
            .iter()
            .filter(|assoc| table.lookup(assoc.iface).is_none())
            .filter_map(|assoc| {
                table.lookup(assoc.main).map(|entry| RouteEntry {
                    destination: assoc.iface,
                    ..entry.clone()
                })
            })
            .collect();
        for entry in clones {
            table.insert(entry);
        }

        // HNA network routes through routed gateways, best gateway per
        // network, skipping networks we announce ourselves.
        for assoc in state.association_set() {
            let local = state
                .local_associations()
                .iter()
                .any(|a| a.network == assoc.network && a.netmask == assoc.netmask);
            if local {
                continue;
            }
            let Some(gateway) = table.lookup(assoc.gateway) else {
                continue;
            };
            let candidate = NetworkRoute {
                network: assoc.network,
                netmask: assoc.netmask,
                next_hop: gateway.next_hop,
                local_iface: gateway.local_iface,
                distance: gateway.distance,
            };
            let position = table
                .network
                .iter()
                .position(|r| r.network == assoc.network && r.netmask == assoc.netmask);
            match position {
                Some(index) if table.network[index].distance > candidate.distance => {
                    table.network[index] = candidate;
                }
                Some(_) => {}
                None => table.network.push(candidate),
            }
        }
    }

    let size = table.len();
    log::trace!("olsr({}): routing table rebuilt\n{}", main_address, table);
    engine.routes = Arc::new(table);
    if let Some(observer) = &engine.observer {
        observer.table_changed(size);
    }
}

impl Engine {
    /// Route lookup for locally originated traffic.
    pub fn route_output(
        &self,
        destination: Ipv4Addr,
        oif: Option<u32>,
    ) -> Result<(Ipv4Addr, Ipv4Addr, InterfaceAddr), EngineError> {
        if let Some(entry) = self.routes.resolve(destination) {
            let iface = self
                .iface_by_addr(entry.local_iface)
                .ok_or(EngineError::NoRouteToHost(destination))?;
            if oif.is_some_and(|index| index != iface.index) {
                return Err(EngineError::NoRouteToHost(destination));
            }
            return Ok((entry.next_hop, iface.address, iface));
        }

        if let Some(route) = self.routes.lookup_network(destination) {
            let iface = self
                .iface_by_addr(route.local_iface)
                .ok_or(EngineError::NoRouteToHost(destination))?;
            if oif.is_some_and(|index| index != iface.index) {
                return Err(EngineError::NoRouteToHost(destination));
            }
            return Ok((route.next_hop, iface.address, iface));
        }

        Err(EngineError::NoRouteToHost(destination))
    }

    /// Forwarding decision for traffic arriving from the network.
    pub fn route_input(
        &self,
        source: Ipv4Addr,
        destination: Ipv4Addr,
        _ingress: Ipv4Addr,
    ) -> ForwardDecision {
        if self.is_own_address(source) || source == self.main_address {
            return ForwardDecision::Consumed;
        }
        if self.is_own_address(destination) || destination == self.main_address {
            return ForwardDecision::Deliver;
        }

        if let Some(entry) = self.routes.resolve(destination) {
            if let Some(iface) = self.iface_by_addr(entry.local_iface) {
                return ForwardDecision::Forward {
                    next_hop: entry.next_hop,
                    local_iface: entry.local_iface,
                    source: iface.address,
                };
            }
        }
        if let Some(route) = self.routes.lookup_network(destination) {
            if let Some(iface) = self.iface_by_addr(route.local_iface) {
                return ForwardDecision::Forward {
                    next_hop: route.next_hop,
                    local_iface: route.local_iface,
                    source: iface.address,
                };
            }
        }
        ForwardDecision::NoRoute
    }
}
