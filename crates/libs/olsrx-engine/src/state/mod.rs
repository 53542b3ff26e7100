//! The tuple repository: authoritative store of all protocol relations.
//!
//! Every set offers find / insert-or-update / erase plus an iterable
//! snapshot. Lifetimes are owned by the expiry handlers in the engine;
//! nothing in here consults the clock except the symmetric-link lookups
//! that take `now` explicitly.

pub mod tuples;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::time::Timestamp;

pub use tuples::{
    Association, AssociationTuple, DuplicateTuple, IfaceAssocTuple, LinkQualityTuple, LinkTuple,
    MprSelectorTuple, NeighborStatus, NeighborTuple, TopologyTuple, TwoHopTuple,
};

#[derive(Default)]
pub struct State {
    links: Vec<LinkTuple>,
    link_quality: Vec<LinkQualityTuple>,
    neighbors: Vec<NeighborTuple>,
    two_hop: Vec<TwoHopTuple>,
    mpr_set: BTreeSet<Ipv4Addr>,
    mpr_selectors: Vec<MprSelectorTuple>,
    topology: Vec<TopologyTuple>,
    duplicates: Vec<DuplicateTuple>,
    iface_assoc: Vec<IfaceAssocTuple>,
    associations: Vec<AssociationTuple>,
    local_associations: Vec<Association>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical (main) address for an interface address; falls back to
    /// the input when no association is known.
    pub fn main_address_of(&self, iface: Ipv4Addr) -> Ipv4Addr {
        self.iface_assoc
            .iter()
            .find(|tuple| tuple.iface == iface)
            .map(|tuple| tuple.main)
            .unwrap_or(iface)
    }

    // ---- link set -------------------------------------------------------

    pub fn links(&self) -> &[LinkTuple] {
        &self.links
    }

    pub fn find_link(&self, neighbor_iface: Ipv4Addr) -> Option<&LinkTuple> {
        self.links.iter().find(|t| t.neighbor_iface == neighbor_iface)
    }

    pub fn find_link_mut(&mut self, neighbor_iface: Ipv4Addr) -> Option<&mut LinkTuple> {
        self.links.iter_mut().find(|t| t.neighbor_iface == neighbor_iface)
    }

    pub fn find_sym_link(&self, neighbor_iface: Ipv4Addr, now: Timestamp) -> Option<&LinkTuple> {
        self.links.iter().find(|t| t.neighbor_iface == neighbor_iface && t.is_symmetric(now))
    }

    pub fn insert_link(&mut self, tuple: LinkTuple) -> &mut LinkTuple {
        self.links.push(tuple);
        self.links.last_mut().expect("just pushed")
    }

    pub fn erase_link(&mut self, neighbor_iface: Ipv4Addr) {
        self.links.retain(|t| t.neighbor_iface != neighbor_iface);
    }

    /// Whether any unexpired link leads to the given main address.
    pub fn has_live_link_to(&self, main: Ipv4Addr, now: Timestamp) -> bool {
        self.links
            .iter()
            .any(|t| self.main_address_of(t.neighbor_iface) == main && t.expiry >= now)
    }

    /// Whether any symmetric link leads to the given main address.
    pub fn has_sym_link_to(&self, main: Ipv4Addr, now: Timestamp) -> bool {
        self.links
            .iter()
            .any(|t| self.main_address_of(t.neighbor_iface) == main && t.is_symmetric(now))
    }

    // ---- link-quality set ----------------------------------------------

    pub fn link_quality_set(&self) -> &[LinkQualityTuple] {
        &self.link_quality
    }

    pub fn find_quality(&self, local: Ipv4Addr, neighbor: Ipv4Addr) -> Option<&LinkQualityTuple> {
        self.link_quality
            .iter()
            .find(|t| t.local_iface == local && t.neighbor_iface == neighbor)
    }

    pub fn find_quality_mut(
        &mut self,
        local: Ipv4Addr,
        neighbor: Ipv4Addr,
    ) -> Option<&mut LinkQualityTuple> {
        self.link_quality
            .iter_mut()
            .find(|t| t.local_iface == local && t.neighbor_iface == neighbor)
    }

    pub fn insert_quality(&mut self, tuple: LinkQualityTuple) -> &mut LinkQualityTuple {
        self.link_quality.push(tuple);
        self.link_quality.last_mut().expect("just pushed")
    }

    pub fn erase_quality(&mut self, local: Ipv4Addr, neighbor: Ipv4Addr) {
        self.link_quality
            .retain(|t| !(t.local_iface == local && t.neighbor_iface == neighbor));
    }

    // ---- neighbor set ---------------------------------------------------

    pub fn neighbors(&self) -> &[NeighborTuple] {
        &self.neighbors
    }

    pub fn find_neighbor(&self, main: Ipv4Addr) -> Option<&NeighborTuple> {
        self.neighbors.iter().find(|t| t.main_addr == main)
    }

    pub fn find_neighbor_mut(&mut self, main: Ipv4Addr) -> Option<&mut NeighborTuple> {
        self.neighbors.iter_mut().find(|t| t.main_addr == main)
    }

    pub fn find_sym_neighbor(&self, main: Ipv4Addr) -> Option<&NeighborTuple> {
        self.neighbors
            .iter()
            .find(|t| t.main_addr == main && t.status == NeighborStatus::Sym)
    }

    pub fn insert_or_update_neighbor(&mut self, tuple: NeighborTuple) -> &mut NeighborTuple {
        if let Some(index) = self.neighbors.iter().position(|t| t.main_addr == tuple.main_addr) {
            self.neighbors[index] = tuple;
            &mut self.neighbors[index]
        } else {
            self.neighbors.push(tuple);
            self.neighbors.last_mut().expect("just pushed")
        }
    }

    pub fn erase_neighbor(&mut self, main: Ipv4Addr) {
        self.neighbors.retain(|t| t.main_addr != main);
    }

    /// Re-canonicalize neighbor main addresses after new MID knowledge.
    pub fn remap_neighbor_mains(&mut self) {
        let remapped: Vec<Ipv4Addr> =
            self.neighbors.iter().map(|t| self.main_address_of(t.main_addr)).collect();
        for (tuple, main) in self.neighbors.iter_mut().zip(remapped) {
            tuple.main_addr = main;
        }

        let remapped: Vec<(Ipv4Addr, Ipv4Addr)> = self
            .two_hop
            .iter()
            .map(|t| (self.main_address_of(t.neighbor_main), self.main_address_of(t.two_hop_main)))
            .collect();
        for (tuple, (n, x)) in self.two_hop.iter_mut().zip(remapped) {
            tuple.neighbor_main = n;
            tuple.two_hop_main = x;
        }
    }

    // ---- 2-hop set ------------------------------------------------------

    pub fn two_hop_neighbors(&self) -> &[TwoHopTuple] {
        &self.two_hop
    }

    pub fn find_two_hop_mut(
        &mut self,
        neighbor_main: Ipv4Addr,
        two_hop_main: Ipv4Addr,
    ) -> Option<&mut TwoHopTuple> {
        self.two_hop
            .iter_mut()
            .find(|t| t.neighbor_main == neighbor_main && t.two_hop_main == two_hop_main)
    }

    pub fn insert_two_hop(&mut self, tuple: TwoHopTuple) {
        self.two_hop.push(tuple);
    }

    pub fn erase_two_hop_pair(&mut self, neighbor_main: Ipv4Addr, two_hop_main: Ipv4Addr) {
        self.two_hop
            .retain(|t| !(t.neighbor_main == neighbor_main && t.two_hop_main == two_hop_main));
    }

    pub fn erase_two_hop_of(&mut self, neighbor_main: Ipv4Addr) {
        self.two_hop.retain(|t| t.neighbor_main != neighbor_main);
    }

    // ---- MPR set --------------------------------------------------------

    pub fn mpr_set(&self) -> &BTreeSet<Ipv4Addr> {
        &self.mpr_set
    }

    pub fn is_mpr(&self, main: Ipv4Addr) -> bool {
        self.mpr_set.contains(&main)
    }

    /// Replace the MPR set wholesale; returns whether it changed.
    pub fn set_mpr_set(&mut self, set: BTreeSet<Ipv4Addr>) -> bool {
        let changed = self.mpr_set != set;
        self.mpr_set = set;
        changed
    }

    // ---- MPR-selector set ----------------------------------------------

    pub fn mpr_selectors(&self) -> &[MprSelectorTuple] {
        &self.mpr_selectors
    }

    pub fn find_mpr_selector_mut(&mut self, main: Ipv4Addr) -> Option<&mut MprSelectorTuple> {
        self.mpr_selectors.iter_mut().find(|t| t.main_addr == main)
    }

    pub fn insert_mpr_selector(&mut self, tuple: MprSelectorTuple) {
        self.mpr_selectors.push(tuple);
    }

    pub fn erase_mpr_selector(&mut self, main: Ipv4Addr) -> bool {
        let before = self.mpr_selectors.len();
        self.mpr_selectors.retain(|t| t.main_addr != main);
        self.mpr_selectors.len() != before
    }

    // ---- topology set ---------------------------------------------------

    pub fn topology_set(&self) -> &[TopologyTuple] {
        &self.topology
    }

    pub fn find_topology_mut(
        &mut self,
        dest: Ipv4Addr,
        last: Ipv4Addr,
    ) -> Option<&mut TopologyTuple> {
        self.topology.iter_mut().find(|t| t.dest == dest && t.last == last)
    }

    pub fn has_newer_topology(&self, last: Ipv4Addr, ansn: u16) -> bool {
        self.topology.iter().any(|t| t.last == last && t.seq > ansn)
    }

    pub fn erase_older_topology(&mut self, last: Ipv4Addr, ansn: u16) {
        self.topology.retain(|t| !(t.last == last && t.seq < ansn));
    }

    pub fn insert_topology(&mut self, tuple: TopologyTuple) {
        self.topology.push(tuple);
    }

    pub fn erase_topology(&mut self, dest: Ipv4Addr, last: Ipv4Addr) {
        self.topology.retain(|t| !(t.dest == dest && t.last == last));
    }

    // ---- duplicate set --------------------------------------------------

    pub fn find_duplicate(&self, originator: Ipv4Addr, seq: u16) -> Option<&DuplicateTuple> {
        self.duplicates.iter().find(|t| t.originator == originator && t.seq == seq)
    }

    pub fn find_duplicate_mut(
        &mut self,
        originator: Ipv4Addr,
        seq: u16,
    ) -> Option<&mut DuplicateTuple> {
        self.duplicates.iter_mut().find(|t| t.originator == originator && t.seq == seq)
    }

    pub fn insert_duplicate(&mut self, tuple: DuplicateTuple) {
        self.duplicates.push(tuple);
    }

    pub fn erase_duplicate(&mut self, originator: Ipv4Addr, seq: u16) {
        self.duplicates.retain(|t| !(t.originator == originator && t.seq == seq));
    }

    // ---- interface associations ----------------------------------------

    pub fn iface_assoc_set(&self) -> &[IfaceAssocTuple] {
        &self.iface_assoc
    }

    pub fn find_iface_assoc_mut(
        &mut self,
        iface: Ipv4Addr,
        main: Ipv4Addr,
    ) -> Option<&mut IfaceAssocTuple> {
        self.iface_assoc.iter_mut().find(|t| t.iface == iface && t.main == main)
    }

    pub fn insert_iface_assoc(&mut self, tuple: IfaceAssocTuple) {
        self.iface_assoc.push(tuple);
    }

    /// Remove an expiring association; permanent (own-interface) entries
    /// are never erased.
    pub fn erase_iface_assoc(&mut self, iface: Ipv4Addr) {
        self.iface_assoc.retain(|t| !(t.iface == iface && t.expiry.is_some()));
    }

    // ---- HNA associations ----------------------------------------------

    pub fn association_set(&self) -> &[AssociationTuple] {
        &self.associations
    }

    pub fn find_association_mut(
        &mut self,
        gateway: Ipv4Addr,
        network: Ipv4Addr,
        netmask: Ipv4Addr,
    ) -> Option<&mut AssociationTuple> {
        self.associations
            .iter_mut()
            .find(|t| t.gateway == gateway && t.network == network && t.netmask == netmask)
    }

    pub fn insert_association(&mut self, tuple: AssociationTuple) {
        self.associations.push(tuple);
    }

    pub fn erase_association(&mut self, gateway: Ipv4Addr, network: Ipv4Addr, netmask: Ipv4Addr) {
        self.associations
            .retain(|t| !(t.gateway == gateway && t.network == network && t.netmask == netmask));
    }

    pub fn local_associations(&self) -> &[Association] {
        &self.local_associations
    }

    /// Record a local announcement; returns false when already present.
    pub fn add_local_association(&mut self, association: Association) -> bool {
        if self.local_associations.contains(&association) {
            return false;
        }
        self.local_associations.push(association);
        true
    }

    pub fn remove_local_association(&mut self, association: Association) {
        self.local_associations.retain(|a| a != &association);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 0, 0, last)
    }

    #[test]
    fn main_address_falls_back_to_the_interface_itself() {
        let mut state = State::new();
        assert_eq!(state.main_address_of(addr(7)), addr(7));

        state.insert_iface_assoc(IfaceAssocTuple { iface: addr(7), main: addr(1), expiry: None });
        assert_eq!(state.main_address_of(addr(7)), addr(1));
    }

    #[test]
    fn sym_link_lookup_honors_expiry() {
        let mut state = State::new();
        let now = Timestamp::from_millis(1_000);
        state.insert_link(LinkTuple {
            local_iface: addr(1),
            neighbor_iface: addr(2),
            sym_expiry: now - std::time::Duration::from_millis(1),
            asym_expiry: now + std::time::Duration::from_secs(2),
            expiry: now + std::time::Duration::from_secs(2),
            etx: 1,
        });

        assert!(state.find_link(addr(2)).is_some());
        assert!(state.find_sym_link(addr(2), now).is_none());

        state.find_link_mut(addr(2)).expect("link").sym_expiry =
            now + std::time::Duration::from_secs(1);
        assert!(state.find_sym_link(addr(2), now).is_some());
        assert!(state.has_sym_link_to(addr(2), now));
    }

    #[test]
    fn permanent_iface_associations_survive_erase() {
        let mut state = State::new();
        state.insert_iface_assoc(IfaceAssocTuple { iface: addr(5), main: addr(1), expiry: None });
        state.insert_iface_assoc(IfaceAssocTuple {
            iface: addr(6),
            main: addr(2),
            expiry: Some(Timestamp::from_millis(5)),
        });

        state.erase_iface_assoc(addr(5));
        state.erase_iface_assoc(addr(6));
        assert_eq!(state.main_address_of(addr(5)), addr(1));
        assert_eq!(state.main_address_of(addr(6)), addr(6));
    }

    #[test]
    fn mpr_set_replacement_reports_change() {
        let mut state = State::new();
        let mut set = BTreeSet::new();
        set.insert(addr(2));
        assert!(state.set_mpr_set(set.clone()));
        assert!(!state.set_mpr_set(set));
        assert!(state.is_mpr(addr(2)));
    }

    #[test]
    fn mid_knowledge_remaps_neighbor_and_two_hop_mains() {
        let mut state = State::new();
        state.insert_or_update_neighbor(NeighborTuple {
            main_addr: addr(20),
            status: NeighborStatus::Sym,
            willingness: olsrx_wire::Willingness::DEFAULT,
        });
        state.insert_two_hop(TwoHopTuple {
            neighbor_main: addr(20),
            two_hop_main: addr(30),
            expiry: Timestamp::ZERO,
        });
        state.insert_iface_assoc(IfaceAssocTuple { iface: addr(20), main: addr(2), expiry: None });

        state.remap_neighbor_mains();
        assert!(state.find_neighbor(addr(2)).is_some());
        assert_eq!(state.two_hop_neighbors()[0].neighbor_main, addr(2));
        assert_eq!(state.two_hop_neighbors()[0].two_hop_main, addr(30));
    }
}
