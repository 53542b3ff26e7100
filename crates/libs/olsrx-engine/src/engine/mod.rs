//! The routing engine proper.
//!
//! One [`Engine`] instance runs the protocol for one node: it owns the
//! tuple repository, the event queue and the outbound message queue, and
//! talks to the outside world through the handles in [`crate::node`].
//! Everything is driven by two entry points, `handle_datagram` for
//! received control traffic and `run_due` for timer work.

pub(crate) mod emit;
pub(crate) mod mpr;
pub mod routes;
pub(crate) mod sensing;
pub(crate) mod topology;

use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use olsrx_wire::{Body, Message, MessageKind, Packet, WireError};

use crate::config::Config;
use crate::error::EngineError;
use crate::node::{DatagramSink, EngineObserver, InterfaceAddr, Ipv4Provider, MobilityOracle};
use crate::state::{Association, IfaceAssocTuple, State};
use crate::time::{Scheduler, Timestamp};

use routes::{RouteTable, StaticRoute};

/// Timer events; each carries the repository key it re-checks, never a
/// borrow of the tuple itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Hello,
    Tc,
    Mid,
    Hna,
    FlushQueue,
    LinkExpiry(Ipv4Addr),
    LinkQualityExpiry(Ipv4Addr, Ipv4Addr),
    TwoHopExpiry(Ipv4Addr, Ipv4Addr),
    MprSelectorExpiry(Ipv4Addr),
    TopologyExpiry(Ipv4Addr, Ipv4Addr),
    DuplicateExpiry(Ipv4Addr, u16),
    IfaceAssocExpiry(Ipv4Addr),
    AssociationExpiry(Ipv4Addr, Ipv4Addr, Ipv4Addr),
}

pub struct Engine {
    pub(crate) config: Config,
    pub(crate) sink: Arc<dyn DatagramSink>,
    pub(crate) mobility: Arc<dyn MobilityOracle>,
    pub(crate) observer: Option<Arc<dyn EngineObserver>>,
    ipv4: Arc<dyn Ipv4Provider>,

    pub(crate) main_address: Ipv4Addr,
    pub(crate) interfaces: Vec<InterfaceAddr>,
    pub(crate) state: State,
    pub(crate) routes: Arc<RouteTable>,
    pub(crate) timers: Scheduler<Event>,

    pub(crate) queued: Vec<Message>,
    pub(crate) flush_pending: bool,

    packet_seq: u16,
    message_seq: u16,
    pub(crate) ansn: u16,

    /// (timestamp, neighbor iface) events feeding the churn statistic.
    pub(crate) gained: Vec<(Timestamp, Ipv4Addr)>,
    pub(crate) lost: Vec<(Timestamp, Ipv4Addr)>,

    pub(crate) rng: StdRng,
    table_association: Vec<StaticRoute>,
    started: bool,
}

impl Engine {
    pub fn new(
        config: Config,
        ipv4: Arc<dyn Ipv4Provider>,
        sink: Arc<dyn DatagramSink>,
        mobility: Arc<dyn MobilityOracle>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.jitter_seed);
        Self {
            config,
            sink,
            mobility,
            observer: None,
            ipv4,
            main_address: Ipv4Addr::UNSPECIFIED,
            interfaces: Vec::new(),
            state: State::new(),
            routes: Arc::new(RouteTable::new()),
            timers: Scheduler::new(),
            queued: Vec::new(),
            flush_pending: false,
            packet_seq: u16::MAX,
            message_seq: u16::MAX,
            ansn: u16::MAX,
            gained: Vec::new(),
            lost: Vec::new(),
            rng,
            table_association: Vec::new(),
            started: false,
        }
    }

    pub fn set_observer(&mut self, observer: Arc<dyn EngineObserver>) {
        self.observer = Some(observer);
    }

    /// Bring the engine up: pick the main address, seed permanent
    /// interface associations, open sockets and kick off the periodic
    /// emissions.
    pub fn start(&mut self, now: Timestamp) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }

        let all = self.ipv4.interfaces();
        let main = all.first().ok_or(EngineError::NoInterfaces)?.address;
        self.main_address = main;

        self.interfaces = all
            .iter()
            .copied()
            .filter(|iface| !self.config.interface_exclusions.contains(&iface.index))
            .collect();
        if self.interfaces.is_empty() {
            return Err(EngineError::NoInterfaces);
        }

        // Permanent associations so main_address_of() canonicalizes our
        // own secondary interfaces.
        for iface in &all {
            if iface.address != main {
                self.state.insert_iface_assoc(IfaceAssocTuple {
                    iface: iface.address,
                    main,
                    expiry: None,
                });
            }
        }

        for iface in &self.interfaces.clone() {
            self.sink.bind(iface)?;
        }

        self.started = true;
        log::info!("olsr({}): started on {} interface(s)", main, self.interfaces.len());

        self.fire(now, Event::Hello);
        self.fire(now, Event::Tc);
        self.fire(now, Event::Mid);
        self.fire(now, Event::Hna);
        Ok(())
    }

    /// Ingest one received control datagram.
    pub fn handle_datagram(
        &mut self,
        now: Timestamp,
        local_iface: Ipv4Addr,
        sender: Ipv4Addr,
        bytes: &[u8],
    ) {
        if self.iface_by_addr(local_iface).is_none() {
            return;
        }
        if self.is_own_address(sender) {
            log::trace!("olsr({}): ignoring own packet", self.main_address);
            return;
        }

        let (_, reader) = match Packet::read(bytes) {
            Ok(parts) => parts,
            Err(err) => {
                log::warn!("olsr({}): undecodable packet from {}: {}", self.main_address, sender, err);
                return;
            }
        };

        if let Some(observer) = &self.observer {
            observer.packet_received(local_iface, sender, bytes.len());
        }

        let messages: Vec<Result<Message, WireError>> = reader.collect();
        for item in messages {
            match item {
                Ok(message) => self.process_message(now, message, local_iface, sender),
                Err(WireError::UnknownMessageType(kind)) => {
                    log::debug!("olsr({}): skipping message type {}", self.main_address, kind);
                }
                Err(err) => {
                    log::warn!("olsr({}): dropping malformed message: {}", self.main_address, err);
                }
            }
        }

        // One recomputation per ingested packet, whatever it touched.
        routes::compute(self, now);
    }

    fn process_message(
        &mut self,
        now: Timestamp,
        message: Message,
        local_iface: Ipv4Addr,
        sender: Ipv4Addr,
    ) {
        if message.ttl == 0 || message.originator == self.main_address {
            return;
        }

        let seen = self
            .state
            .find_duplicate(message.originator, message.seq)
            .map(|dup| dup.ifaces.contains(&local_iface));

        if seen.is_none() {
            match &message.body {
                Body::Hello(hello) => {
                    sensing::process_hello(self, now, &message, hello, local_iface, sender);
                    emit::send_hello_ack(self, now, sender);
                }
                Body::HelloAck(ack) => {
                    sensing::process_hello_ack(self, now, &message, *ack, local_iface, sender);
                }
                Body::Tc(tc) => topology::process_tc(self, now, &message, tc, sender),
                Body::Mid(mid) => topology::process_mid(self, now, &message, mid, sender),
                Body::Hna(hna) => topology::process_hna(self, now, &message, hna, sender),
            }
        } else {
            log::debug!(
                "olsr({}): duplicate message from {} seq {}",
                self.main_address,
                message.originator,
                message.seq
            );
        }

        let reconsider = !seen.unwrap_or(false);
        let kind = message.kind();
        if reconsider && kind != MessageKind::Hello && kind != MessageKind::HelloAck {
            topology::forward_default(self, now, message, local_iface, sender);
        }
    }

    /// Earliest pending timer deadline.
    pub fn next_wakeup(&mut self) -> Option<Timestamp> {
        self.timers.next_deadline()
    }

    /// Run every timer due at or before `now`.
    pub fn run_due(&mut self, now: Timestamp) {
        while let Some(event) = self.timers.pop_due(now) {
            self.fire(now, event);
        }
    }

    fn fire(&mut self, now: Timestamp, event: Event) {
        match event {
            Event::Hello => {
                emit::send_hello(self, now);
                let next = now + self.config.hello_interval;
                self.timers.schedule(next, Event::Hello);
            }
            Event::Tc => {
                if self.state.mpr_selectors().is_empty() {
                    log::debug!("olsr({}): no MPR selectors, skipping TC", self.main_address);
                } else {
                    emit::send_tc(self, now);
                }
                let next = now + self.config.tc_interval;
                self.timers.schedule(next, Event::Tc);
            }
            Event::Mid => {
                if self.interfaces.len() >= 2 {
                    emit::send_mid(self, now);
                }
                let next = now + self.config.mid_interval;
                self.timers.schedule(next, Event::Mid);
            }
            Event::Hna => {
                if self.state.local_associations().is_empty() {
                    log::debug!("olsr({}): no associations, skipping HNA", self.main_address);
                } else {
                    emit::send_hna(self, now);
                }
                let next = now + self.config.hna_interval;
                self.timers.schedule(next, Event::Hna);
            }
            Event::FlushQueue => emit::flush_queue(self, now),
            Event::LinkExpiry(neighbor_iface) => {
                sensing::link_expiry_check(self, now, neighbor_iface);
            }
            Event::LinkQualityExpiry(local, neighbor) => {
                sensing::quality_expiry_check(self, now, local, neighbor);
            }
            Event::TwoHopExpiry(neighbor_main, two_hop_main) => {
                let expiry = self
                    .state
                    .find_two_hop_mut(neighbor_main, two_hop_main)
                    .map(|tuple| tuple.expiry);
                match expiry {
                    Some(expiry) if expiry < now => {
                        self.state.erase_two_hop_pair(neighbor_main, two_hop_main);
                        routes::compute(self, now);
                    }
                    Some(expiry) => {
                        self.schedule_expiry(expiry, Event::TwoHopExpiry(neighbor_main, two_hop_main));
                    }
                    None => {}
                }
            }
            Event::MprSelectorExpiry(main) => {
                let expiry = self.state.find_mpr_selector_mut(main).map(|tuple| tuple.expiry);
                match expiry {
                    Some(expiry) if expiry < now => {
                        if self.state.erase_mpr_selector(main) {
                            self.increment_ansn();
                        }
                    }
                    Some(expiry) => {
                        self.schedule_expiry(expiry, Event::MprSelectorExpiry(main));
                    }
                    None => {}
                }
            }
            Event::TopologyExpiry(dest, last) => {
                let expiry = self.state.find_topology_mut(dest, last).map(|tuple| tuple.expiry);
                match expiry {
                    Some(expiry) if expiry < now => {
                        self.state.erase_topology(dest, last);
                        routes::compute(self, now);
                    }
                    Some(expiry) => {
                        self.schedule_expiry(expiry, Event::TopologyExpiry(dest, last));
                    }
                    None => {}
                }
            }
            Event::DuplicateExpiry(originator, seq) => {
                let expiry = self.state.find_duplicate_mut(originator, seq).map(|t| t.expiry);
                match expiry {
                    Some(expiry) if expiry < now => self.state.erase_duplicate(originator, seq),
                    Some(expiry) => {
                        self.schedule_expiry(expiry, Event::DuplicateExpiry(originator, seq));
                    }
                    None => {}
                }
            }
            Event::IfaceAssocExpiry(iface) => {
                let expiry = self
                    .state
                    .iface_assoc_set()
                    .iter()
                    .find(|t| t.iface == iface && t.expiry.is_some())
                    .and_then(|t| t.expiry);
                match expiry {
                    Some(expiry) if expiry < now => {
                        self.state.erase_iface_assoc(iface);
                        routes::compute(self, now);
                    }
                    Some(expiry) => {
                        self.schedule_expiry(expiry, Event::IfaceAssocExpiry(iface));
                    }
                    None => {}
                }
            }
            Event::AssociationExpiry(gateway, network, netmask) => {
                let expiry =
                    self.state.find_association_mut(gateway, network, netmask).map(|t| t.expiry);
                match expiry {
                    Some(expiry) if expiry < now => {
                        self.state.erase_association(gateway, network, netmask);
                        routes::compute(self, now);
                    }
                    Some(expiry) => {
                        self.schedule_expiry(expiry, Event::AssociationExpiry(gateway, network, netmask));
                    }
                    None => {}
                }
            }
        }
    }

    // ---- local HNA surface ---------------------------------------------

    pub fn add_host_network_association(&mut self, network: Ipv4Addr, netmask: Ipv4Addr) {
        if self.state.add_local_association(Association { network, netmask }) {
            log::info!("olsr({}): announcing {}/{}", self.main_address, network, netmask);
        }
    }

    pub fn remove_host_network_association(&mut self, network: Ipv4Addr, netmask: Ipv4Addr) {
        self.state.remove_local_association(Association { network, netmask });
    }

    /// Adopt the non-OLSR routes of a static table as HNA announcements,
    /// replacing whatever a previous table contributed.
    pub fn set_routing_table_association(&mut self, table: Vec<StaticRoute>) {
        let old = std::mem::replace(&mut self.table_association, table);
        for route in old {
            if self.uses_non_olsr_interface(&route) {
                self.remove_host_network_association(route.network, route.netmask);
            }
        }
        for route in self.table_association.clone() {
            if self.uses_non_olsr_interface(&route) {
                self.add_host_network_association(route.network, route.netmask);
            }
        }
    }

    fn uses_non_olsr_interface(&self, route: &StaticRoute) -> bool {
        self.config.interface_exclusions.contains(&route.interface_index)
    }

    // ---- read-only surface ---------------------------------------------

    pub fn main_address(&self) -> Ipv4Addr {
        self.main_address
    }

    pub fn interfaces(&self) -> &[InterfaceAddr] {
        &self.interfaces
    }

    /// Snapshot of the current routing table. The `Arc` is swapped on
    /// every recomputation, so holders keep a consistent view.
    pub fn routes(&self) -> Arc<RouteTable> {
        Arc::clone(&self.routes)
    }

    pub fn neighbors(&self) -> &[crate::state::NeighborTuple] {
        self.state.neighbors()
    }

    pub fn links(&self) -> &[crate::state::LinkTuple] {
        self.state.links()
    }

    pub fn link_qualities(&self) -> &[crate::state::LinkQualityTuple] {
        self.state.link_quality_set()
    }

    pub fn two_hop_neighbors(&self) -> &[crate::state::TwoHopTuple] {
        self.state.two_hop_neighbors()
    }

    pub fn mpr_set(&self) -> &std::collections::BTreeSet<Ipv4Addr> {
        self.state.mpr_set()
    }

    pub fn mpr_selectors(&self) -> &[crate::state::MprSelectorTuple] {
        self.state.mpr_selectors()
    }

    pub fn topology_set(&self) -> &[crate::state::TopologyTuple] {
        self.state.topology_set()
    }

    /// Neighbor (gained, lost) event counts within the churn window.
    pub fn neighbor_churn(&self, now: Timestamp) -> (usize, usize) {
        let horizon = now - self.config.churn_window();
        let gained = self.gained.iter().filter(|(at, _)| *at >= horizon).count();
        let lost = self.lost.iter().filter(|(at, _)| *at >= horizon).count();
        (gained, lost)
    }

    // ---- internals shared with the sibling modules ---------------------

    pub(crate) fn iface_by_addr(&self, address: Ipv4Addr) -> Option<InterfaceAddr> {
        self.interfaces.iter().copied().find(|iface| iface.address == address)
    }

    pub(crate) fn is_own_address(&self, address: Ipv4Addr) -> bool {
        self.interfaces.iter().any(|iface| iface.address == address)
    }

    pub(crate) fn next_packet_seq(&mut self) -> u16 {
        self.packet_seq = self.packet_seq.wrapping_add(1);
        self.packet_seq
    }

    pub(crate) fn next_message_seq(&mut self) -> u16 {
        self.message_seq = self.message_seq.wrapping_add(1);
        self.message_seq
    }

    pub(crate) fn increment_ansn(&mut self) {
        self.ansn = self.ansn.wrapping_add(1);
    }

    pub(crate) fn jitter(&mut self) -> Duration {
        let max = self.config.max_jitter().as_secs_f64();
        Duration::from_secs_f64(self.rng.gen::<f64>() * max)
    }

    /// Schedule an expiry re-check strictly after its deadline, so a
    /// handler firing exactly at the deadline cannot observe the tuple
    /// as still valid and re-arm itself for the same instant.
    pub(crate) fn schedule_expiry(&mut self, deadline: Timestamp, event: Event) {
        self.timers.schedule(deadline + Duration::from_micros(1), event);
    }
}
