//! TC/MID/HNA ingestion and the default MPR forwarding rule.

use std::net::Ipv4Addr;

use olsrx_wire::{Hna, Message, Mid, Tc};

use crate::state::{AssociationTuple, DuplicateTuple, IfaceAssocTuple, TopologyTuple};
use crate::time::Timestamp;

use super::{Engine, Event};

pub(crate) fn process_tc(
    engine: &mut Engine,
    now: Timestamp,
    message: &Message,
    tc: &Tc,
    sender: Ipv4Addr,
) {
    // Only accept topology from the symmetric neighborhood.
    if engine.state.find_sym_link(sender, now).is_none() {
        return;
    }

    if engine.state.has_newer_topology(message.originator, tc.ansn) {
        log::debug!(
            "olsr({}): stale TC from {} (ansn {})",
            engine.main_address,
            message.originator,
            tc.ansn
        );
        return;
    }

    engine.state.erase_older_topology(message.originator, tc.ansn);

    for entry in &tc.advertised {
        if let Some(tuple) = engine.state.find_topology_mut(entry.address, message.originator) {
            tuple.seq = tc.ansn;
            tuple.expiry = now + message.vtime;
            tuple.etx = entry.etx;
        } else {
            engine.state.insert_topology(TopologyTuple {
                dest: entry.address,
                last: message.originator,
                seq: tc.ansn,
                expiry: now + message.vtime,
                etx: entry.etx,
            });
            engine.schedule_expiry(now + message.vtime, Event::TopologyExpiry(entry.address, message.originator));
        }
    }
}

pub(crate) fn process_mid(
    engine: &mut Engine,
    now: Timestamp,
    message: &Message,
    mid: &Mid,
    sender: Ipv4Addr,
) {
    if engine.state.find_sym_link(sender, now).is_none() {
        return;
    }

    for iface in &mid.interfaces {
        if let Some(tuple) = engine.state.find_iface_assoc_mut(*iface, message.originator) {
            tuple.expiry = Some(now + message.vtime);
        } else {
            engine.state.insert_iface_assoc(IfaceAssocTuple {
                iface: *iface,
                main: message.originator,
                expiry: Some(now + message.vtime),
            });
            engine.schedule_expiry(now + message.vtime, Event::IfaceAssocExpiry(*iface));
        }
    }

    // Addresses recorded before this MID may have been interface
    // aliases; fold them onto their main addresses.
    engine.state.remap_neighbor_mains();
}

pub(crate) fn process_hna(
    engine: &mut Engine,
    now: Timestamp,
    message: &Message,
    hna: &Hna,
    sender: Ipv4Addr,
) {
    if engine.state.find_sym_link(sender, now).is_none() {
        return;
    }

    for (network, netmask) in &hna.associations {
        if let Some(tuple) =
            engine.state.find_association_mut(message.originator, *network, *netmask)
        {
            tuple.expiry = now + message.vtime;
        } else {
            engine.state.insert_association(AssociationTuple {
                gateway: message.originator,
                network: *network,
                netmask: *netmask,
                expiry: now + message.vtime,
            });
            engine.schedule_expiry(
                now + message.vtime,
                Event::AssociationExpiry(message.originator, *network, *netmask),
            );
        }
    }
}

/// RFC 3626 default forwarding: retransmit once, only for messages first
/// heard from an MPR selector, with TTL left to spend.
pub(crate) fn forward_default(
    engine: &mut Engine,
    now: Timestamp,
    message: Message,
    local_iface: Ipv4Addr,
    sender: Ipv4Addr,
) {
    if engine.state.find_sym_link(sender, now).is_none() {
        return;
    }

    if engine
        .state
        .find_duplicate(message.originator, message.seq)
        .is_some_and(|dup| dup.retransmitted)
    {
        log::trace!(
            "olsr({}): already retransmitted {} seq {}",
            engine.main_address,
            message.originator,
            message.seq
        );
        return;
    }

    let mut retransmitted = false;
    if message.ttl > 1 {
        let sender_main = engine.state.main_address_of(sender);
        if engine.state.find_mpr_selector_mut(sender_main).is_some() {
            let mut forwarded = message.clone();
            forwarded.ttl -= 1;
            forwarded.hop_count += 1;
            super::emit::queue_message(engine, now, forwarded);
            retransmitted = true;
        }
    }

    let hold = engine.config.duplicate_hold();
    if let Some(dup) = engine.state.find_duplicate_mut(message.originator, message.seq) {
        dup.expiry = now + hold;
        dup.retransmitted = retransmitted;
        dup.ifaces.push(local_iface);
    } else {
        engine.state.insert_duplicate(DuplicateTuple {
            originator: message.originator,
            seq: message.seq,
            retransmitted,
            ifaces: vec![local_iface],
            expiry: now + hold,
        });
        engine.schedule_expiry(now + hold, Event::DuplicateExpiry(message.originator, message.seq));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LinkTuple, MprSelectorTuple};
    use crate::testutil::{addr, test_engine};
    use olsrx_wire::{Body, LinkEntry};
    use std::time::Duration;

    fn sym_link(engine: &mut Engine, neighbor: Ipv4Addr, now: Timestamp) {
        engine.state.insert_link(LinkTuple {
            local_iface: addr(1),
            neighbor_iface: neighbor,
            sym_expiry: now + Duration::from_secs(10),
            asym_expiry: now + Duration::from_secs(10),
            expiry: now + Duration::from_secs(10),
            etx: 1,
        });
    }

    fn tc_message(originator: Ipv4Addr, ansn: u16, advertised: Vec<LinkEntry>) -> (Message, Tc) {
        let tc = Tc { ansn, advertised };
        let message = Message {
            vtime: Duration::from_secs(5),
            originator,
            ttl: 255,
            hop_count: 0,
            seq: ansn,
            body: Body::Tc(tc.clone()),
        };
        (message, tc)
    }

    #[test]
    fn tc_from_outside_the_sym_neighborhood_is_dropped() {
        let (mut engine, _) = test_engine(1);
        let now = Timestamp::from_millis(100);
        let (message, tc) =
            tc_message(addr(5), 1, vec![LinkEntry { address: addr(6), etx: 1 }]);
        process_tc(&mut engine, now, &message, &tc, addr(5));
        assert!(engine.state.topology_set().is_empty());
    }

    #[test]
    fn stale_ansn_is_dropped_and_newer_evicts_older() {
        let (mut engine, _) = test_engine(1);
        let now = Timestamp::from_millis(100);
        sym_link(&mut engine, addr(2), now);

        let (message, tc) = tc_message(addr(9), 5, vec![LinkEntry { address: addr(6), etx: 2 }]);
        process_tc(&mut engine, now, &message, &tc, addr(2));
        assert_eq!(engine.state.topology_set().len(), 1);
        assert_eq!(engine.state.topology_set()[0].seq, 5);

        // out-of-order ANSN=3 arrives: must not touch anything
        let (message, tc) = tc_message(addr(9), 3, vec![LinkEntry { address: addr(7), etx: 1 }]);
        process_tc(&mut engine, now, &message, &tc, addr(2));
        assert_eq!(engine.state.topology_set().len(), 1);
        assert!(engine.state.find_topology_mut(addr(7), addr(9)).is_none());
        assert_eq!(engine.state.topology_set()[0].etx, 2);

        // ANSN=6 replaces the edge set
        let (message, tc) = tc_message(addr(9), 6, vec![LinkEntry { address: addr(8), etx: 4 }]);
        process_tc(&mut engine, now, &message, &tc, addr(2));
        assert!(engine.state.find_topology_mut(addr(6), addr(9)).is_none());
        let tuple = engine.state.find_topology_mut(addr(8), addr(9)).expect("new edge");
        assert_eq!((tuple.seq, tuple.etx), (6, 4));
    }

    #[test]
    fn mid_binds_secondary_interfaces_to_the_main_address() {
        let (mut engine, _) = test_engine(1);
        let now = Timestamp::from_millis(100);
        sym_link(&mut engine, addr(2), now);

        let mid = Mid { interfaces: vec![addr(20)] };
        let message = Message {
            vtime: Duration::from_secs(15),
            originator: addr(2),
            ttl: 255,
            hop_count: 0,
            seq: 1,
            body: Body::Mid(mid.clone()),
        };
        process_mid(&mut engine, now, &message, &mid, addr(2));
        assert_eq!(engine.state.main_address_of(addr(20)), addr(2));
    }

    #[test]
    fn hna_records_and_refreshes_gateway_associations() {
        let (mut engine, _) = test_engine(1);
        let now = Timestamp::from_millis(100);
        sym_link(&mut engine, addr(2), now);

        let network = Ipv4Addr::new(192, 168, 7, 0);
        let netmask = Ipv4Addr::new(255, 255, 255, 0);
        let hna = Hna { associations: vec![(network, netmask)] };
        let message = Message {
            vtime: Duration::from_secs(15),
            originator: addr(2),
            ttl: 255,
            hop_count: 0,
            seq: 1,
            body: Body::Hna(hna.clone()),
        };
        process_hna(&mut engine, now, &message, &hna, addr(2));
        assert_eq!(engine.state.association_set().len(), 1);

        let later = now + Duration::from_secs(2);
        process_hna(&mut engine, later, &message, &hna, addr(2));
        assert_eq!(engine.state.association_set().len(), 1);
        assert_eq!(engine.state.association_set()[0].expiry, later + Duration::from_secs(15));
    }

    #[test]
    fn forwarding_happens_once_and_only_for_mpr_selectors() {
        let (mut engine, _) = test_engine(1);
        let now = Timestamp::from_millis(100);
        sym_link(&mut engine, addr(2), now);
        engine.state.insert_mpr_selector(MprSelectorTuple {
            main_addr: addr(2),
            expiry: now + Duration::from_secs(10),
        });

        let (message, _) = tc_message(addr(9), 1, vec![]);
        forward_default(&mut engine, now, message.clone(), addr(1), addr(2));
        assert_eq!(engine.queued.len(), 1);
        assert_eq!(engine.queued[0].ttl, message.ttl - 1);
        assert_eq!(engine.queued[0].hop_count, message.hop_count + 1);

        // duplicate arrival: at most one retransmission ever
        forward_default(&mut engine, now, message, addr(1), addr(2));
        assert_eq!(engine.queued.len(), 1);
    }

    #[test]
    fn no_forwarding_without_selector_or_ttl() {
        let (mut engine, _) = test_engine(1);
        let now = Timestamp::from_millis(100);
        sym_link(&mut engine, addr(2), now);

        // not our selector
        let (message, _) = tc_message(addr(9), 1, vec![]);
        forward_default(&mut engine, now, message, addr(1), addr(2));
        assert!(engine.queued.is_empty());
        // the duplicate tuple still records the sighting
        assert!(engine.state.find_duplicate(addr(9), 1).is_some());

        // selector present but TTL spent
        engine.state.insert_mpr_selector(MprSelectorTuple {
            main_addr: addr(2),
            expiry: now + Duration::from_secs(10),
        });
        let (mut message, _) = tc_message(addr(9), 2, vec![]);
        message.ttl = 1;
        forward_default(&mut engine, now, message, addr(1), addr(2));
        assert!(engine.queued.is_empty());
    }
}
