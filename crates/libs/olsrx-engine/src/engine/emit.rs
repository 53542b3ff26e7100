//! Periodic message construction, queueing and packet flushing.
//!
//! Outbound messages accumulate in a queue drained by a single coalescing
//! jitter timer, so messages generated close together share a packet.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use olsrx_wire::{
    Body, Hello, HelloAck, Hna, LinkCode, LinkEntry, LinkMessage, LinkType, Message, Mid,
    NeighborType, Packet, Tc, ETX_SATURATION, MAX_MESSAGES_PER_PACKET,
};

use crate::state::{LinkTuple, NeighborStatus};
use crate::time::Timestamp;

use super::{sensing, Engine, Event};

pub(crate) fn send_hello(engine: &mut Engine, now: Timestamp) {
    let vtime = engine.config.neighbor_hold();
    let neighbor_churn = sensing::sample_churn(engine, now);
    let position = engine.mobility.position();
    let velocity = engine.mobility.velocity();

    let link_tuples: Vec<LinkTuple> = engine.state.links().to_vec();
    let mut links = Vec::new();
    for link in link_tuples {
        if engine.state.main_address_of(link.local_iface) != engine.main_address
            || link.expiry < now
        {
            continue;
        }

        let link_type = if link.sym_expiry >= now {
            LinkType::Sym
        } else if link.asym_expiry >= now {
            LinkType::Asym
        } else {
            LinkType::Lost
        };

        let neighbor_main = engine.state.main_address_of(link.neighbor_iface);
        let neighbor_type = if engine.state.is_mpr(neighbor_main) {
            NeighborType::Mpr
        } else {
            match engine.state.find_neighbor(neighbor_main) {
                Some(neighbor) if neighbor.status == NeighborStatus::Sym => NeighborType::Sym,
                Some(_) => NeighborType::NotNeighbor,
                None => {
                    log::warn!(
                        "olsr({}): link to unknown neighbor {}",
                        engine.main_address,
                        neighbor_main
                    );
                    continue;
                }
            }
        };
        if link_type == LinkType::Sym && neighbor_type == NeighborType::NotNeighbor {
            // contradictory; the neighbor tuple is about to catch up
            continue;
        }

        // Emitting the HELLO is the probe: count it against the forward
        // quality tuple, exactly once per neighbor per emission.
        let etx = match engine.state.find_quality_mut(link.local_iface, link.neighbor_iface) {
            Some(quality) => {
                quality.hellos_sent += 1;
                quality.expiry = now + vtime - engine.config.hello_interval;
                quality.recompute_etx();
                quality.etx
            }
            None => ETX_SATURATION,
        };

        links.push(LinkMessage {
            code: LinkCode::new(link_type, neighbor_type),
            neighbors: vec![LinkEntry { address: link.neighbor_iface, etx }],
        });
    }

    let body = Body::Hello(Hello {
        htime: engine.config.hello_interval,
        willingness: engine.config.willingness,
        neighbor_churn,
        pos_x: position.x as i32,
        pos_y: position.y as i32,
        pos_z: position.z as i16,
        vel_x: velocity.x as i16,
        vel_y: velocity.y as i16,
        vel_z: velocity.z as i16,
        links,
    });
    let message = Message {
        vtime,
        originator: engine.main_address,
        ttl: 1,
        hop_count: 0,
        seq: engine.next_message_seq(),
        body,
    };
    queue_message(engine, now, message);
}

/// Acknowledge a HELLO: the embedded address names the interface the
/// HELLO came from, so its owner can attribute the acknowledgment.
pub(crate) fn send_hello_ack(engine: &mut Engine, now: Timestamp, acked_iface: Ipv4Addr) {
    let message = Message {
        vtime: engine.config.neighbor_hold(),
        originator: engine.main_address,
        ttl: 1,
        hop_count: 0,
        seq: engine.next_message_seq(),
        body: Body::HelloAck(HelloAck { receiver: acked_iface }),
    };
    queue_message(engine, now, message);
}

pub(crate) fn send_tc(engine: &mut Engine, now: Timestamp) {
    // Round-trip ETX per selector: fold the live directional figures,
    // keeping the largest product seen across interfaces.
    let mut round_trip: BTreeMap<Ipv4Addr, u32> = engine
        .state
        .mpr_selectors()
        .iter()
        .map(|selector| (selector.main_addr, 1u32))
        .collect();

    for quality in engine.state.link_quality_set() {
        let local_main = engine.state.main_address_of(quality.local_iface);
        let neighbor_main = engine.state.main_address_of(quality.neighbor_iface);
        if local_main == engine.main_address {
            if let Some(value) = round_trip.get_mut(&neighbor_main) {
                *value = (*value).max(value.saturating_mul(quality.etx));
            }
        }
        if neighbor_main == engine.main_address {
            if let Some(value) = round_trip.get_mut(&local_main) {
                *value = (*value).max(value.saturating_mul(quality.etx));
            }
        }
    }

    let advertised = engine
        .state
        .mpr_selectors()
        .iter()
        .map(|selector| LinkEntry {
            address: selector.main_addr,
            etx: round_trip.get(&selector.main_addr).copied().unwrap_or(1),
        })
        .collect();

    let message = Message {
        vtime: engine.config.topology_hold(),
        originator: engine.main_address,
        ttl: 255,
        hop_count: 0,
        seq: engine.next_message_seq(),
        body: Body::Tc(Tc { ansn: engine.ansn, advertised }),
    };
    queue_message(engine, now, message);
}

pub(crate) fn send_mid(engine: &mut Engine, now: Timestamp) {
    let interfaces: Vec<Ipv4Addr> = engine
        .interfaces
        .iter()
        .map(|iface| iface.address)
        .filter(|address| *address != engine.main_address)
        .collect();
    if interfaces.is_empty() {
        return;
    }

    let message = Message {
        vtime: engine.config.mid_hold(),
        originator: engine.main_address,
        ttl: 255,
        hop_count: 0,
        seq: engine.next_message_seq(),
        body: Body::Mid(Mid { interfaces }),
    };
    queue_message(engine, now, message);
}

pub(crate) fn send_hna(engine: &mut Engine, now: Timestamp) {
    let associations: Vec<(Ipv4Addr, Ipv4Addr)> = engine
        .state
        .local_associations()
        .iter()
        .map(|assoc| (assoc.network, assoc.netmask))
        .collect();
    if associations.is_empty() {
        return;
    }

    let message = Message {
        vtime: engine.config.hna_hold(),
        originator: engine.main_address,
        ttl: 255,
        hop_count: 0,
        seq: engine.next_message_seq(),
        body: Body::Hna(Hna { associations }),
    };
    queue_message(engine, now, message);
}

/// Queue a message for the next jittered flush; an overfull queue
/// flushes immediately.
pub(crate) fn queue_message(engine: &mut Engine, now: Timestamp, message: Message) {
    engine.queued.push(message);
    if engine.queued.len() >= MAX_MESSAGES_PER_PACKET {
        flush_queue(engine, now);
    } else if !engine.flush_pending {
        engine.flush_pending = true;
        let at = now + engine.jitter();
        engine.timers.schedule(at, Event::FlushQueue);
    }
}

/// Pack the queue into packets of at most 64 messages and broadcast them
/// on every participating interface.
pub(crate) fn flush_queue(engine: &mut Engine, _now: Timestamp) {
    engine.flush_pending = false;
    if engine.queued.is_empty() {
        return;
    }

    let queued = std::mem::take(&mut engine.queued);
    for chunk in queued.chunks(MAX_MESSAGES_PER_PACKET) {
        let packet = Packet { seq: engine.next_packet_seq(), messages: chunk.to_vec() };
        let bytes = packet.encode();
        log::trace!(
            "olsr({}): tx packet seq {} ({} messages, {} bytes)",
            engine.main_address,
            packet.seq,
            chunk.len(),
            bytes.len()
        );
        for iface in engine.interfaces.clone() {
            engine.sink.send(&iface, &bytes);
            if let Some(observer) = &engine.observer {
                observer.packet_sent(iface.address, bytes.len(), chunk.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LinkQualityTuple, MprSelectorTuple};
    use crate::testutil::{addr, test_engine};
    use std::time::Duration;

    fn drain_packets(engine: &mut Engine, sink: &crate::testutil::RecordingSink) -> Vec<Packet> {
        flush_queue(engine, Timestamp::ZERO);
        let mut packets = Vec::new();
        for (_, bytes) in sink.sent.lock().expect("sink lock").drain(..) {
            let (seq, reader) = Packet::read(&bytes).expect("packet");
            packets.push(Packet {
                seq,
                messages: reader.map(|m| m.expect("message")).collect(),
            });
        }
        packets
    }

    #[test]
    fn hello_emission_counts_probes_per_neighbor() {
        let (mut engine, sink) = test_engine(1);
        let now = Timestamp::from_millis(100);
        engine.state.insert_link(LinkTuple {
            local_iface: addr(1),
            neighbor_iface: addr(2),
            sym_expiry: now + Duration::from_secs(4),
            asym_expiry: now + Duration::from_secs(4),
            expiry: now + Duration::from_secs(4),
            etx: ETX_SATURATION,
        });
        engine.state.insert_or_update_neighbor(crate::state::NeighborTuple {
            main_addr: addr(2),
            status: NeighborStatus::Sym,
            willingness: olsrx_wire::Willingness::DEFAULT,
        });
        engine
            .state
            .insert_quality(LinkQualityTuple::new(addr(1), addr(2), now + Duration::from_secs(4)));

        send_hello(&mut engine, now);
        send_hello(&mut engine, now + Duration::from_secs(2));
        assert_eq!(
            engine.state.find_quality(addr(1), addr(2)).expect("forward").hellos_sent,
            2
        );

        let packets = drain_packets(&mut engine, &sink);
        let hello = packets
            .iter()
            .flat_map(|p| &p.messages)
            .find_map(|m| match &m.body {
                Body::Hello(h) if !h.links.is_empty() => Some(h.clone()),
                _ => None,
            })
            .expect("hello with links");
        assert_eq!(hello.links[0].neighbors[0].address, addr(2));
        assert_eq!(hello.links[0].code.link, LinkType::Sym);
    }

    #[test]
    fn tc_carries_ansn_and_selector_round_trip_etx() {
        let (mut engine, sink) = test_engine(1);
        let now = Timestamp::from_millis(100);
        engine.state.insert_mpr_selector(MprSelectorTuple {
            main_addr: addr(2),
            expiry: now + Duration::from_secs(10),
        });
        engine.increment_ansn();

        let expiry = now + Duration::from_secs(10);
        let mut forward = LinkQualityTuple::new(addr(1), addr(2), expiry);
        forward.etx = 3;
        engine.state.insert_quality(forward);
        let mut reverse = LinkQualityTuple::new(addr(2), addr(1), expiry);
        reverse.etx = 2;
        engine.state.insert_quality(reverse);

        let ansn = engine.ansn;
        send_tc(&mut engine, now);
        let packets = drain_packets(&mut engine, &sink);
        let tc = packets
            .iter()
            .flat_map(|p| &p.messages)
            .find_map(|m| match &m.body {
                Body::Tc(tc) => Some(tc.clone()),
                _ => None,
            })
            .expect("tc message");
        assert_eq!(tc.ansn, ansn);
        assert_eq!(tc.advertised, vec![LinkEntry { address: addr(2), etx: 6 }]);
    }

    #[test]
    fn queue_coalesces_into_one_packet_and_seq_advances() {
        let (mut engine, sink) = test_engine(1);
        let now = Timestamp::ZERO;
        send_hello_ack(&mut engine, now, addr(1));
        send_hello_ack(&mut engine, now, addr(1));

        let packets = drain_packets(&mut engine, &sink);
        // start() already queued a HELLO; everything shares one packet
        assert_eq!(packets.len(), 1);
        assert!(packets[0].messages.len() >= 2);

        send_hello_ack(&mut engine, now, addr(1));
        let more = drain_packets(&mut engine, &sink);
        assert_eq!(more.len(), 1);
        assert_eq!(more[0].seq, packets[0].seq.wrapping_add(1));
    }

    #[test]
    fn overfull_queue_flushes_eagerly() {
        let (mut engine, sink) = test_engine(1);
        let baseline = engine.queued.len();
        for _ in baseline..MAX_MESSAGES_PER_PACKET {
            send_hello_ack(&mut engine, Timestamp::ZERO, addr(1));
        }
        // the 64th message forced a flush without waiting for the timer
        assert!(engine.queued.is_empty());
        assert_eq!(sink.sent.lock().expect("sink lock").len(), 1);
    }

    #[test]
    fn mid_advertises_secondary_interfaces_only() {
        use crate::node::{InterfaceAddr, Vec3};
        use crate::testutil::{FixedMobility, RecordingSink, StaticIpv4};
        use std::sync::Arc;

        let sink = Arc::new(RecordingSink::default());
        let mut engine = crate::engine::Engine::new(
            crate::config::Config::default(),
            Arc::new(StaticIpv4(vec![
                InterfaceAddr { index: 1, address: addr(1) },
                InterfaceAddr { index: 2, address: addr(21) },
            ])),
            sink.clone(),
            Arc::new(FixedMobility { position: Vec3::default(), velocity: Vec3::default() }),
        );
        engine.start(Timestamp::ZERO).expect("engine start");

        let packets = drain_packets(&mut engine, &sink);
        let mid = packets
            .iter()
            .flat_map(|p| &p.messages)
            .find_map(|m| match &m.body {
                Body::Mid(mid) => Some(mid.clone()),
                _ => None,
            })
            .expect("mid message");
        assert_eq!(mid.interfaces, vec![addr(21)]);
    }

    #[test]
    fn message_sequence_numbers_increase() {
        let (mut engine, sink) = test_engine(1);
        send_hello_ack(&mut engine, Timestamp::ZERO, addr(1));
        send_hello_ack(&mut engine, Timestamp::ZERO, addr(1));
        let packets = drain_packets(&mut engine, &sink);
        let seqs: Vec<u16> = packets
            .iter()
            .flat_map(|p| &p.messages)
            .map(|m| m.seq)
            .collect();
        for pair in seqs.windows(2) {
            assert_eq!(pair[1], pair[0].wrapping_add(1));
        }
    }
}
