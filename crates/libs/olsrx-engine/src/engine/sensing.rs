//! Link sensing and neighborhood maintenance.
//!
//! Everything a HELLO or HELLO-ACK teaches us lands here: link tuples and
//! their symmetric/asymmetric windows, directional link quality with the
//! mobility predictors, the derived neighbor set, 2-hop neighbors and MPR
//! selectors, and the churn statistic advertised back out in our own
//! HELLOs.

use std::net::Ipv4Addr;
use std::time::Duration;

use olsrx_wire::{Hello, HelloAck, LinkType, Message, NeighborType, Willingness, ETX_SATURATION};

use crate::node::Vec3;
use crate::state::tuples::{LHT_OUT_OF_RANGE, LHT_STABLE};
use crate::state::{
    LinkQualityTuple, LinkTuple, MprSelectorTuple, NeighborStatus, NeighborTuple, TwoHopTuple,
};
use crate::time::Timestamp;

use super::{mpr, routes, Engine, Event};

pub(crate) fn process_hello(
    engine: &mut Engine,
    now: Timestamp,
    message: &Message,
    hello: &Hello,
    local_iface: Ipv4Addr,
    sender: Ipv4Addr,
) {
    log::trace!(
        "olsr({}): HELLO from {} on {} ({} link messages)",
        engine.main_address,
        sender,
        local_iface,
        hello.links.len()
    );

    link_sensing(engine, now, message, hello, local_iface, sender);
    populate_neighbor(engine, hello, message.originator);
    populate_two_hop(engine, now, message, hello);
    mpr::compute(engine, now);
    populate_mpr_selectors(engine, now, message, hello);
}

fn link_sensing(
    engine: &mut Engine,
    now: Timestamp,
    message: &Message,
    hello: &Hello,
    local_iface: Ipv4Addr,
    sender: Ipv4Addr,
) {
    let vtime = message.vtime;
    let created = engine.state.find_link(sender).is_none();
    if created {
        engine.state.insert_link(LinkTuple {
            local_iface,
            neighbor_iface: sender,
            sym_expiry: now - Duration::from_secs(1),
            asym_expiry: now + vtime,
            expiry: now + vtime,
            etx: ETX_SATURATION,
        });
        engine.gained.push((now, sender));
    }
    let mut updated = !created;

    // Reverse ETX: what the neighbor reports for its direction toward us.
    let mut reverse_etx: u32 = 1;
    if let Some(link) = engine.state.find_link_mut(sender) {
        link.asym_expiry = now + vtime;
        for link_message in &hello.links {
            for entry in link_message.neighbors.iter().filter(|e| e.address == local_iface) {
                match link_message.code.link {
                    LinkType::Lost => {
                        link.sym_expiry = now - Duration::from_secs(1);
                        updated = true;
                    }
                    LinkType::Sym | LinkType::Asym => {
                        link.sym_expiry = now + vtime;
                        reverse_etx = reverse_etx.max(entry.etx.max(1));
                        updated = true;
                    }
                    LinkType::Unspec => {}
                }
            }
        }
        link.expiry = link.expiry.max(link.asym_expiry);
    }

    let rev_created = engine.state.find_quality(sender, local_iface).is_none();
    if rev_created {
        engine.state.insert_quality(LinkQualityTuple::new(sender, local_iface, now + vtime));
    }
    if let Some(reverse) = engine.state.find_quality_mut(sender, local_iface) {
        reverse.expiry = now + vtime;
        reverse.etx = reverse_etx;
    }

    let fwd_created = engine.state.find_quality(local_iface, sender).is_none();
    if fwd_created {
        engine.state.insert_quality(LinkQualityTuple::new(local_iface, sender, now + vtime));
    }

    let self_position = engine.mobility.position();
    let self_velocity = engine.mobility.velocity();
    let relative_position = Vec3::new(
        f64::from(hello.pos_x) - self_position.x,
        f64::from(hello.pos_y) - self_position.y,
        f64::from(hello.pos_z) - self_position.z,
    );
    let relative_velocity = Vec3::new(
        f64::from(hello.vel_x) - self_velocity.x,
        f64::from(hello.vel_y) - self_velocity.y,
        f64::from(hello.vel_z) - self_velocity.z,
    );
    let distance = relative_position.norm();
    let lht = hold_time(relative_position, relative_velocity, engine.config.communication_radius);

    if let Some(forward) = engine.state.find_quality_mut(local_iface, sender) {
        forward.neighbor_churn = hello.neighbor_churn;
        forward.relative_position = relative_position;
        forward.relative_velocity = relative_velocity;
        forward.hold_time = lht;
        forward.push_distance(distance);
    }

    if fwd_created || rev_created {
        let fwd_expiry = engine.state.find_quality(local_iface, sender).map(|q| q.expiry);
        let rev_expiry = engine.state.find_quality(sender, local_iface).map(|q| q.expiry);
        if let Some(at) = [fwd_expiry, rev_expiry].into_iter().flatten().min() {
            engine.schedule_expiry(at, Event::LinkQualityExpiry(local_iface, sender));
        }
    }

    if created {
        link_tuple_added(engine, now, sender, hello.willingness);
        if let Some(link) = engine.state.find_link(sender) {
            let at = link.expiry.min(link.sym_expiry);
            engine.schedule_expiry(at, Event::LinkExpiry(sender));
        }
    } else if updated {
        link_tuple_updated(engine, now, sender, hello.willingness);
    }
}

/// Derive the neighbor tuple for a freshly created link.
fn link_tuple_added(
    engine: &mut Engine,
    now: Timestamp,
    neighbor_iface: Ipv4Addr,
    willingness: Willingness,
) {
    let main = engine.state.main_address_of(neighbor_iface);
    let status = match engine.state.find_link(neighbor_iface) {
        Some(link) if link.is_symmetric(now) => NeighborStatus::Sym,
        _ => NeighborStatus::NotSym,
    };
    engine.state.insert_or_update_neighbor(NeighborTuple { main_addr: main, status, willingness });
}

/// Every link change re-derives the neighbor status across all links to
/// the same main address.
fn link_tuple_updated(
    engine: &mut Engine,
    now: Timestamp,
    neighbor_iface: Ipv4Addr,
    willingness: Willingness,
) {
    let main = engine.state.main_address_of(neighbor_iface);
    if engine.state.find_neighbor(main).is_none() {
        link_tuple_added(engine, now, neighbor_iface, willingness);
    }
    let has_sym = engine.state.has_sym_link_to(main, now);
    if let Some(neighbor) = engine.state.find_neighbor_mut(main) {
        neighbor.status = if has_sym { NeighborStatus::Sym } else { NeighborStatus::NotSym };
    }
}

fn populate_neighbor(engine: &mut Engine, hello: &Hello, originator: Ipv4Addr) {
    if let Some(neighbor) = engine.state.find_neighbor_mut(originator) {
        neighbor.willingness = hello.willingness;
    }
}

fn populate_two_hop(engine: &mut Engine, now: Timestamp, message: &Message, hello: &Hello) {
    let originator = message.originator;
    if !engine.state.has_sym_link_to(originator, now) {
        return;
    }

    for link_message in &hello.links {
        match link_message.code.neighbor {
            NeighborType::Sym | NeighborType::Mpr => {
                for entry in &link_message.neighbors {
                    let two_hop_main = engine.state.main_address_of(entry.address);
                    if two_hop_main == engine.main_address {
                        continue;
                    }
                    if let Some(tuple) = engine.state.find_two_hop_mut(originator, two_hop_main) {
                        tuple.expiry = now + message.vtime;
                    } else {
                        engine.state.insert_two_hop(TwoHopTuple {
                            neighbor_main: originator,
                            two_hop_main,
                            expiry: now + message.vtime,
                        });
                        engine.schedule_expiry(now + message.vtime, Event::TwoHopExpiry(originator, two_hop_main));
                    }
                }
            }
            NeighborType::NotNeighbor => {
                for entry in &link_message.neighbors {
                    let two_hop_main = engine.state.main_address_of(entry.address);
                    engine.state.erase_two_hop_pair(originator, two_hop_main);
                }
            }
        }
    }
}

fn populate_mpr_selectors(engine: &mut Engine, now: Timestamp, message: &Message, hello: &Hello) {
    let originator = message.originator;
    for link_message in &hello.links {
        if link_message.code.neighbor != NeighborType::Mpr {
            continue;
        }
        for entry in &link_message.neighbors {
            if engine.state.main_address_of(entry.address) != engine.main_address {
                continue;
            }
            if let Some(tuple) = engine.state.find_mpr_selector_mut(originator) {
                tuple.expiry = now + message.vtime;
            } else {
                engine.state.insert_mpr_selector(MprSelectorTuple {
                    main_addr: originator,
                    expiry: now + message.vtime,
                });
                engine.increment_ansn();
                engine.schedule_expiry(now + message.vtime, Event::MprSelectorExpiry(originator));
                log::debug!(
                    "olsr({}): {} selected us as MPR",
                    engine.main_address,
                    originator
                );
            }
        }
    }
}

pub(crate) fn process_hello_ack(
    engine: &mut Engine,
    now: Timestamp,
    message: &Message,
    ack: HelloAck,
    local_iface: Ipv4Addr,
    sender: Ipv4Addr,
) {
    // Broadcast ACKs acknowledge one specific receiver interface.
    if !engine.is_own_address(ack.receiver) {
        return;
    }

    let vtime = message.vtime;
    let fwd_created = engine.state.find_quality(local_iface, sender).is_none();
    if fwd_created {
        let mut quality = LinkQualityTuple::new(local_iface, sender, now + vtime);
        // The HELLO this acknowledges predates the tuple.
        quality.hellos_sent = 1;
        engine.state.insert_quality(quality);
    }

    let mut etx = ETX_SATURATION;
    if let Some(forward) = engine.state.find_quality_mut(local_iface, sender) {
        if !fwd_created && forward.etx == ETX_SATURATION {
            forward.hellos_sent += 1;
        }
        forward.acks_received += 1;
        forward.expiry = now + vtime;
        forward.recompute_etx();
        etx = forward.etx;
    }
    if fwd_created {
        engine.schedule_expiry(now + vtime, Event::LinkQualityExpiry(local_iface, sender));
    }

    let link_created = engine.state.find_link(sender).is_none();
    if link_created {
        engine.state.insert_link(LinkTuple {
            local_iface,
            neighbor_iface: sender,
            sym_expiry: now - Duration::from_secs(1),
            asym_expiry: now + vtime,
            expiry: now + vtime,
            etx,
        });
    }
    let mut expire_at = None;
    if let Some(link) = engine.state.find_link_mut(sender) {
        link.etx = etx;
        link.asym_expiry = now + vtime;
        link.expiry = link.expiry.max(link.asym_expiry);
        expire_at = Some(link.expiry.min(link.sym_expiry));
    }

    // An ACK carries no willingness; HIGH stands in until the next HELLO.
    if link_created {
        link_tuple_added(engine, now, sender, Willingness::HIGH);
        if let Some(at) = expire_at {
            engine.schedule_expiry(at, Event::LinkExpiry(sender));
        }
    } else {
        link_tuple_updated(engine, now, sender, Willingness::HIGH);
    }
}

/// Cleanup shared by symmetry loss and link removal.
fn neighbor_loss(engine: &mut Engine, now: Timestamp, neighbor_iface: Ipv4Addr) {
    let main = engine.state.main_address_of(neighbor_iface);
    log::debug!("olsr({}): neighbor loss {}", engine.main_address, main);

    link_tuple_updated(engine, now, neighbor_iface, Willingness::DEFAULT);
    engine.state.erase_two_hop_of(main);
    if engine.state.erase_mpr_selector(main) {
        engine.increment_ansn();
    }
    mpr::compute(engine, now);
    routes::compute(engine, now);
}

/// Link-expiry re-check: the refresh that happened since scheduling may
/// have pushed the real deadline forward.
pub(crate) fn link_expiry_check(engine: &mut Engine, now: Timestamp, neighbor_iface: Ipv4Addr) {
    let Some(link) = engine.state.find_link(neighbor_iface) else {
        return;
    };
    let (expiry, sym_expiry) = (link.expiry, link.sym_expiry);

    if expiry < now {
        engine.lost.push((now, neighbor_iface));
        let main = engine.state.main_address_of(neighbor_iface);
        engine.state.erase_link(neighbor_iface);
        log::debug!("olsr({}): link to {} expired", engine.main_address, neighbor_iface);

        if engine.state.has_live_link_to(main, now) {
            let has_sym = engine.state.has_sym_link_to(main, now);
            if let Some(neighbor) = engine.state.find_neighbor_mut(main) {
                neighbor.status =
                    if has_sym { NeighborStatus::Sym } else { NeighborStatus::NotSym };
            }
        } else {
            engine.state.erase_neighbor(main);
        }
        engine.state.erase_two_hop_of(main);
        if engine.state.erase_mpr_selector(main) {
            engine.increment_ansn();
        }
        mpr::compute(engine, now);
        routes::compute(engine, now);
    } else if sym_expiry < now {
        neighbor_loss(engine, now, neighbor_iface);
        engine.schedule_expiry(expiry, Event::LinkExpiry(neighbor_iface));
    } else {
        engine.schedule_expiry(expiry.min(sym_expiry), Event::LinkExpiry(neighbor_iface));
    }
}

/// Joint re-check for the forward/reverse quality pair of one link.
pub(crate) fn quality_expiry_check(
    engine: &mut Engine,
    now: Timestamp,
    local: Ipv4Addr,
    neighbor: Ipv4Addr,
) {
    let forward = engine.state.find_quality(local, neighbor).map(|q| q.expiry);
    let reverse = engine.state.find_quality(neighbor, local).map(|q| q.expiry);

    let mut next: Option<Timestamp> = None;
    let mut removed = false;
    for (expiry, is_forward) in [(forward, true), (reverse, false)] {
        match expiry {
            Some(expiry) if expiry < now => {
                if is_forward {
                    engine.state.erase_quality(local, neighbor);
                } else {
                    engine.state.erase_quality(neighbor, local);
                }
                removed = true;
            }
            Some(expiry) => next = Some(next.map_or(expiry, |n: Timestamp| n.min(expiry))),
            None => {}
        }
    }

    if removed {
        routes::compute(engine, now);
    }
    if let Some(at) = next {
        engine.schedule_expiry(at, Event::LinkQualityExpiry(local, neighbor));
    }
}

/// Prune the churn window and return the rate for the next HELLO.
pub(crate) fn sample_churn(engine: &mut Engine, now: Timestamp) -> u16 {
    let horizon = now - engine.config.churn_window();
    engine.gained.retain(|(at, _)| *at >= horizon);
    engine.lost.retain(|(at, _)| *at >= horizon);
    (engine.gained.len() + engine.lost.len()).min(usize::from(u16::MAX)) as u16
}

/// Predicted seconds until the neighbor leaves communication range.
///
/// `b` is the relative position, `a` the relative velocity. Solves
/// `|b + a t| = r` for positive `t`; near-zero relative speed pins the
/// result at the stable sentinel, and a neighbor that is out of range
/// even 0.2 s ahead yields the negative sentinel.
fn hold_time(b: Vec3, a: Vec3, radius: f64) -> f64 {
    let speed_sq = a.norm_sq();
    if speed_sq < 0.01 {
        return LHT_STABLE;
    }

    let mut b = b;
    if b.norm() > radius {
        b = b.plus_scaled(a, 0.2);
        if b.norm() > radius {
            return LHT_OUT_OF_RANGE;
        }
    }

    let discriminant = (radius * radius * speed_sq - b.cross_norm_sq(a)).max(0.0);
    (-a.dot(b) + discriminant.sqrt()) / speed_sq
}
