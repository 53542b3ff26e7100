//! Packet framing and message bodies.
//!
//! A packet is a 4-byte envelope followed by a stream of messages. Each
//! message carries its own length, so a malformed body only costs that
//! one message: [`MessageReader`] skips to the next boundary and keeps
//! going.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::vtime;

/// Packet envelope size: length (2) + sequence number (2).
pub const PACKET_HEADER_SIZE: usize = 4;

/// Message header size: type, vtime, size, originator, ttl, hops, seq.
pub const MESSAGE_HEADER_SIZE: usize = 12;

const HELLO_FIXED_SIZE: usize = 22;
const LINK_MESSAGE_HEADER_SIZE: usize = 4;
const LINK_ENTRY_SIZE: usize = 8;

/// Errors from wire encode/decode.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    #[error("truncated packet: {0} bytes left, {1} needed")]
    Truncated(usize, usize),

    #[error("inconsistent length field: {0}")]
    BadLength(u16),

    #[error("invalid link code: 0x{0:02x}")]
    InvalidLinkCode(u8),

    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),
}

/// Control message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Hello = 1,
    Tc = 2,
    Mid = 3,
    Hna = 4,
    HelloAck = 5,
}

impl MessageKind {
    pub fn from_byte(byte: u8) -> Result<Self, WireError> {
        match byte {
            1 => Ok(Self::Hello),
            2 => Ok(Self::Tc),
            3 => Ok(Self::Mid),
            4 => Ok(Self::Hna),
            5 => Ok(Self::HelloAck),
            other => Err(WireError::UnknownMessageType(other)),
        }
    }
}

/// Link type advertised in a HELLO link message (low two code bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkType {
    Unspec = 0,
    Asym = 1,
    Sym = 2,
    Lost = 3,
}

impl From<u8> for LinkType {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            1 => LinkType::Asym,
            2 => LinkType::Sym,
            3 => LinkType::Lost,
            _ => LinkType::Unspec,
        }
    }
}

/// Neighbor type advertised in a HELLO link message (code bits 2-3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NeighborType {
    NotNeighbor = 0,
    Sym = 1,
    Mpr = 2,
}

/// A validated (link type, neighbor type) pair.
///
/// A symmetric link advertised for a non-neighbor is contradictory and
/// rejected at decode, as are the undefined neighbor-type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkCode {
    pub link: LinkType,
    pub neighbor: NeighborType,
}

impl LinkCode {
    pub fn new(link: LinkType, neighbor: NeighborType) -> Self {
        Self { link, neighbor }
    }

    pub fn to_byte(self) -> u8 {
        (self.link as u8) | ((self.neighbor as u8) << 2)
    }

    pub fn from_byte(byte: u8) -> Result<Self, WireError> {
        let link = LinkType::from(byte);
        let neighbor = match (byte >> 2) & 0b11 {
            0 => NeighborType::NotNeighbor,
            1 => NeighborType::Sym,
            2 => NeighborType::Mpr,
            _ => return Err(WireError::InvalidLinkCode(byte)),
        };
        if link == LinkType::Sym && neighbor == NeighborType::NotNeighbor {
            return Err(WireError::InvalidLinkCode(byte));
        }
        Ok(Self { link, neighbor })
    }
}

/// Relay willingness, 0..7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Willingness(u8);

impl Willingness {
    pub const NEVER: Self = Self(0);
    pub const LOW: Self = Self(1);
    pub const DEFAULT: Self = Self(3);
    pub const HIGH: Self = Self(6);
    pub const ALWAYS: Self = Self(7);

    pub fn from_raw(value: u8) -> Self {
        Self(value & 0x07)
    }

    pub fn raw(self) -> u8 {
        self.0
    }
}

impl Default for Willingness {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// One advertised neighbor interface with the sender's forward ETX to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkEntry {
    pub address: Ipv4Addr,
    pub etx: u32,
}

/// A HELLO link message: one link code and the interfaces it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMessage {
    pub code: LinkCode,
    pub neighbors: Vec<LinkEntry>,
}

/// HELLO body: beacon state plus the sender's current link set.
#[derive(Debug, Clone, PartialEq)]
pub struct Hello {
    /// Emission interval of the sender, vtime-encoded on the wire.
    pub htime: Duration,
    pub willingness: Willingness,
    /// Average neighbor change rate over the sender's churn window.
    pub neighbor_churn: u16,
    pub pos_x: i32,
    pub pos_y: i32,
    pub pos_z: i16,
    pub vel_x: i16,
    pub vel_y: i16,
    pub vel_z: i16,
    pub links: Vec<LinkMessage>,
}

/// HELLO-ACK body: the interface whose HELLO is being acknowledged, so
/// its owner can attribute the acknowledgment to the right link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloAck {
    pub receiver: Ipv4Addr,
}

/// TC body: ANSN plus (advertised neighbor, round-trip ETX) pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tc {
    pub ansn: u16,
    pub advertised: Vec<LinkEntry>,
}

/// MID body: the sender's non-main interface addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mid {
    pub interfaces: Vec<Ipv4Addr>,
}

/// HNA body: (network, netmask) pairs reachable through the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hna {
    pub associations: Vec<(Ipv4Addr, Ipv4Addr)>,
}

/// Type-specific message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Hello(Hello),
    HelloAck(HelloAck),
    Tc(Tc),
    Mid(Mid),
    Hna(Hna),
}

impl Body {
    fn encoded_len(&self) -> usize {
        match self {
            Body::Hello(hello) => {
                HELLO_FIXED_SIZE
                    + hello
                        .links
                        .iter()
                        .map(|lm| LINK_MESSAGE_HEADER_SIZE + lm.neighbors.len() * LINK_ENTRY_SIZE)
                        .sum::<usize>()
            }
            Body::HelloAck(_) => 4,
            Body::Tc(tc) => 4 + tc.advertised.len() * LINK_ENTRY_SIZE,
            Body::Mid(mid) => mid.interfaces.len() * 4,
            Body::Hna(hna) => hna.associations.len() * 8,
        }
    }
}

/// One control message with its header fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub vtime: Duration,
    pub originator: Ipv4Addr,
    pub ttl: u8,
    pub hop_count: u8,
    pub seq: u16,
    pub body: Body,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self.body {
            Body::Hello(_) => MessageKind::Hello,
            Body::HelloAck(_) => MessageKind::HelloAck,
            Body::Tc(_) => MessageKind::Tc,
            Body::Mid(_) => MessageKind::Mid,
            Body::Hna(_) => MessageKind::Hna,
        }
    }

    pub fn encoded_len(&self) -> usize {
        MESSAGE_HEADER_SIZE + self.body.encoded_len()
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.kind() as u8);
        out.push(vtime::encode(self.vtime));
        out.extend_from_slice(&(self.encoded_len() as u16).to_be_bytes());
        out.extend_from_slice(&u32::from(self.originator).to_be_bytes());
        out.push(self.ttl);
        out.push(self.hop_count);
        out.extend_from_slice(&self.seq.to_be_bytes());

        match &self.body {
            Body::Hello(hello) => {
                out.extend_from_slice(&0u16.to_be_bytes()); // reserved
                out.push(vtime::encode(hello.htime));
                out.push(hello.willingness.raw());
                out.extend_from_slice(&hello.neighbor_churn.to_be_bytes());
                out.extend_from_slice(&hello.pos_x.to_be_bytes());
                out.extend_from_slice(&hello.pos_y.to_be_bytes());
                out.extend_from_slice(&hello.pos_z.to_be_bytes());
                out.extend_from_slice(&hello.vel_x.to_be_bytes());
                out.extend_from_slice(&hello.vel_y.to_be_bytes());
                out.extend_from_slice(&hello.vel_z.to_be_bytes());
                for lm in &hello.links {
                    let size = LINK_MESSAGE_HEADER_SIZE + lm.neighbors.len() * LINK_ENTRY_SIZE;
                    out.push(lm.code.to_byte());
                    out.push(0); // reserved
                    out.extend_from_slice(&(size as u16).to_be_bytes());
                    for entry in &lm.neighbors {
                        out.extend_from_slice(&u32::from(entry.address).to_be_bytes());
                        out.extend_from_slice(&entry.etx.to_be_bytes());
                    }
                }
            }
            Body::HelloAck(ack) => {
                out.extend_from_slice(&u32::from(ack.receiver).to_be_bytes());
            }
            Body::Tc(tc) => {
                out.extend_from_slice(&tc.ansn.to_be_bytes());
                out.extend_from_slice(&0u16.to_be_bytes()); // reserved
                for entry in &tc.advertised {
                    out.extend_from_slice(&u32::from(entry.address).to_be_bytes());
                    out.extend_from_slice(&entry.etx.to_be_bytes());
                }
            }
            Body::Mid(mid) => {
                for address in &mid.interfaces {
                    out.extend_from_slice(&u32::from(*address).to_be_bytes());
                }
            }
            Body::Hna(hna) => {
                for (network, netmask) in &hna.associations {
                    out.extend_from_slice(&u32::from(*network).to_be_bytes());
                    out.extend_from_slice(&u32::from(*netmask).to_be_bytes());
                }
            }
        }
    }
}

/// A full outbound packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub seq: u16,
    pub messages: Vec<Message>,
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        let length = PACKET_HEADER_SIZE
            + self.messages.iter().map(Message::encoded_len).sum::<usize>();
        let mut out = Vec::with_capacity(length);
        out.extend_from_slice(&(length as u16).to_be_bytes());
        out.extend_from_slice(&self.seq.to_be_bytes());
        for message in &self.messages {
            message.encode_into(&mut out);
        }
        out
    }

    /// Open an incoming datagram for iteration.
    ///
    /// Returns the packet sequence number and a [`MessageReader`]; header
    /// inconsistencies that make the whole datagram unparseable fail
    /// here, everything message-local is reported per message.
    pub fn read(bytes: &[u8]) -> Result<(u16, MessageReader<'_>), WireError> {
        if bytes.len() < PACKET_HEADER_SIZE {
            return Err(WireError::Truncated(bytes.len(), PACKET_HEADER_SIZE));
        }
        let length = u16::from_be_bytes([bytes[0], bytes[1]]);
        let seq = u16::from_be_bytes([bytes[2], bytes[3]]);
        if (length as usize) < PACKET_HEADER_SIZE || length as usize > bytes.len() {
            return Err(WireError::BadLength(length));
        }
        Ok((seq, MessageReader { buf: &bytes[..length as usize], pos: PACKET_HEADER_SIZE }))
    }
}

/// Iterator over the messages of one packet.
///
/// Yields `Err` for a malformed or unknown-type message and then resumes
/// at the next message boundary; iteration only stops early when the
/// stream is too damaged to find that boundary.
pub struct MessageReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Iterator for MessageReader<'_> {
    type Item = Result<Message, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }
        let remaining = self.buf.len() - self.pos;
        if remaining < MESSAGE_HEADER_SIZE {
            self.pos = self.buf.len();
            return Some(Err(WireError::Truncated(remaining, MESSAGE_HEADER_SIZE)));
        }

        let header = &self.buf[self.pos..];
        let size = u16::from_be_bytes([header[2], header[3]]) as usize;
        if size < MESSAGE_HEADER_SIZE || size > remaining {
            self.pos = self.buf.len();
            return Some(Err(WireError::BadLength(size as u16)));
        }

        let start = self.pos;
        self.pos += size;

        let kind = match MessageKind::from_byte(header[0]) {
            Ok(kind) => kind,
            Err(err) => return Some(Err(err)),
        };
        let vtime = vtime::decode(header[1]);
        let originator =
            Ipv4Addr::from(u32::from_be_bytes([header[4], header[5], header[6], header[7]]));
        let ttl = header[8];
        let hop_count = header[9];
        let seq = u16::from_be_bytes([header[10], header[11]]);

        let body_bytes = &self.buf[start + MESSAGE_HEADER_SIZE..start + size];
        let body = match decode_body(kind, body_bytes) {
            Ok(body) => body,
            Err(err) => return Some(Err(err)),
        };

        Some(Ok(Message { vtime, originator, ttl, hop_count, seq, body }))
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated(self.remaining(), n));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Result<i16, WireError> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, WireError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn addr(&mut self) -> Result<Ipv4Addr, WireError> {
        Ok(Ipv4Addr::from(self.u32()?))
    }
}

fn decode_body(kind: MessageKind, bytes: &[u8]) -> Result<Body, WireError> {
    let mut r = Reader::new(bytes);
    match kind {
        MessageKind::Hello => {
            r.u16()?; // reserved
            let htime = vtime::decode(r.u8()?);
            let willingness = Willingness::from_raw(r.u8()?);
            let neighbor_churn = r.u16()?;
            let pos_x = r.i32()?;
            let pos_y = r.i32()?;
            let pos_z = r.i16()?;
            let vel_x = r.i16()?;
            let vel_y = r.i16()?;
            let vel_z = r.i16()?;

            let mut links = Vec::new();
            while r.remaining() > 0 {
                let code = LinkCode::from_byte(r.u8()?)?;
                r.u8()?; // reserved
                let size = r.u16()? as usize;
                if size < LINK_MESSAGE_HEADER_SIZE
                    || (size - LINK_MESSAGE_HEADER_SIZE) % LINK_ENTRY_SIZE != 0
                {
                    return Err(WireError::BadLength(size as u16));
                }
                let count = (size - LINK_MESSAGE_HEADER_SIZE) / LINK_ENTRY_SIZE;
                let mut neighbors = Vec::with_capacity(count);
                for _ in 0..count {
                    neighbors.push(LinkEntry { address: r.addr()?, etx: r.u32()? });
                }
                links.push(LinkMessage { code, neighbors });
            }

            Ok(Body::Hello(Hello {
                htime,
                willingness,
                neighbor_churn,
                pos_x,
                pos_y,
                pos_z,
                vel_x,
                vel_y,
                vel_z,
                links,
            }))
        }
        MessageKind::HelloAck => Ok(Body::HelloAck(HelloAck { receiver: r.addr()? })),
        MessageKind::Tc => {
            let ansn = r.u16()?;
            r.u16()?; // reserved
            if r.remaining() % LINK_ENTRY_SIZE != 0 {
                return Err(WireError::BadLength(bytes.len() as u16));
            }
            let mut advertised = Vec::with_capacity(r.remaining() / LINK_ENTRY_SIZE);
            while r.remaining() > 0 {
                advertised.push(LinkEntry { address: r.addr()?, etx: r.u32()? });
            }
            Ok(Body::Tc(Tc { ansn, advertised }))
        }
        MessageKind::Mid => {
            if r.remaining() % 4 != 0 {
                return Err(WireError::BadLength(bytes.len() as u16));
            }
            let mut interfaces = Vec::with_capacity(r.remaining() / 4);
            while r.remaining() > 0 {
                interfaces.push(r.addr()?);
            }
            Ok(Body::Mid(Mid { interfaces }))
        }
        MessageKind::Hna => {
            if r.remaining() % 8 != 0 {
                return Err(WireError::BadLength(bytes.len() as u16));
            }
            let mut associations = Vec::with_capacity(r.remaining() / 8);
            while r.remaining() > 0 {
                associations.push((r.addr()?, r.addr()?));
            }
            Ok(Body::Hna(Hna { associations }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn message(body: Body) -> Message {
        Message {
            vtime: Duration::from_secs(4),
            originator: addr(1),
            ttl: 1,
            hop_count: 0,
            seq: 7,
            body,
        }
    }

    fn roundtrip(packet: &Packet) -> Vec<Message> {
        let bytes = packet.encode();
        let (seq, reader) = Packet::read(&bytes).expect("packet header");
        assert_eq!(seq, packet.seq);
        reader.map(|m| m.expect("message")).collect()
    }

    #[test]
    fn hello_roundtrips_across_code_and_extreme_values() {
        let codes = [
            (LinkType::Unspec, NeighborType::NotNeighbor),
            (LinkType::Asym, NeighborType::Sym),
            (LinkType::Sym, NeighborType::Sym),
            (LinkType::Sym, NeighborType::Mpr),
            (LinkType::Lost, NeighborType::NotNeighbor),
            (LinkType::Lost, NeighborType::Mpr),
        ];
        for (link, neighbor) in codes {
            for etx in [1u32, 2, 50, 100 * 100] {
                for churn in [0u16, 1, u16::MAX] {
                    let hello = Hello {
                        htime: Duration::from_secs(2),
                        willingness: Willingness::HIGH,
                        neighbor_churn: churn,
                        pos_x: i32::MIN,
                        pos_y: i32::MAX,
                        pos_z: i16::MIN,
                        vel_x: i16::MAX,
                        vel_y: -1,
                        vel_z: 0,
                        links: vec![LinkMessage {
                            code: LinkCode::new(link, neighbor),
                            neighbors: vec![LinkEntry { address: addr(2), etx }],
                        }],
                    };
                    let packet =
                        Packet { seq: 3, messages: vec![message(Body::Hello(hello.clone()))] };
                    let decoded = roundtrip(&packet);
                    assert_eq!(decoded.len(), 1);
                    assert_eq!(decoded[0].body, Body::Hello(hello));
                }
            }
        }
    }

    #[test]
    fn multi_message_packet_roundtrips() {
        let packet = Packet {
            seq: 65_535,
            messages: vec![
                message(Body::HelloAck(HelloAck { receiver: addr(9) })),
                message(Body::Tc(Tc {
                    ansn: 42,
                    advertised: vec![
                        LinkEntry { address: addr(2), etx: 1 },
                        LinkEntry { address: addr(3), etx: 25 },
                    ],
                })),
                message(Body::Mid(Mid { interfaces: vec![addr(20), addr(21)] })),
                message(Body::Hna(Hna {
                    associations: vec![(
                        Ipv4Addr::new(192, 168, 5, 0),
                        Ipv4Addr::new(255, 255, 255, 0),
                    )],
                })),
            ],
        };
        let decoded = roundtrip(&packet);
        assert_eq!(decoded.len(), 4);
        for (sent, got) in packet.messages.iter().zip(&decoded) {
            assert_eq!(sent.body, got.body);
            assert_eq!(sent.originator, got.originator);
            assert_eq!(sent.seq, got.seq);
        }
    }

    #[test]
    fn sym_link_with_not_neigh_is_rejected() {
        let byte = LinkType::Sym as u8; // neighbor bits zero => NOT_NEIGH
        assert_eq!(LinkCode::from_byte(byte), Err(WireError::InvalidLinkCode(byte)));
    }

    #[test]
    fn undefined_neighbor_type_bits_are_rejected() {
        let byte = (3u8 << 2) | LinkType::Asym as u8;
        assert_eq!(LinkCode::from_byte(byte), Err(WireError::InvalidLinkCode(byte)));
    }

    #[test]
    fn unknown_message_type_is_skipped_and_rest_is_decoded() {
        let good = message(Body::HelloAck(HelloAck { receiver: addr(4) }));
        let packet = Packet { seq: 1, messages: vec![good.clone(), good.clone()] };
        let mut bytes = packet.encode();
        // corrupt the first message's type byte
        bytes[PACKET_HEADER_SIZE] = 0xEE;

        let (_, reader) = Packet::read(&bytes).expect("packet header");
        let items: Vec<_> = reader.collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Err(WireError::UnknownMessageType(0xEE)));
        assert_eq!(items[1].clone().map(|m| m.body), Ok(good.body));
    }

    #[test]
    fn truncated_body_fails_that_message_only() {
        let ack = message(Body::HelloAck(HelloAck { receiver: addr(4) }));
        let mut bad = ack.clone();
        // a TC body of 5 bytes cannot hold its fixed part + a pair
        bad.body = Body::Tc(Tc { ansn: 1, advertised: vec![] });
        let packet = Packet { seq: 1, messages: vec![bad, ack.clone()] };
        let mut bytes = packet.encode();
        // shrink the first message's declared and real size by one byte,
        // leaving a 3-byte TC body
        let size_at = PACKET_HEADER_SIZE + 2;
        let declared = u16::from_be_bytes([bytes[size_at], bytes[size_at + 1]]);
        bytes[size_at..size_at + 2].copy_from_slice(&(declared - 1).to_be_bytes());
        bytes.remove(PACKET_HEADER_SIZE + declared as usize - 1);
        let total = (bytes.len() as u16).to_be_bytes();
        bytes[0..2].copy_from_slice(&total);

        let (_, reader) = Packet::read(&bytes).expect("packet header");
        let items: Vec<_> = reader.collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_err());
        assert_eq!(items[1].clone().map(|m| m.body), Ok(ack.body));
    }

    #[test]
    fn packet_shorter_than_declared_length_is_rejected() {
        let packet =
            Packet { seq: 1, messages: vec![message(Body::HelloAck(HelloAck { receiver: addr(4) }))] };
        let bytes = packet.encode();
        assert!(matches!(Packet::read(&bytes[..bytes.len() - 2]), Err(WireError::BadLength(_))));
    }

    #[test]
    fn message_length_running_past_packet_end_stops_iteration() {
        let packet =
            Packet { seq: 1, messages: vec![message(Body::HelloAck(HelloAck { receiver: addr(4) }))] };
        let mut bytes = packet.encode();
        let size_at = PACKET_HEADER_SIZE + 2;
        bytes[size_at..size_at + 2].copy_from_slice(&500u16.to_be_bytes());

        let (_, reader) = Packet::read(&bytes).expect("packet header");
        let items: Vec<_> = reader.collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(WireError::BadLength(_))));
    }
}
