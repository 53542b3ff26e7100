//! # olsrx-wire
//!
//! Wire codec for the olsrx MANET routing stack.
//!
//! This crate implements the binary control-message format spoken by the
//! olsrx engine: an OLSR-style packet envelope carrying HELLO, HELLO-ACK,
//! TC, MID and HNA messages, extended with per-link ETX values and the
//! sender's position/velocity/neighbor-churn fields. The format is *not*
//! interoperable with plain RFC 3626 speakers: the HELLO payload carries
//! extra fields and HELLO-ACK is a new message type.
//!
//! ## Packet layout
//!
//! ```text
//! [length:2][seq:2] ( [type:1][vtime:1][size:2][originator:4][ttl:1][hops:1][seq:2][body] )*
//! ```
//!
//! All integers are network byte order. Validity times use the RFC 3626
//! mantissa/exponent encoding, see [`vtime`].
//!
//! ## Crate family
//!
//! - **`olsrx-wire`** (this crate) — packet framing and message bodies
//! - `olsrx-engine` — protocol state, MPR election, route computation

pub mod packet;
pub mod vtime;

pub use packet::{
    Body, Hello, HelloAck, Hna, LinkCode, LinkEntry, LinkMessage, LinkType, Message, MessageKind,
    MessageReader, Mid, NeighborType, Packet, Tc, WireError, Willingness,
};

/// UDP port control traffic is exchanged on.
pub const OLSR_PORT: u16 = 698;

/// ETX sentinel for a link that has never seen an acknowledgment.
pub const ETX_SATURATION: u32 = 100;

/// Upper bound on messages packed into one datagram.
pub const MAX_MESSAGES_PER_PACKET: usize = 64;

/// Sequence numbers (packet, message, ANSN) wrap at 2^16.
pub const MAX_SEQ_NUM: u16 = u16::MAX;
