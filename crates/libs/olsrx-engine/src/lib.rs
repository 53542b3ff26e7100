//! # olsrx-engine
//!
//! An extended OLSR routing engine for mobile ad-hoc IPv4 networks.
//!
//! On top of RFC 3626's neighbor discovery, MPR flooding and topology
//! dissemination, this engine measures per-link ETX through a
//! HELLO/HELLO-ACK probe loop, tracks mobility-derived link predictors
//! (link-hold time, link-stability deviation, neighbor churn rate), and
//! computes routes that minimize accumulated ETX instead of hop count.
//!
//! The engine is deliberately inert: it performs no I/O and reads no
//! clock. The surrounding runtime feeds it received datagrams
//! ([`Engine::handle_datagram`]) and drives its timers
//! ([`Engine::next_wakeup`] / [`Engine::run_due`]); the engine talks back
//! through the trait handles in [`node`]. That makes a whole multi-node
//! network single-threadedly reproducible under a discrete-event clock.
//!
//! ```no_run
//! use std::sync::Arc;
//! use olsrx_engine::{Config, Engine, Timestamp};
//! # use olsrx_engine::node::{DatagramSink, Ipv4Provider, MobilityOracle};
//! # fn runtime_handles() -> (Arc<dyn Ipv4Provider>, Arc<dyn DatagramSink>, Arc<dyn MobilityOracle>) { unimplemented!() }
//!
//! let (ipv4, sink, mobility) = runtime_handles();
//! let mut engine = Engine::new(Config::default(), ipv4, sink, mobility);
//! engine.start(Timestamp::ZERO)?;
//! while let Some(at) = engine.next_wakeup() {
//!     // advance the simulation clock to `at`, deliver datagrams, then:
//!     engine.run_due(at);
//! }
//! # Ok::<(), olsrx_engine::EngineError>(())
//! ```
//!
//! ## Crate family
//!
//! - `olsrx-wire` — packet framing and message bodies
//! - **`olsrx-engine`** (this crate) — protocol state and route computation

pub mod config;
pub mod engine;
pub mod error;
pub mod node;
pub mod state;
pub mod time;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Config;
pub use engine::routes::{ForwardDecision, NetworkRoute, RouteEntry, RouteTable, StaticRoute};
pub use engine::Engine;
pub use error::EngineError;
pub use node::{DatagramSink, EngineObserver, InterfaceAddr, Ipv4Provider, MobilityOracle, Vec3};
pub use time::{Scheduler, Timestamp, TimerId};
