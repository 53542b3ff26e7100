//! Shared mocks for unit tests.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::node::{DatagramSink, InterfaceAddr, Ipv4Provider, MobilityOracle, Vec3};
use crate::time::Timestamp;

pub(crate) struct StaticIpv4(pub Vec<InterfaceAddr>);

impl Ipv4Provider for StaticIpv4 {
    fn interfaces(&self) -> Vec<InterfaceAddr> {
        self.0.clone()
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    pub sent: Mutex<Vec<(Ipv4Addr, Vec<u8>)>>,
}

impl DatagramSink for RecordingSink {
    fn bind(&self, _iface: &InterfaceAddr) -> Result<(), EngineError> {
        Ok(())
    }

    fn send(&self, iface: &InterfaceAddr, payload: &[u8]) {
        self.sent.lock().expect("sink lock").push((iface.address, payload.to_vec()));
    }
}

pub(crate) struct FixedMobility {
    pub position: Vec3,
    pub velocity: Vec3,
}

impl MobilityOracle for FixedMobility {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

pub(crate) fn addr(last: u8) -> Ipv4Addr {
    Ipv4Addr::new(10, 1, 1, last)
}

/// A started single-interface engine at 10.1.1.<last>, clock at zero.
pub(crate) fn test_engine(last: u8) -> (Engine, Arc<RecordingSink>) {
    test_engine_with(last, Config::default())
}

pub(crate) fn test_engine_with(last: u8, config: Config) -> (Engine, Arc<RecordingSink>) {
    let iface = InterfaceAddr { index: 1, address: addr(last) };
    let sink = Arc::new(RecordingSink::default());
    let mut engine = Engine::new(
        config,
        Arc::new(StaticIpv4(vec![iface])),
        sink.clone(),
        Arc::new(FixedMobility { position: Vec3::default(), velocity: Vec3::default() }),
    );
    engine.start(Timestamp::ZERO).expect("engine start");
    (engine, sink)
}
