use std::net::Ipv4Addr;

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to bind control socket on {iface}: {reason}")]
    SocketBind { iface: Ipv4Addr, reason: String },

    #[error("no route to {0}")]
    NoRouteToHost(Ipv4Addr),

    #[error("no usable interface to run on")]
    NoInterfaces,

    #[error("engine already started")]
    AlreadyStarted,
}
