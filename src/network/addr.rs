//! Local address discovery
//!
//! The client has to tell the server where to send frames. Which local
//! address is reachable depends on the route to the server, so the lookup is
//! a trait the client flow is given rather than a hard-wired probe.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, SocketAddr};

use crate::error::NetworkError;
use crate::network::udp::unspecified_for;

/// Answers "which of my addresses does `peer` reach me on?"
pub trait LocalAddrResolver: Send + Sync {
    fn local_ip_for(&self, peer: SocketAddr) -> Result<IpAddr, NetworkError>;
}

/// Asks the OS which interface routes to the peer by connecting an unbound
/// UDP socket. Connecting a datagram socket sends nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteProbe;

impl LocalAddrResolver for RouteProbe {
    fn local_ip_for(&self, peer: SocketAddr) -> Result<IpAddr, NetworkError> {
        let probe = || -> std::io::Result<Option<SocketAddr>> {
            let socket = Socket::new(Domain::for_address(peer), Type::DGRAM, Some(Protocol::UDP))?;
            socket.bind(&SockAddr::from(SocketAddr::new(unspecified_for(&peer.ip()), 0)))?;
            socket.connect(&SockAddr::from(peer))?;
            Ok(socket.local_addr()?.as_socket())
        };

        match probe() {
            Ok(Some(local)) if !local.ip().is_unspecified() => Ok(local.ip()),
            Ok(_) => Err(NetworkError::ConnectionFailed(format!("no route to {}", peer))),
            Err(e) => Err(NetworkError::ConnectionFailed(format!("route to {}: {}", peer, e))),
        }
    }
}

/// Always advertises the same address
#[derive(Debug, Clone, Copy)]
pub struct FixedAddr(pub IpAddr);

impl LocalAddrResolver for FixedAddr {
    fn local_ip_for(&self, _peer: SocketAddr) -> Result<IpAddr, NetworkError> {
        Ok(self.0)
    }
}
