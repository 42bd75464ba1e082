//! UDP socket construction
//!
//! Sockets are built with socket2 so buffer sizes can be set before bind,
//! then handed to tokio.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;

use crate::error::NetworkError;

fn new_socket(addr: &SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(*addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

/// Bind the client's listening socket.
///
/// No address reuse is enabled: a second receiver on the same port must
/// fail rather than silently share datagrams.
pub fn bind_receiver_socket(
    addr: SocketAddr,
    recv_buffer_size: usize,
) -> Result<UdpSocket, NetworkError> {
    let socket = new_socket(&addr).map_err(|e| NetworkError::BindFailed(e.to_string()))?;

    if let Err(e) = socket.set_recv_buffer_size(recv_buffer_size) {
        tracing::warn!("Could not set receive buffer to {} bytes: {}", recv_buffer_size, e);
    }

    socket
        .bind(&SockAddr::from(addr))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;

    UdpSocket::from_std(socket.into()).map_err(|e| NetworkError::BindFailed(e.to_string()))
}

/// Bind a fresh ephemeral socket for one send session, matching the address
/// family of `destination`.
pub fn bind_sender_socket(destination: SocketAddr) -> Result<UdpSocket, NetworkError> {
    let local = SocketAddr::new(unspecified_for(&destination.ip()), 0);
    let socket = new_socket(&local).map_err(|e| NetworkError::BindFailed(e.to_string()))?;
    socket
        .bind(&SockAddr::from(local))
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", local, e)))?;

    UdpSocket::from_std(socket.into()).map_err(|e| NetworkError::BindFailed(e.to_string()))
}

pub(crate) fn unspecified_for(ip: &IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
