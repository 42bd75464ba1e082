//! HTTP control plane
//!
//! The server side lists the catalog and starts stream sessions; the client
//! side is a thin wrapper over the same two routes.

pub mod client;
pub mod handlers;
pub mod server;

pub use client::ControlClient;
pub use server::{router, ControlEndpoint, ControlServer, StreamTicket};
