//! Network subsystem for the UDP data plane

pub mod addr;
pub mod receiver;
pub mod sender;
pub mod udp;

pub use addr::{FixedAddr, LocalAddrResolver, RouteProbe};
pub use receiver::{ReceivedStream, ReceiverState, StreamReceiver};
pub use sender::{FrameReader, SessionReport, StreamSender};
pub use udp::{bind_receiver_socket, bind_sender_socket};
