//! A single-threaded connection-relay engine.
//!
//! Each accepted connection becomes a [`Tunnel`](tunnel::Tunnel) pairing it with one outgoing
//! connection. A [`TunnelProtocol`](tunnel::TunnelProtocol) implementation decides what to do
//! with the bytes; [`socks::Socks5`] is the one shipped with the relay binary.

pub mod config;
pub mod socks;
pub mod tunnel;
pub mod utils;
