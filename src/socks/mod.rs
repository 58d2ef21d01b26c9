//! The SOCKS5 protocol plugged into the relay engine.

mod socks5;

pub use socks5::*;
