//! Wire-level building blocks shared by the relay engine and the protocols plugged into it.
//!
//! - [`address`] holds [`SocksAddress`], the destination-address field used by SOCKS5-style
//! proxy protocols, together with its synchronous wire codec.
//! - [`sockaddr`] converts a numeric host string and a port into a [`SocketAddr`](std::net::SocketAddr)
//! without ever doing a DNS lookup.
//! - [`serialize`] provides the async [`ByteRead`](serialize::ByteRead) and
//! [`ByteWrite`](serialize::ByteWrite) traits for reading and writing these values straight
//! from and to tokio streams.

pub mod address;
pub mod domainname;
pub mod serialize;
pub mod sockaddr;

pub use address::{AddressError, AddressType, SocksAddress};
pub use domainname::{Domainname, MAX_DOMAINNAME_LEN};
pub use sockaddr::{convert_address, ConvertError};
