//! The destination-address field used by SOCKS5-style proxy protocols.
//!
//! On the wire the field is a one-byte type tag, followed by the address payload, followed by a
//! big-endian port:
//!
//! | Type tag | Payload                     | Port    |
//! |----------|-----------------------------|---------|
//! | `0x01`   | 4 raw IPv4 bytes            | 2 bytes |
//! | `0x03`   | 1-byte length + name bytes  | 2 bytes |
//! | `0x04`   | 16 raw IPv6 bytes           | 2 bytes |
//!
//! Any other tag is invalid.

use std::{
    fmt,
    io::{self, Error, ErrorKind},
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    domainname::{Domainname, MAX_DOMAINNAME_LEN},
    serialize::{ByteRead, ByteWrite, U8ReprEnum},
};

const TAG_LEN: usize = 1;
const PORT_LEN: usize = 2;

/// The type tag at the start of an address field.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    IPv4 = 1,
    Domainname = 3,
    IPv6 = 4,
}

impl U8ReprEnum for AddressType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::IPv4),
            3 => Some(Self::Domainname),
            4 => Some(Self::IPv6),
            _ => None,
        }
    }

    fn into_u8(self) -> u8 {
        self as u8
    }
}

/// Errors produced when parsing or serializing an address field. On error, nothing is written to
/// the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("invalid address type byte {0:#04x}")]
    InvalidType(u8),

    /// Fewer bytes are available than the field requires. When parsing from a stream this means
    /// more bytes must be read before trying again.
    #[error("address field needs {needed} bytes but only {available} are available")]
    Truncated { needed: usize, available: usize },

    #[error("domain name of {len} bytes doesn't fit in {capacity} bytes")]
    DomainnameTooLong { len: usize, capacity: usize },

    #[error("buffer of {available} bytes is too small for a {needed}-byte address field")]
    BufferTooSmall { needed: usize, available: usize },
}

/// A destination address: an IPv4 address, an IPv6 address or a domain name, with a port.
///
/// Only what the wire format carries is stored, so IPv6 flow info and scope ids are dropped when
/// converting from a [`SocketAddr`].
///
/// `N` is the storage capacity for domain names, see [`Domainname`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocksAddress<const N: usize = MAX_DOMAINNAME_LEN> {
    IPv4(Ipv4Addr, u16),
    IPv6(Ipv6Addr, u16),
    Domainname(Domainname<N>, u16),
}

fn ensure_len(data: &[u8], needed: usize) -> Result<(), AddressError> {
    match data.len() < needed {
        true => Err(AddressError::Truncated {
            needed,
            available: data.len(),
        }),
        false => Ok(()),
    }
}

fn read_port(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

impl<const N: usize> SocksAddress<N> {
    /// Parses an address field from the start of `data`. Trailing bytes are ignored.
    pub fn parse(data: &[u8]) -> Result<Self, AddressError> {
        Self::parse_prefix(data).map(|(address, _)| address)
    }

    /// Parses an address field from the start of `data`, returning the address and the amount of
    /// bytes the field occupied.
    pub fn parse_prefix(data: &[u8]) -> Result<(Self, usize), AddressError> {
        ensure_len(data, TAG_LEN)?;
        let addr_type = AddressType::from_u8(data[0]).ok_or(AddressError::InvalidType(data[0]))?;

        match addr_type {
            AddressType::IPv4 => {
                let size = TAG_LEN + 4 + PORT_LEN;
                ensure_len(data, size)?;

                let octets: [u8; 4] = [data[1], data[2], data[3], data[4]];
                Ok((Self::IPv4(Ipv4Addr::from(octets), read_port(data, 5)), size))
            }
            AddressType::IPv6 => {
                let size = TAG_LEN + 16 + PORT_LEN;
                ensure_len(data, size)?;

                let mut octets = [0u8; 16];
                octets.copy_from_slice(&data[1..17]);
                Ok((Self::IPv6(Ipv6Addr::from(octets), read_port(data, 17)), size))
            }
            AddressType::Domainname => {
                ensure_len(data, TAG_LEN + 1)?;
                let len = data[1] as usize;
                if len > Domainname::<N>::CAPACITY {
                    return Err(AddressError::DomainnameTooLong {
                        len,
                        capacity: Domainname::<N>::CAPACITY,
                    });
                }

                let size = TAG_LEN + 1 + len + PORT_LEN;
                ensure_len(data, size)?;

                let name_end = TAG_LEN + 1 + len;
                let name = Domainname::from_bytes(&data[(TAG_LEN + 1)..name_end]).ok_or(AddressError::DomainnameTooLong {
                    len,
                    capacity: Domainname::<N>::CAPACITY,
                })?;

                Ok((Self::Domainname(name, read_port(data, name_end)), size))
            }
        }
    }

    pub fn address_type(&self) -> AddressType {
        match self {
            Self::IPv4(_, _) => AddressType::IPv4,
            Self::IPv6(_, _) => AddressType::IPv6,
            Self::Domainname(_, _) => AddressType::Domainname,
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            Self::IPv4(_, port) | Self::IPv6(_, port) | Self::Domainname(_, port) => *port,
        }
    }

    /// Returns this address as a [`SocketAddr`], or `None` if it is a domain name.
    pub fn as_socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::IPv4(ip, port) => Some(SocketAddr::new((*ip).into(), *port)),
            Self::IPv6(ip, port) => Some(SocketAddr::new((*ip).into(), *port)),
            Self::Domainname(_, _) => None,
        }
    }

    /// The exact amount of bytes this address occupies on the wire.
    pub fn wire_size(&self) -> usize {
        let payload = match self {
            Self::IPv4(_, _) => 4,
            Self::IPv6(_, _) => 16,
            Self::Domainname(name, _) => 1 + name.len(),
        };

        TAG_LEN + payload + PORT_LEN
    }

    /// Writes this address into the start of `buffer`, returning the written portion of it.
    ///
    /// Fails without writing anything if `buffer` is shorter than [`Self::wire_size`].
    pub fn serialize<'a>(&self, buffer: &'a mut [u8]) -> Result<&'a mut [u8], AddressError> {
        let size = self.wire_size();
        if buffer.len() < size {
            return Err(AddressError::BufferTooSmall {
                needed: size,
                available: buffer.len(),
            });
        }

        buffer[0] = self.address_type().into_u8();
        let port_offset = match self {
            Self::IPv4(ip, _) => {
                buffer[1..5].copy_from_slice(&ip.octets());
                5
            }
            Self::IPv6(ip, _) => {
                buffer[1..17].copy_from_slice(&ip.octets());
                17
            }
            Self::Domainname(name, _) => {
                buffer[1] = name.len() as u8;
                buffer[2..(2 + name.len())].copy_from_slice(name.as_bytes());
                2 + name.len()
            }
        };

        buffer[port_offset..(port_offset + PORT_LEN)].copy_from_slice(&self.port().to_be_bytes());
        Ok(&mut buffer[..size])
    }

    /// Serializes this address into a newly allocated vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut vec = vec![0u8; self.wire_size()];
        // The vector was sized with wire_size(), so serialize cannot fail.
        let _ = self.serialize(&mut vec);
        vec
    }
}

impl<const N: usize> From<SocketAddr> for SocksAddress<N> {
    fn from(value: SocketAddr) -> Self {
        match value {
            SocketAddr::V4(v4) => Self::IPv4(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => Self::IPv6(*v6.ip(), v6.port()),
        }
    }
}

impl<const N: usize> fmt::Display for SocksAddress<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IPv4(ip, port) => write!(f, "{ip}:{port}"),
            Self::IPv6(ip, port) => write!(f, "[{ip}]:{port}"),
            Self::Domainname(name, port) => write!(f, "{name}:{port}"),
        }
    }
}

impl<const N: usize> ByteWrite for SocksAddress<N> {
    async fn write<W: AsyncWrite + Unpin + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.to_vec()).await
    }
}

impl<const N: usize> ByteRead for SocksAddress<N> {
    async fn read<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let type_u8 = reader.read_u8().await?;
        let address = match AddressType::from_u8(type_u8) {
            Some(AddressType::IPv4) => {
                let mut octets = [0u8; 4];
                reader.read_exact(&mut octets).await?;
                Self::IPv4(octets.into(), reader.read_u16().await?)
            }
            Some(AddressType::IPv6) => {
                let mut octets = [0u8; 16];
                reader.read_exact(&mut octets).await?;
                Self::IPv6(octets.into(), reader.read_u16().await?)
            }
            Some(AddressType::Domainname) => {
                let len = reader.read_u8().await? as usize;
                if len > Domainname::<N>::CAPACITY {
                    return Err(Error::new(ErrorKind::InvalidData, "Domain name doesn't fit in its storage"));
                }

                let mut buf = [0u8; MAX_DOMAINNAME_LEN];
                reader.read_exact(&mut buf[..len]).await?;
                let name = Domainname::from_bytes(&buf[..len]).ok_or(Error::new(ErrorKind::InvalidData, "Domain name too long"))?;
                Self::Domainname(name, reader.read_u16().await?)
            }
            None => return Err(Error::new(ErrorKind::InvalidData, "Invalid address type byte")),
        };

        Ok(address)
    }
}
