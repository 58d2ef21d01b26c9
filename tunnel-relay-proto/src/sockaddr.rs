//! Conversion of a textual numeric host and a port into a binary socket address.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("host is empty")]
    EmptyHost,

    #[error("port must not be zero")]
    ZeroPort,

    #[error("\"{0}\" is not a numeric IPv4 or IPv6 address")]
    NotNumeric(String),
}

/// Converts a numeric host (an IPv4 or IPv6 literal, never a domain name) and a port into a
/// [`SocketAddr`]. No DNS lookup is ever made.
///
/// IPv6 literals are written without brackets and may carry a numeric scope id, as in
/// `fe80::1%2`.
pub fn convert_address(host: &str, port: u16) -> Result<SocketAddr, ConvertError> {
    if host.is_empty() {
        return Err(ConvertError::EmptyHost);
    }

    if port == 0 {
        return Err(ConvertError::ZeroPort);
    }

    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)));
    }

    let (ip_str, scope_str) = match host.split_once('%') {
        Some((ip_str, scope_str)) => (ip_str, Some(scope_str)),
        None => (host, None),
    };

    let not_numeric = || ConvertError::NotNumeric(host.to_string());
    let ip = ip_str.parse::<Ipv6Addr>().map_err(|_| not_numeric())?;
    let scope_id = match scope_str {
        Some(s) => s.parse::<u32>().map_err(|_| not_numeric())?,
        None => 0,
    };

    Ok(SocketAddr::V6(SocketAddrV6::new(ip, port, 0, scope_id)))
}
