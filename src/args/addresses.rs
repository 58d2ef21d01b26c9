use std::{
    fmt,
    io::ErrorKind,
    net::{IpAddr, SocketAddr, ToSocketAddrs},
};

#[derive(Debug, PartialEq, Eq)]
pub enum SocketErrorType {
    UnexpectedEnd(String),
    InvalidSocketAddress(String, String),
}

impl fmt::Display for SocketErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd(arg) => write!(f, "Expected socket address after {arg}"),
            Self::InvalidSocketAddress(arg, addr) => write!(f, "Invalid socket address after {arg}: {addr}"),
        }
    }
}

/// Parses a socket address argument, doing domain name resolution if necessary. The resulting
/// [`SocketAddr`] instances are pushed onto a `result_vec` vector, skipping duplicates.
///
/// If the address has no port, `default_port` is used.
pub(super) fn parse_socket_arg(
    result_vec: &mut Vec<SocketAddr>,
    arg: String,
    maybe_arg2: Option<String>,
    default_port: u16,
) -> Result<(), SocketErrorType> {
    let arg2 = match maybe_arg2 {
        Some(value) => value,
        None => return Err(SocketErrorType::UnexpectedEnd(arg)),
    };

    if let Ok(ip) = arg2.parse::<IpAddr>() {
        let sockaddr = SocketAddr::new(ip, default_port);
        if !result_vec.contains(&sockaddr) {
            result_vec.push(sockaddr);
        }

        return Ok(());
    }

    let iter = match arg2.to_socket_addrs() {
        Ok(iter) => iter,
        Err(err) if err.kind() == ErrorKind::InvalidInput && (!arg2.contains(':') || arg2.ends_with(']')) => match format!("{arg2}:{default_port}").to_socket_addrs() {
            Ok(iter) => iter,
            Err(_) => return Err(SocketErrorType::InvalidSocketAddress(arg, arg2)),
        },
        Err(_) => return Err(SocketErrorType::InvalidSocketAddress(arg, arg2)),
    };

    for sockaddr in iter {
        if !result_vec.contains(&sockaddr) {
            result_vec.push(sockaddr);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::{parse_socket_arg, SocketErrorType};

    fn parse(value: &str) -> Result<Vec<SocketAddr>, SocketErrorType> {
        let mut result = Vec::new();
        parse_socket_arg(&mut result, "--listen".to_string(), Some(value.to_string()), 1080)?;
        Ok(result)
    }

    #[test]
    fn test_with_port() {
        assert_eq!(parse("127.0.0.1:8080"), Ok(vec!["127.0.0.1:8080".parse().unwrap()]));
        assert_eq!(parse("[::1]:8080"), Ok(vec!["[::1]:8080".parse().unwrap()]));
    }

    #[test]
    fn test_default_port() {
        assert_eq!(parse("127.0.0.1"), Ok(vec!["127.0.0.1:1080".parse().unwrap()]));
        assert_eq!(parse("::1"), Ok(vec!["[::1]:1080".parse().unwrap()]));
        assert_eq!(parse("[::]"), Ok(vec!["[::]:1080".parse().unwrap()]));
    }

    #[test]
    fn test_invalid() {
        assert_eq!(
            parse("127.0.0.1:notaport"),
            Err(SocketErrorType::InvalidSocketAddress("--listen".to_string(), "127.0.0.1:notaport".to_string()))
        );

        let mut result = Vec::new();
        assert_eq!(
            parse_socket_arg(&mut result, "-l".to_string(), None, 1080),
            Err(SocketErrorType::UnexpectedEnd("-l".to_string()))
        );
    }
}
