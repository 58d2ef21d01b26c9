use std::{
    io::{self, Error, ErrorKind},
    net::SocketAddr,
};

use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{debug, info, trace};
use tunnel_relay_proto::{
    serialize::{ByteRead, U8ReprEnum},
    AddressError, SocksAddress,
};

use crate::{
    tunnel::{SocketError, SocketSide, Tunnel, TunnelProtocol},
    utils::UNSPECIFIED_SOCKADDR_V4,
};

pub const VERSION_BYTE: u8 = 5;

pub const METHOD_NO_AUTH: u8 = 0;
pub const METHOD_NONE_ACCEPTABLE: u8 = 0xFF;

pub const CMD_CONNECT: u8 = 1;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksStatus {
    Succeeded = 0,
    GeneralFailure = 1,
    NotAllowedByRuleset = 2,
    NetworkUnreachable = 3,
    HostUnreachable = 4,
    ConnectionRefused = 5,
    TTLExpired = 6,
    CommandNotSupported = 7,
    AtypNotSupported = 8,
}

impl From<ErrorKind> for SocksStatus {
    fn from(value: ErrorKind) -> Self {
        match value {
            ErrorKind::ConnectionAborted | ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset => SocksStatus::ConnectionRefused,
            ErrorKind::NetworkUnreachable | ErrorKind::NotConnected => SocksStatus::NetworkUnreachable,
            ErrorKind::HostUnreachable | ErrorKind::TimedOut => SocksStatus::HostUnreachable,
            ErrorKind::PermissionDenied => SocksStatus::NotAllowedByRuleset,
            ErrorKind::AddrNotAvailable | ErrorKind::Unsupported => SocksStatus::AtypNotSupported,
            _ => SocksStatus::GeneralFailure,
        }
    }
}

impl From<SocketError> for SocksStatus {
    fn from(value: SocketError) -> Self {
        value.kind().into()
    }
}

impl U8ReprEnum for SocksStatus {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Succeeded),
            1 => Some(Self::GeneralFailure),
            2 => Some(Self::NotAllowedByRuleset),
            3 => Some(Self::NetworkUnreachable),
            4 => Some(Self::HostUnreachable),
            5 => Some(Self::ConnectionRefused),
            6 => Some(Self::TTLExpired),
            7 => Some(Self::CommandNotSupported),
            8 => Some(Self::AtypNotSupported),
            _ => None,
        }
    }

    fn into_u8(self) -> u8 {
        self as u8
    }
}

impl ByteRead for SocksStatus {
    async fn read<R: AsyncRead + Unpin + ?Sized>(reader: &mut R) -> io::Result<Self> {
        match Self::from_u8(u8::read(reader).await?) {
            Some(status) => Ok(status),
            None => Err(Error::new(ErrorKind::InvalidData, "Invalid SocksStatus type byte")),
        }
    }
}

/// A malformed or unsupported client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SocksRequestError {
    #[error("client requested invalid SOCKS version: {0}")]
    InvalidVersion(u8),

    #[error("no acceptable SOCKS5 authentication method")]
    NoAuthMethodAcceptable,

    #[error("client requested invalid SOCKS5 command: {0}")]
    InvalidCommand(u8),

    #[error("client requested invalid SOCKS5 address type: {0}")]
    InvalidAtyp(u8),
}

impl SocksRequestError {
    /// The reply to send before closing, if this error warrants one.
    fn reply_status(&self) -> Option<SocksStatus> {
        match self {
            Self::InvalidVersion(_) | Self::NoAuthMethodAcceptable => None,
            Self::InvalidCommand(_) => Some(SocksStatus::CommandNotSupported),
            Self::InvalidAtyp(_) => Some(SocksStatus::AtypNotSupported),
        }
    }
}

/// Parses the method-selection message `VER NMETHODS METHODS...`, returning whether "no
/// authentication" was offered and the length of the message, or `None` if it's incomplete.
pub fn parse_greeting(data: &[u8]) -> Result<Option<(bool, usize)>, SocksRequestError> {
    let (version, nmethods) = match data {
        [version, nmethods, ..] => (*version, *nmethods as usize),
        [version] if *version != VERSION_BYTE => return Err(SocksRequestError::InvalidVersion(*version)),
        _ => return Ok(None),
    };

    if version != VERSION_BYTE {
        return Err(SocksRequestError::InvalidVersion(version));
    }

    let len = 2 + nmethods;
    match data.get(2..len) {
        Some(methods) => Ok(Some((methods.contains(&METHOD_NO_AUTH), len))),
        None => Ok(None),
    }
}

/// Parses the request `VER CMD RSV ATYP ADDR PORT`, returning the target and the length of the
/// request, or `None` if it's incomplete.
pub fn parse_request(data: &[u8]) -> Result<Option<(SocksAddress, usize)>, SocksRequestError> {
    if let Some(&version) = data.first() {
        if version != VERSION_BYTE {
            return Err(SocksRequestError::InvalidVersion(version));
        }
    }

    if let Some(&command) = data.get(1) {
        if command != CMD_CONNECT {
            return Err(SocksRequestError::InvalidCommand(command));
        }
    }

    if data.len() < 3 {
        return Ok(None);
    }

    match SocksAddress::parse_prefix(&data[3..]) {
        Ok((target, len)) => Ok(Some((target, 3 + len))),
        Err(AddressError::Truncated { .. }) => Ok(None),
        Err(AddressError::InvalidType(atyp)) => Err(SocksRequestError::InvalidAtyp(atyp)),
        Err(error) => unreachable!("A domain name length byte can't exceed the default capacity: {error}"),
    }
}

/// Builds a reply `VER REP RSV ATYP BND.ADDR BND.PORT`.
pub fn build_reply(status: SocksStatus, bind_address: SocketAddr) -> Vec<u8> {
    let address: SocksAddress = SocksAddress::from(bind_address);
    let mut reply = Vec::with_capacity(3 + address.wire_size());
    reply.extend_from_slice(&[VERSION_BYTE, status.into_u8(), 0]);
    reply.extend_from_slice(&address.to_vec());
    reply
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Greeting,
    Request,
    Resolving,
    Connecting,
    Replying,
    Relaying,
    Closing,
}

/// A SOCKS5 server speaking the CONNECT command with no authentication.
///
/// Both handshake messages are accumulated across reads until complete, after which the tunnel
/// connects to the requested target (resolving it first if it's a domain name) and switches to
/// streaming mode, relaying bytes between both sides.
#[derive(Debug)]
pub struct Socks5 {
    phase: Phase,
    received: Vec<u8>,
    target: Option<SocksAddress>,
    bytes_to_outgoing: u64,
    bytes_to_incoming: u64,
}

impl Default for Socks5 {
    fn default() -> Self {
        Self::new()
    }
}

impl Socks5 {
    pub const fn new() -> Self {
        Self {
            phase: Phase::Greeting,
            received: Vec::new(),
            target: None,
            bytes_to_outgoing: 0,
            bytes_to_incoming: 0,
        }
    }

    /// The target requested by the client, once the request was parsed.
    pub fn target(&self) -> Option<&SocksAddress> {
        self.target.as_ref()
    }

    /// Bytes relayed from the client to the target.
    pub fn bytes_to_outgoing(&self) -> u64 {
        self.bytes_to_outgoing
    }

    /// Bytes relayed from the target back to the client.
    pub fn bytes_to_incoming(&self) -> u64 {
        self.bytes_to_incoming
    }

    fn continue_reading(tunnel: &mut Tunnel<Self>) {
        tunnel.read_start(SocketSide::Incoming);
    }

    fn reject(tunnel: &mut Tunnel<Self>, error: SocksRequestError) {
        debug!(tunnel = tunnel.id(), %error, "Rejecting SOCKS5 client");
        match error {
            SocksRequestError::NoAuthMethodAcceptable => {
                Self::send_then_close(tunnel, vec![VERSION_BYTE, METHOD_NONE_ACCEPTABLE]);
            }
            _ => match error.reply_status() {
                Some(status) => Self::send_then_close(tunnel, build_reply(status, UNSPECIFIED_SOCKADDR_V4)),
                None => tunnel.shutdown(),
            },
        }
    }

    fn send_then_close(tunnel: &mut Tunnel<Self>, data: Vec<u8>) {
        tunnel.protocol_mut().phase = Phase::Closing;
        tunnel.write(SocketSide::Incoming, data);
    }

    fn process_greeting(tunnel: &mut Tunnel<Self>) {
        let protocol = tunnel.protocol_mut();
        match parse_greeting(&protocol.received) {
            Ok(None) => Self::continue_reading(tunnel),
            Ok(Some((true, len))) => {
                protocol.received.drain(..len);
                protocol.phase = Phase::Request;
                tunnel.write(SocketSide::Incoming, vec![VERSION_BYTE, METHOD_NO_AUTH]);
            }
            Ok(Some((false, _))) => Self::reject(tunnel, SocksRequestError::NoAuthMethodAcceptable),
            Err(error) => Self::reject(tunnel, error),
        }
    }

    fn process_request(tunnel: &mut Tunnel<Self>) {
        let protocol = tunnel.protocol_mut();
        let (target, len) = match parse_request(&protocol.received) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return Self::continue_reading(tunnel),
            Err(error) => return Self::reject(tunnel, error),
        };

        protocol.received.drain(..len);
        protocol.target = Some(target);
        debug!(tunnel = tunnel.id(), %target, "SOCKS5 CONNECT requested");

        match target {
            SocksAddress::Domainname(name, port) => match name.as_str() {
                Some(hostname) => {
                    tunnel.protocol_mut().phase = Phase::Resolving;
                    tunnel.resolve(SocketSide::Outgoing, hostname, port);
                }
                None => Self::send_then_close(tunnel, build_reply(SocksStatus::HostUnreachable, UNSPECIFIED_SOCKADDR_V4)),
            },
            ip => {
                if let Some(address) = ip.as_socket_addr() {
                    tunnel.socket_mut(SocketSide::Outgoing).set_address(address);
                }

                tunnel.protocol_mut().phase = Phase::Connecting;
                tunnel.connect(SocketSide::Outgoing);
            }
        }
    }

    fn start_relaying(tunnel: &mut Tunnel<Self>) {
        let protocol = tunnel.protocol_mut();
        protocol.phase = Phase::Relaying;
        let early_data = std::mem::take(&mut protocol.received);

        trace!(tunnel = tunnel.id(), early = early_data.len(), "Relaying");
        tunnel.read_start(SocketSide::Outgoing);
        match early_data.is_empty() {
            true => tunnel.read_start(SocketSide::Incoming),
            false => {
                tunnel.protocol_mut().bytes_to_outgoing += early_data.len() as u64;
                tunnel.write(SocketSide::Outgoing, early_data);
            }
        }
    }
}

impl TunnelProtocol for Socks5 {
    fn on_dying(tunnel: &mut Tunnel<Self>) {
        let protocol = tunnel.protocol();
        info!(
            tunnel = tunnel.id(),
            target = ?protocol.target.map(|t| t.to_string()),
            to_outgoing = protocol.bytes_to_outgoing,
            to_incoming = protocol.bytes_to_incoming,
            "SOCKS5 tunnel closed"
        );
    }

    fn on_timeout_expired(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        debug!(tunnel = tunnel.id(), %side, phase = ?tunnel.protocol().phase, "SOCKS5 tunnel timed out");
    }

    fn on_outgoing_connected(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        let outgoing = tunnel.socket(side);
        let reply = match outgoing.result() {
            Ok(_) => match outgoing.local_addr() {
                Ok(bind_address) => build_reply(SocksStatus::Succeeded, bind_address),
                Err(error) => build_reply(SocksStatus::from(error.kind()), UNSPECIFIED_SOCKADDR_V4),
            },
            Err(error) => build_reply(SocksStatus::from(error), UNSPECIFIED_SOCKADDR_V4),
        };

        match reply[1] == SocksStatus::Succeeded.into_u8() {
            true => {
                tunnel.protocol_mut().phase = Phase::Replying;
                tunnel.write(SocketSide::Incoming, reply);
            }
            false => Self::send_then_close(tunnel, reply),
        }
    }

    fn on_read_done(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        let data = tunnel.socket(side).read_data().to_vec();
        tunnel.read_stop(side);

        let protocol = tunnel.protocol_mut();
        match protocol.phase {
            Phase::Greeting => {
                protocol.received.extend_from_slice(&data);
                Self::process_greeting(tunnel);
            }
            Phase::Request => {
                protocol.received.extend_from_slice(&data);
                Self::process_request(tunnel);
            }
            Phase::Relaying => {
                match side {
                    SocketSide::Incoming => protocol.bytes_to_outgoing += data.len() as u64,
                    SocketSide::Outgoing => protocol.bytes_to_incoming += data.len() as u64,
                }

                tunnel.write(side.other(), data);
            }
            phase => panic!("SOCKS5 tunnel {} read data during phase {phase:?}", tunnel.id()),
        }
    }

    fn on_write_done(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        if let Err(error) = tunnel.socket(side).result() {
            debug!(tunnel = tunnel.id(), %side, %error, "SOCKS5 write failed");
            return tunnel.shutdown();
        }

        match tunnel.protocol().phase {
            Phase::Request => Self::process_request(tunnel),
            Phase::Replying => Self::start_relaying(tunnel),
            Phase::Relaying => tunnel.read_start(side.other()),
            Phase::Closing => tunnel.shutdown(),
            phase => panic!("SOCKS5 tunnel {} wrote data during phase {phase:?}", tunnel.id()),
        }
    }

    fn on_resolution_done(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        match tunnel.socket(side).result() {
            Ok(_) => {
                tunnel.protocol_mut().phase = Phase::Connecting;
                tunnel.connect(side);
            }
            Err(error) => {
                debug!(tunnel = tunnel.id(), %error, "SOCKS5 target resolution failed");
                Self::send_then_close(tunnel, build_reply(SocksStatus::HostUnreachable, UNSPECIFIED_SOCKADDR_V4));
            }
        }
    }

    fn is_streaming(tunnel: &Tunnel<Self>) -> bool {
        tunnel.protocol().phase == Phase::Relaying
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };
    use tunnel_relay_proto::{
        serialize::{ByteRead, ByteWrite},
        Domainname, SocksAddress,
    };

    use crate::{
        config::TunnelConfig,
        tunnel::Tunnel,
        utils::test_utils::{refused_address, tcp_pair},
    };

    use super::{parse_greeting, parse_request, Socks5, SocksRequestError, SocksStatus};

    #[test]
    fn test_parse_greeting() {
        assert_eq!(parse_greeting(&[]), Ok(None));
        assert_eq!(parse_greeting(&[5]), Ok(None));
        assert_eq!(parse_greeting(&[5, 2, 0]), Ok(None));
        assert_eq!(parse_greeting(&[5, 2, 2, 0]), Ok(Some((true, 4))));
        assert_eq!(parse_greeting(&[5, 1, 2, 9, 9]), Ok(Some((false, 3))));
        assert_eq!(parse_greeting(&[4]), Err(SocksRequestError::InvalidVersion(4)));
        assert_eq!(parse_greeting(&[4, 1, 0]), Err(SocksRequestError::InvalidVersion(4)));
    }

    #[test]
    fn test_parse_request() {
        assert_eq!(parse_request(&[5, 1, 0]), Ok(None));
        assert_eq!(parse_request(&[5, 1, 0, 1, 127, 0]), Ok(None));
        assert_eq!(parse_request(&[5, 2]), Err(SocksRequestError::InvalidCommand(2)));
        assert_eq!(parse_request(&[5, 1, 0, 2, 0]), Err(SocksRequestError::InvalidAtyp(2)));

        let (target, len) = parse_request(&[5, 1, 0, 1, 10, 0, 0, 1, 0x01, 0xBB, 0xAA]).unwrap().unwrap();
        assert_eq!(len, 10);
        assert_eq!(target.to_string(), "10.0.0.1:443");

        let (target, len) = parse_request(&[5, 1, 0, 3, 3, b'a', b'b', b'c', 0, 80]).unwrap().unwrap();
        assert_eq!(len, 10);
        assert_eq!(target, SocksAddress::Domainname(Domainname::try_from("abc").unwrap(), 80));
    }

    #[test]
    fn test_status_from_error_kind() {
        use std::io::ErrorKind;

        assert_eq!(SocksStatus::from(ErrorKind::ConnectionRefused), SocksStatus::ConnectionRefused);
        assert_eq!(SocksStatus::from(ErrorKind::NetworkUnreachable), SocksStatus::NetworkUnreachable);
        assert_eq!(SocksStatus::from(ErrorKind::HostUnreachable), SocksStatus::HostUnreachable);
        assert_eq!(SocksStatus::from(ErrorKind::TimedOut), SocksStatus::HostUnreachable);
        assert_eq!(SocksStatus::from(ErrorKind::Other), SocksStatus::GeneralFailure);
    }

    async fn echo_server(listener: TcpListener) -> SocketAddr {
        let (mut stream, peer) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        loop {
            let len = stream.read(&mut buf).await.unwrap_or(0);
            if len == 0 {
                return peer;
            }

            stream.write_all(&buf[..len]).await.unwrap();
        }
    }

    async fn read_reply(client: &mut TcpStream) -> (SocksStatus, SocksAddress) {
        assert_eq!(client.read_u8().await.unwrap(), 5);
        let status = SocksStatus::read(client).await.unwrap();
        assert_eq!(client.read_u8().await.unwrap(), 0);
        (status, SocksAddress::read(client).await.unwrap())
    }

    async fn socks_tunnel() -> (Tunnel<Socks5>, TcpStream) {
        let (client, accepted) = tcp_pair().await;
        let tunnel = Tunnel::initialize(accepted, &TunnelConfig::default(), Socks5::new(), |_| true);
        (tunnel, client)
    }

    async fn relay_roundtrip(target: SocksAddress, listener: TcpListener) {
        let (mut tunnel, mut client) = socks_tunnel().await;

        let client_task = async move {
            client.write_all(&[5, 1, 0]).await.unwrap();
            let mut method = [0u8; 2];
            client.read_exact(&mut method).await.unwrap();
            assert_eq!(method, [5, 0]);

            client.write_all(&[5, 1, 0]).await.unwrap();
            target.write(&mut client).await.unwrap();
            let (status, bound) = read_reply(&mut client).await;
            assert_eq!(status, SocksStatus::Succeeded);

            client.write_all(b"ping through the relay").await.unwrap();
            let mut buf = [0u8; 22];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"ping through the relay");
            bound
        };

        let (_, bound, peer) = tokio::join!(tunnel.run(), client_task, echo_server(listener));

        assert_eq!(bound.as_socket_addr(), Some(peer));
        assert_eq!(tunnel.protocol().bytes_to_outgoing(), 22);
        assert_eq!(tunnel.protocol().bytes_to_incoming(), 22);
        assert!(tunnel.is_released());
    }

    #[tokio::test]
    async fn test_relay_to_ip_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = SocksAddress::from(listener.local_addr().unwrap());
        relay_roundtrip(target, listener).await;
    }

    #[tokio::test]
    async fn test_relay_to_domainname_target() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = SocksAddress::Domainname(Domainname::try_from("127.0.0.1").unwrap(), port);
        relay_roundtrip(target, listener).await;
    }

    #[tokio::test]
    async fn test_pipelined_handshake_and_data() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target: SocksAddress = SocksAddress::from(listener.local_addr().unwrap());
        let (mut tunnel, mut client) = socks_tunnel().await;

        let client_task = async move {
            let mut message = vec![5, 1, 0, 5, 1, 0];
            message.extend_from_slice(&target.to_vec());
            message.extend_from_slice(b"early");
            client.write_all(&message).await.unwrap();

            let mut method = [0u8; 2];
            client.read_exact(&mut method).await.unwrap();
            assert_eq!(method, [5, 0]);
            assert_eq!(read_reply(&mut client).await.0, SocksStatus::Succeeded);

            let mut buf = [0u8; 5];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"early");
        };

        tokio::join!(tunnel.run(), client_task, echo_server(listener));
        assert_eq!(tunnel.protocol().bytes_to_outgoing(), 5);
    }

    #[tokio::test]
    async fn test_unsupported_command() {
        let (mut tunnel, mut client) = socks_tunnel().await;

        let client_task = async move {
            client.write_all(&[5, 1, 0]).await.unwrap();
            client.write_all(&[5, 2, 0, 1, 127, 0, 0, 1, 0, 80]).await.unwrap();

            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            assert_eq!(response[..2], [5, 0]);
            assert_eq!(response[2..4], [5, SocksStatus::CommandNotSupported as u8]);
        };

        tokio::join!(tunnel.run(), client_task);
        assert!(tunnel.protocol().target().is_none());
    }

    #[tokio::test]
    async fn test_unsupported_address_type() {
        let (mut tunnel, mut client) = socks_tunnel().await;

        let client_task = async move {
            client.write_all(&[5, 1, 0, 5, 1, 0, 7]).await.unwrap();

            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            assert_eq!(response[..2], [5, 0]);
            assert_eq!(response[2..4], [5, SocksStatus::AtypNotSupported as u8]);
        };

        tokio::join!(tunnel.run(), client_task);
    }

    #[tokio::test]
    async fn test_no_acceptable_method() {
        let (mut tunnel, mut client) = socks_tunnel().await;

        let client_task = async move {
            client.write_all(&[5, 1, 2]).await.unwrap();

            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            assert_eq!(response, [5, 0xFF]);
        };

        tokio::join!(tunnel.run(), client_task);
    }

    #[tokio::test]
    async fn test_refused_target_closes_without_reply() {
        let target: SocksAddress = SocksAddress::from(refused_address().await);
        let (mut tunnel, mut client) = socks_tunnel().await;

        let client_task = async move {
            client.write_all(&[5, 1, 0, 5, 1, 0]).await.unwrap();
            target.write(&mut client).await.unwrap();

            let mut response = Vec::new();
            client.read_to_end(&mut response).await.unwrap();
            assert_eq!(response, [5, 0]);
        };

        tokio::join!(tunnel.run(), client_task);
        assert!(tunnel.is_released());
    }
}
