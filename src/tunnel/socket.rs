use std::{
    fmt,
    io::{self, ErrorKind},
    net::SocketAddr,
    rc::Rc,
    time::Duration,
};

use futures::future::AbortHandle;
use thiserror::Error;
use tokio::{net::TcpStream, sync::oneshot};

/// Identifies one of the two sockets of a tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketSide {
    /// The client-facing socket, accepted by the listener.
    Incoming,

    /// The server-facing socket, opened by the tunnel with [`connect`](super::Tunnel::connect).
    Outgoing,
}

impl SocketSide {
    /// Returns the opposite side.
    pub const fn other(self) -> Self {
        match self {
            Self::Incoming => Self::Outgoing,
            Self::Outgoing => Self::Incoming,
        }
    }
}

impl fmt::Display for SocketSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// The state of a socket's read or write direction.
///
/// A direction moves `Stopped → Pending → Done` and is reset to `Stopped` by whoever consumes the
/// `Done` event. It becomes `Dead` exactly once, when the socket is closed, and stays there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Stopped,
    Pending,
    Done,
    Dead,
}

/// The failure outcome of a socket operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SocketError {
    #[error("operation was cancelled")]
    Cancelled,

    #[error("idle timeout expired")]
    TimedOut,

    #[error("end of stream")]
    Eof,

    #[error("{0}")]
    Io(ErrorKind),
}

impl SocketError {
    /// Returns the closest [`ErrorKind`] for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cancelled => ErrorKind::Interrupted,
            Self::TimedOut => ErrorKind::TimedOut,
            Self::Eof => ErrorKind::UnexpectedEof,
            Self::Io(kind) => *kind,
        }
    }
}

impl From<io::Error> for SocketError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            ErrorKind::Interrupted => Self::Cancelled,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::UnexpectedEof => Self::Eof,
            kind => Self::Io(kind),
        }
    }
}

/// Handles for the operations a socket has in flight.
#[derive(Default)]
pub(super) struct PendingOps {
    pub timer: Option<AbortHandle>,
    pub connect: Option<AbortHandle>,
    pub read: Option<AbortHandle>,
    pub write: Option<AbortHandle>,
    pub resolve: Option<oneshot::Sender<()>>,
}

impl PendingOps {
    /// Aborts everything except a pending resolution, which is cancelled separately so its
    /// completion still gets delivered.
    pub fn abort_io(&mut self) {
        for handle in [self.timer.take(), self.connect.take(), self.read.take(), self.write.take()]
            .into_iter()
            .flatten()
        {
            handle.abort();
        }
    }
}

/// The asynchronous-operation state of one endpoint of a tunnel.
///
/// Sockets are owned by their [`Tunnel`](super::Tunnel) and are addressed through it by
/// [`SocketSide`]; all operations are started through the tunnel.
pub struct SocketContext {
    pub(super) side: SocketSide,
    pub(super) read_state: SocketState,
    pub(super) write_state: SocketState,
    pub(super) result: Result<usize, SocketError>,
    pub(super) buffer: Vec<u8>,
    pub(super) read_len: usize,
    pub(super) idle_timeout: Duration,
    pub(super) address: Option<SocketAddr>,
    pub(super) stream: Option<Rc<TcpStream>>,
    pub(super) ops: PendingOps,
}

impl SocketContext {
    pub(super) fn new(side: SocketSide, idle_timeout: Duration, stream: Option<TcpStream>) -> Self {
        Self {
            side,
            read_state: SocketState::Stopped,
            write_state: SocketState::Stopped,
            result: Ok(0),
            buffer: Vec::new(),
            read_len: 0,
            idle_timeout,
            address: None,
            stream: stream.map(Rc::new),
            ops: PendingOps::default(),
        }
    }

    pub fn side(&self) -> SocketSide {
        self.side
    }

    pub fn read_state(&self) -> SocketState {
        self.read_state
    }

    pub fn write_state(&self) -> SocketState {
        self.write_state
    }

    /// The outcome of the last completed operation on this socket: a byte count for reads and
    /// writes, zero for connects and resolutions, or the error it failed with.
    ///
    /// Only meaningful right after a completion, until the next one overwrites it.
    pub fn result(&self) -> Result<usize, SocketError> {
        self.result
    }

    /// The bytes delivered by the last completed read, or an empty slice if the read direction
    /// isn't [`SocketState::Done`].
    pub fn read_data(&self) -> &[u8] {
        match self.read_state {
            SocketState::Done => &self.buffer[..self.read_len],
            _ => &[],
        }
    }

    /// The whole read buffer. It grows as reads request more space and never shrinks.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// The address [`connect`](super::Tunnel::connect) will use, filled by a resolution or set by
    /// the protocol.
    pub fn address(&self) -> Option<SocketAddr> {
        self.address
    }

    pub fn set_address(&mut self, address: SocketAddr) {
        self.address = Some(address);
    }

    /// Whether this socket has a live connection.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match &self.stream {
            Some(stream) => stream.local_addr(),
            None => Err(io::Error::from(ErrorKind::NotConnected)),
        }
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match &self.stream {
            Some(stream) => stream.peer_addr(),
            None => Err(io::Error::from(ErrorKind::NotConnected)),
        }
    }
}
