use std::{cell::Cell, net::SocketAddr, rc::Rc};

use tokio::net::{TcpListener, TcpStream};

use crate::tunnel::{SocketSide, Tunnel, TunnelProtocol};

/// Returns a connected pair of loopback streams: the connecting end and the accepted end.
pub async fn tcp_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (client, accepted) = tokio::join!(TcpStream::connect(address), listener.accept());
    (client.unwrap(), accepted.unwrap().0)
}

/// Returns a loopback address nothing is listening on.
pub async fn refused_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A protocol hook invocation, as recorded by [`Recorder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Dying,
    TimeoutExpired(SocketSide),
    OutgoingConnected(SocketSide),
    ReadDone(SocketSide),
    WriteDone(SocketSide),
    ResolutionDone(SocketSide),
}

/// A protocol that records every hook invoked on it and optionally echoes reads back or connects
/// once a resolution completes.
#[derive(Default)]
pub struct Recorder {
    pub hooks: Vec<Hook>,
    pub reads: Vec<Vec<u8>>,
    echo: bool,
    connect_after_resolve: bool,
    streaming: bool,
    alloc_size: Option<usize>,
    _tracker: Option<DropTracker>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn echo(mut self) -> Self {
        self.echo = true;
        self
    }

    pub fn connect_after_resolve(mut self) -> Self {
        self.connect_after_resolve = true;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    pub fn with_alloc_size(mut self, alloc_size: usize) -> Self {
        self.alloc_size = Some(alloc_size);
        self
    }

    pub fn tracked(mut self, drop_checker: &mut DropChecker) -> Self {
        self._tracker = Some(drop_checker.track());
        self
    }

    pub fn count(&self, hook: Hook) -> usize {
        self.hooks.iter().filter(|h| **h == hook).count()
    }
}

impl TunnelProtocol for Recorder {
    fn on_dying(tunnel: &mut Tunnel<Self>) {
        tunnel.protocol_mut().hooks.push(Hook::Dying);
    }

    fn on_timeout_expired(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        tunnel.protocol_mut().hooks.push(Hook::TimeoutExpired(side));
    }

    fn on_outgoing_connected(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        tunnel.protocol_mut().hooks.push(Hook::OutgoingConnected(side));
    }

    fn on_read_done(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        let data = tunnel.socket(side).read_data().to_vec();
        let recorder = tunnel.protocol_mut();
        recorder.hooks.push(Hook::ReadDone(side));
        recorder.reads.push(data.clone());

        if recorder.echo {
            tunnel.read_stop(side);
            tunnel.write(side, data);
        }
    }

    fn on_write_done(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        tunnel.protocol_mut().hooks.push(Hook::WriteDone(side));
        if tunnel.protocol().echo {
            tunnel.read_start(side);
        }
    }

    fn on_resolution_done(tunnel: &mut Tunnel<Self>, side: SocketSide) {
        tunnel.protocol_mut().hooks.push(Hook::ResolutionDone(side));
        if tunnel.protocol().connect_after_resolve && tunnel.socket(side).result().is_ok() {
            tunnel.connect(side);
        }
    }

    fn alloc_size(tunnel: &Tunnel<Self>, requested: usize) -> usize {
        tunnel.protocol().alloc_size.unwrap_or(requested)
    }

    fn is_streaming(tunnel: &Tunnel<Self>) -> bool {
        tunnel.protocol().streaming
    }
}

/// Counts how many of the values it handed out trackers for have been dropped.
pub struct DropChecker {
    tracked: usize,
    dropped: Rc<Cell<usize>>,
}

impl DropChecker {
    pub fn new() -> Self {
        Self {
            tracked: 0,
            dropped: Rc::new(Cell::new(0)),
        }
    }

    /// Returns a tracker to be embedded in the value whose drop should be checked.
    pub fn track(&mut self) -> DropTracker {
        self.tracked += 1;
        DropTracker {
            dropped: Rc::clone(&self.dropped),
        }
    }

    pub fn dropped(&self) -> usize {
        self.dropped.get()
    }

    pub fn ensure_all_dropped(&self) {
        let dropped = self.dropped.get();
        assert_eq!(dropped, self.tracked, "{} of {} tracked values were dropped", dropped, self.tracked);
    }
}

pub struct DropTracker {
    dropped: Rc<Cell<usize>>,
}

impl Drop for DropTracker {
    fn drop(&mut self) {
        self.dropped.set(self.dropped.get() + 1);
    }
}
