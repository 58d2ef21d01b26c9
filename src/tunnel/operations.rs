//! The asynchronous socket operations of a tunnel and their completion handlers.
//!
//! Every operation is a future pushed into the tunnel's pending set and resolves into a
//! [`Completion`]. The tunnel's run loop hands completions back to the handlers here one at a
//! time, and each handler checks whether the tunnel is still alive before doing anything else.

use std::{
    future::Future,
    io::{self, ErrorKind},
    net::SocketAddr,
    rc::Rc,
};

use bytes::{Buf, Bytes};
use futures::{
    future::{self, abortable, AbortHandle},
    FutureExt,
};
use tokio::{net::TcpStream, sync::oneshot};
use tracing::{debug, trace};

use super::{SocketError, SocketSide, SocketState, Tunnel, TunnelProtocol};

/// Which of a socket's two handles a close completion refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CloseTarget {
    Handle,
    Timer,
}

pub(super) enum Completion {
    TimerExpired(SocketSide),
    Connected(SocketSide, io::Result<TcpStream>),
    Resolved(SocketSide, Result<SocketAddr, SocketError>),
    Readable(SocketSide, io::Result<()>),
    Written(SocketSide, io::Result<usize>),
    Closed(SocketSide, CloseTarget),
}

async fn write_all(stream: &TcpStream, mut data: Bytes) -> io::Result<usize> {
    let len = data.len();
    while data.has_remaining() {
        stream.writable().await?;
        match stream.try_write(data.chunk()) {
            Ok(0) => return Err(io::Error::from(ErrorKind::WriteZero)),
            Ok(n) => data.advance(n),
            Err(error) if error.kind() == ErrorKind::WouldBlock => continue,
            Err(error) => return Err(error),
        }
    }

    Ok(len)
}

async fn resolve_first(host: &str, port: u16) -> Result<SocketAddr, SocketError> {
    // Only the first address is ever used, whichever family it is.
    let mut addresses = tokio::net::lookup_host((host, port)).await?;
    addresses.next().ok_or(SocketError::Io(ErrorKind::NotFound))
}

impl<P: TunnelProtocol> Tunnel<P> {
    fn push_abortable<F>(&mut self, future: F) -> AbortHandle
    where
        F: Future<Output = Completion> + 'static,
    {
        let (future, handle) = abortable(future);
        self.pending.push(future.map(Result::ok).boxed_local());
        handle
    }

    fn stream(&self, side: SocketSide) -> Rc<TcpStream> {
        match &self.socket(side).stream {
            Some(stream) => Rc::clone(stream),
            None => panic!("The {side} socket of tunnel {} is not connected", self.id),
        }
    }

    fn assert_alive(&self, operation: &str) {
        assert!(!self.terminated, "Cannot start {operation} on terminated tunnel {}", self.id);
    }

    /// Arms the idle timer of `side`, restarting it if it was already armed.
    pub(super) fn timer_start(&mut self, side: SocketSide) {
        let idle_timeout = self.socket(side).idle_timeout;
        let handle = self.push_abortable(async move {
            tokio::time::sleep(idle_timeout).await;
            Completion::TimerExpired(side)
        });

        if let Some(previous) = self.socket_mut(side).ops.timer.replace(handle) {
            previous.abort();
        }
    }

    pub(super) fn timer_stop(&mut self, side: SocketSide) {
        if let Some(handle) = self.socket_mut(side).ops.timer.take() {
            handle.abort();
        }
    }

    pub(super) fn on_timer_expired(&mut self, side: SocketSide) {
        let socket = self.socket_mut(side);
        socket.ops.timer = None;
        socket.result = Err(SocketError::TimedOut);

        if self.terminated {
            return;
        }

        debug!(tunnel = self.id, %side, "Idle timeout expired");
        P::on_timeout_expired(self, side);
        self.shutdown();
    }

    /// Connects the socket on `side` to its [`address`](super::SocketContext::address).
    ///
    /// # Panics
    ///
    /// Panics if the tunnel is terminated, the socket has no address, is already connected, or
    /// already has a connect pending.
    pub fn connect(&mut self, side: SocketSide) {
        self.assert_alive("a connect");
        let socket = self.socket(side);
        let address = match socket.address {
            Some(address) => address,
            None => panic!("Cannot connect the {side} socket of tunnel {} without an address", self.id),
        };
        assert!(!socket.is_connected(), "The {side} socket of tunnel {} is already connected", self.id);
        assert!(socket.ops.connect.is_none(), "A connect is already pending on the {side} socket");

        trace!(tunnel = self.id, %side, %address, "Connecting");
        self.timer_start(side);
        let handle = self.push_abortable(async move { Completion::Connected(side, TcpStream::connect(address).await) });
        self.socket_mut(side).ops.connect = Some(handle);
    }

    pub(super) fn on_connect_done(&mut self, side: SocketSide, result: io::Result<TcpStream>) {
        self.socket_mut(side).ops.connect = None;
        if self.terminated {
            return;
        }

        self.timer_stop(side);

        let socket = self.socket_mut(side);
        match result {
            Ok(stream) => {
                socket.stream = Some(Rc::new(stream));
                socket.result = Ok(0);
            }
            Err(error) => {
                let error = SocketError::from(error);
                socket.result = Err(error);
                if matches!(error, SocketError::Cancelled | SocketError::Io(ErrorKind::ConnectionRefused)) {
                    debug!(tunnel = self.id, %side, %error, "Connect failed");
                    self.shutdown();
                    return;
                }
            }
        }

        trace!(tunnel = self.id, %side, result = ?self.socket(side).result, "Connect done");
        P::on_outgoing_connected(self, side);
    }

    /// Resolves `hostname` and stores the first address found, with `port`, into the socket on
    /// `side`. Only one resolution may be pending per tunnel.
    pub fn resolve(&mut self, side: SocketSide, hostname: &str, port: u16) {
        self.assert_alive("a resolution");
        assert!(!self.resolve_pending, "A resolution is already pending on tunnel {}", self.id);

        let (cancel_sender, cancel_receiver) = oneshot::channel::<()>();
        let hostname = hostname.to_string();
        trace!(tunnel = self.id, %side, %hostname, "Resolving");

        let future = async move {
            let result = tokio::select! {
                result = resolve_first(&hostname, port) => result,
                _ = cancel_receiver => Err(SocketError::Cancelled),
            };

            Some(Completion::Resolved(side, result))
        };

        self.pending.push(future.boxed_local());
        self.timer_start(side);
        self.resolve_pending = true;
        self.socket_mut(side).ops.resolve = Some(cancel_sender);
    }

    pub(super) fn on_resolve_done(&mut self, side: SocketSide, result: Result<SocketAddr, SocketError>) {
        self.resolve_pending = false;
        let socket = self.socket_mut(side);
        socket.ops.resolve = None;
        socket.result = result.map(|_| 0);

        if self.terminated {
            return;
        }

        self.timer_stop(side);
        if let Ok(address) = result {
            self.socket_mut(side).address = Some(address);
        }

        trace!(tunnel = self.id, %side, result = ?result, "Resolution done");
        P::on_resolution_done(self, side);
    }

    fn arm_read(&mut self, side: SocketSide) {
        let stream = self.stream(side);
        let handle = self.push_abortable(async move { Completion::Readable(side, stream.readable().await) });
        self.socket_mut(side).ops.read = Some(handle);
    }

    /// Starts delivering reads from the socket on `side`.
    ///
    /// # Panics
    ///
    /// Panics if the tunnel is terminated, the read direction isn't [`SocketState::Stopped`], or
    /// the socket isn't connected.
    pub fn read_start(&mut self, side: SocketSide) {
        self.assert_alive("a read");
        let state = self.socket(side).read_state;
        assert_eq!(state, SocketState::Stopped, "read_start on the {side} socket of tunnel {}", self.id);

        self.arm_read(side);
        self.socket_mut(side).read_state = SocketState::Pending;
        self.timer_start(side);
    }

    /// Stops delivering reads from the socket on `side` and resets its read state.
    pub fn read_stop(&mut self, side: SocketSide) {
        let socket = self.socket_mut(side);
        if socket.read_state == SocketState::Dead {
            return;
        }

        if let Some(handle) = socket.ops.read.take() {
            handle.abort();
        }

        socket.read_state = SocketState::Stopped;
    }

    pub(super) fn on_readable(&mut self, side: SocketSide, readiness: io::Result<()>) {
        self.socket_mut(side).ops.read = None;
        if self.terminated {
            return;
        }

        if let Err(error) = readiness {
            self.deliver_read(side, Err(error));
            return;
        }

        let size = P::alloc_size(self, self.read_size).max(1);
        if !P::is_streaming(self) {
            assert_eq!(self.socket(side).read_state, SocketState::Pending);
        }

        let socket = self.socket_mut(side);
        if socket.buffer.len() < size {
            socket.buffer.resize(size, 0);
        }

        let outcome = match &socket.stream {
            Some(stream) => stream.try_read(&mut socket.buffer[..size]),
            None => Err(io::Error::from(ErrorKind::NotConnected)),
        };

        self.deliver_read(side, outcome);
    }

    /// Hands the outcome of one read attempt to the protocol.
    pub(super) fn deliver_read(&mut self, side: SocketSide, outcome: io::Result<usize>) {
        let outcome = match outcome {
            Err(error) if error.kind() == ErrorKind::WouldBlock => {
                // Spurious readiness, nothing was delivered.
                self.arm_read(side);
                return;
            }
            other => other,
        };

        self.timer_stop(side);

        let len = match outcome {
            Ok(0) => {
                trace!(tunnel = self.id, %side, "End of stream");
                self.socket_mut(side).result = Err(SocketError::Eof);
                self.shutdown();
                return;
            }
            Ok(len) => len,
            Err(error) => {
                debug!(tunnel = self.id, %side, %error, "Read failed");
                self.socket_mut(side).result = Err(error.into());
                self.shutdown();
                return;
            }
        };

        match P::is_streaming(self) {
            true => self.arm_read(side),
            false => assert_eq!(self.socket(side).read_state, SocketState::Pending),
        }

        let socket = self.socket_mut(side);
        socket.read_state = SocketState::Done;
        socket.read_len = len;
        socket.result = Ok(len);

        trace!(tunnel = self.id, %side, len, "Read done");
        P::on_read_done(self, side);
    }

    /// Writes all of `data` to the socket on `side`.
    ///
    /// # Panics
    ///
    /// Panics if the tunnel is terminated, the socket isn't connected, a write is already
    /// pending, or (outside streaming mode) the write direction isn't stopped or done.
    pub fn write(&mut self, side: SocketSide, data: impl Into<Bytes>) {
        self.assert_alive("a write");
        let socket = self.socket(side);
        if !P::is_streaming(self) {
            assert!(
                matches!(socket.write_state, SocketState::Stopped | SocketState::Done),
                "write on the {side} socket of tunnel {} in state {:?}",
                self.id,
                socket.write_state
            );
        }
        assert!(socket.ops.write.is_none(), "A write is already pending on the {side} socket");

        let stream = self.stream(side);
        let data = data.into();
        trace!(tunnel = self.id, %side, len = data.len(), "Writing");

        self.socket_mut(side).write_state = SocketState::Pending;
        let handle = self.push_abortable(async move { Completion::Written(side, write_all(&stream, data).await) });
        self.socket_mut(side).ops.write = Some(handle);
        self.timer_start(side);
    }

    pub(super) fn on_write_done(&mut self, side: SocketSide, result: io::Result<usize>) {
        self.socket_mut(side).ops.write = None;
        if self.terminated {
            return;
        }

        self.timer_stop(side);

        let result = result.map_err(SocketError::from);
        if result == Err(SocketError::Cancelled) {
            self.shutdown();
            return;
        }

        if !P::is_streaming(self) {
            assert_eq!(self.socket(side).write_state, SocketState::Pending);
        }

        let socket = self.socket_mut(side);
        socket.write_state = SocketState::Done;
        socket.result = result;

        trace!(tunnel = self.id, %side, result = ?result, "Write done");
        P::on_write_done(self, side);
    }

    /// Marks both directions of `side` dead and issues the two close operations, one for the
    /// connection and one for the timer, each holding a reference on the tunnel until it
    /// completes.
    pub(super) fn close_socket(&mut self, side: SocketSide) {
        let socket = self.socket_mut(side);
        assert_ne!(socket.read_state, SocketState::Dead, "The {side} socket was closed twice");
        assert_ne!(socket.write_state, SocketState::Dead, "The {side} socket was closed twice");
        socket.read_state = SocketState::Dead;
        socket.write_state = SocketState::Dead;
        socket.ops.abort_io();
        socket.stream = None;

        self.add_ref();
        self.pending.push(future::ready(Some(Completion::Closed(side, CloseTarget::Handle))).boxed_local());
        self.add_ref();
        self.pending.push(future::ready(Some(Completion::Closed(side, CloseTarget::Timer))).boxed_local());
    }

    pub(super) fn on_close_done(&mut self, side: SocketSide, target: CloseTarget) {
        trace!(tunnel = self.id, %side, ?target, "Close done");
        self.release();
    }
}
