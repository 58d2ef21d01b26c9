//! The connection-pairing engine.
//!
//! A [`Tunnel`] owns one incoming and one outgoing socket that share a single lifetime. All of
//! its asynchronous operations are futures owned by the tunnel, and [`Tunnel::run`] hands their
//! completions one at a time to the bound [`TunnelProtocol`].

use std::sync::atomic::{AtomicU64, Ordering};

use futures::{future::LocalBoxFuture, stream::FuturesUnordered, StreamExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::config::TunnelConfig;

use self::operations::Completion;

mod operations;
mod protocol;
mod socket;

pub use protocol::*;
pub use socket::*;

static NEXT_TUNNEL_ID: AtomicU64 = AtomicU64::new(1);

/// One relay session: an incoming and an outgoing socket, the protocol driving them, and the
/// operations they have in flight.
pub struct Tunnel<P: TunnelProtocol> {
    id: u64,
    protocol: P,
    incoming: SocketContext,
    outgoing: SocketContext,
    read_size: usize,
    ref_count: usize,
    terminated: bool,
    resolve_pending: bool,
    released: bool,
    pending: FuturesUnordered<LocalBoxFuture<'static, Option<Completion>>>,
}

impl<P: TunnelProtocol> Tunnel<P> {
    /// Builds a tunnel around an accepted connection and runs `init` on it.
    ///
    /// If `init` returns `true` the tunnel starts reading from the incoming socket, otherwise it
    /// is shut down right away. Either way the returned tunnel must be [`run`](Self::run) so its
    /// sockets get closed.
    pub fn initialize<F>(incoming: TcpStream, config: &TunnelConfig, protocol: P, init: F) -> Self
    where
        F: FnOnce(&mut Self) -> bool,
    {
        let id = NEXT_TUNNEL_ID.fetch_add(1, Ordering::Relaxed);
        let peer = incoming.peer_addr().ok();

        let mut tunnel = Self {
            id,
            protocol,
            incoming: SocketContext::new(SocketSide::Incoming, config.idle_timeout, Some(incoming)),
            outgoing: SocketContext::new(SocketSide::Outgoing, config.idle_timeout, None),
            read_size: config.read_size,
            ref_count: 0,
            terminated: false,
            resolve_pending: false,
            released: false,
            pending: FuturesUnordered::new(),
        };

        debug!(tunnel = id, ?peer, "Tunnel created");

        if init(&mut tunnel) {
            tunnel.read_start(SocketSide::Incoming);
        } else {
            debug!(tunnel = id, "Initialization failed");
            tunnel.shutdown();
        }

        tunnel
    }

    /// Drives the tunnel until both sockets are closed and the tunnel is released.
    pub async fn run(&mut self) {
        while !self.released {
            match self.pending.next().await {
                Some(Some(completion)) => self.dispatch(completion),
                Some(None) => {}
                None => {
                    assert!(!self.terminated, "Tunnel {} ran out of close operations", self.id);
                    warn!(tunnel = self.id, "No operations left in flight, shutting down");
                    self.shutdown();
                }
            }
        }
    }

    fn dispatch(&mut self, completion: Completion) {
        match completion {
            Completion::TimerExpired(side) => self.on_timer_expired(side),
            Completion::Connected(side, result) => self.on_connect_done(side, result),
            Completion::Resolved(side, result) => self.on_resolve_done(side, result),
            Completion::Readable(side, readiness) => self.on_readable(side, readiness),
            Completion::Written(side, result) => self.on_write_done(side, result),
            Completion::Closed(side, target) => self.on_close_done(side, target),
        }
    }

    /// Tears the tunnel down. Calling this more than once has no further effect.
    ///
    /// A pending resolution is cancelled but still completes, reporting
    /// [`SocketError::Cancelled`]. Every other operation in flight is aborted and never
    /// completes.
    pub fn shutdown(&mut self) {
        if self.terminated {
            return;
        }

        debug!(tunnel = self.id, "Shutting down");

        if self.resolve_pending {
            for side in [SocketSide::Incoming, SocketSide::Outgoing] {
                if let Some(cancel) = self.socket_mut(side).ops.resolve.take() {
                    let _ = cancel.send(());
                }
            }
        }

        self.close_socket(SocketSide::Incoming);
        self.close_socket(SocketSide::Outgoing);
        self.terminated = true;
    }

    fn add_ref(&mut self) {
        self.ref_count += 1;
    }

    fn release(&mut self) {
        assert!(self.ref_count > 0, "Tunnel {} released more times than acquired", self.id);
        self.ref_count -= 1;
        if self.ref_count != 0 {
            return;
        }

        debug!(tunnel = self.id, "Tunnel dying");
        P::on_dying(self);
        self.released = true;
        self.pending.clear();
        self.incoming.buffer = Vec::new();
        self.outgoing.buffer = Vec::new();
    }

    /// The tunnel's numeric id, as shown in log output.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn socket(&self, side: SocketSide) -> &SocketContext {
        match side {
            SocketSide::Incoming => &self.incoming,
            SocketSide::Outgoing => &self.outgoing,
        }
    }

    pub fn socket_mut(&mut self, side: SocketSide) -> &mut SocketContext {
        match side {
            SocketSide::Incoming => &mut self.incoming,
            SocketSide::Outgoing => &mut self.outgoing,
        }
    }

    /// Whether shutdown has begun. No operation may be started once this is `true`.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Whether all close operations completed and [`run`](Self::run) has returned for good.
    pub fn is_released(&self) -> bool {
        self.released
    }
}
