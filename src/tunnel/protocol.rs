use super::{SocketSide, Tunnel};

/// The capability table a proxy protocol plugs into a [`Tunnel`].
///
/// Exactly one implementation is bound to each tunnel. The hooks are associated functions that
/// receive the whole tunnel, so they can both reach the protocol's own state through
/// [`Tunnel::protocol_mut`] and start further socket operations. Hooks are only invoked while the
/// tunnel is alive, except [`on_dying`](Self::on_dying).
///
/// The event hooks without a default body are required. `on_dying`, `on_timeout_expired` and
/// `alloc_size` are optional.
pub trait TunnelProtocol: Sized {
    /// Called once, after both sockets finished closing and right before the tunnel is released.
    fn on_dying(_tunnel: &mut Tunnel<Self>) {}

    /// Called when an operation on `side` stayed pending for longer than the idle timeout. The
    /// tunnel is shut down right after this returns.
    fn on_timeout_expired(_tunnel: &mut Tunnel<Self>, _side: SocketSide) {}

    /// Called when a connect on `side` completed with anything other than a refusal. The outcome
    /// is in [`SocketContext::result`](super::SocketContext::result).
    fn on_outgoing_connected(tunnel: &mut Tunnel<Self>, side: SocketSide);

    /// Called when a read on `side` delivered data, available through
    /// [`SocketContext::read_data`](super::SocketContext::read_data).
    fn on_read_done(tunnel: &mut Tunnel<Self>, side: SocketSide);

    /// Called when a write on `side` completed. The outcome is in the socket's result.
    fn on_write_done(tunnel: &mut Tunnel<Self>, side: SocketSide);

    /// Called when a name resolution on `side` completed, successfully or not. On success the
    /// resolved address was stored in the socket.
    fn on_resolution_done(tunnel: &mut Tunnel<Self>, side: SocketSide);

    /// Overrides the amount of bytes requested for the next read.
    fn alloc_size(_tunnel: &Tunnel<Self>, requested: usize) -> usize {
        requested
    }

    /// Whether the tunnel is relaying continuously. In streaming mode reads stay registered after
    /// a delivery and the read/write state checks are relaxed.
    fn is_streaming(tunnel: &Tunnel<Self>) -> bool;
}
