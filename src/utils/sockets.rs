use std::{
    future::poll_fn,
    io::{self, Error, ErrorKind},
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    task::Poll,
};

use tokio::net::{TcpListener, TcpStream};
use tracing::warn;

/// An empty IPv4 [`SocketAddr`] with port 0
pub const UNSPECIFIED_SOCKADDR_V4: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0));

/// Accepts from any [`TcpListener`], returning the index and the accept result of the first
/// listener to accept a connection.
///
/// This function never returns an [`ErrorKind::WouldBlock`] error.
pub async fn accept_from_any(listeners: &[TcpListener]) -> (usize, io::Result<(TcpStream, SocketAddr)>) {
    loop {
        let (index, result) = poll_fn(|cx| {
            for (index, listener) in listeners.iter().enumerate() {
                if let Poll::Ready(result) = listener.poll_accept(cx) {
                    return Poll::Ready((index, result));
                }
            }

            Poll::Pending
        })
        .await;

        if !result.as_ref().is_err_and(|error| error.kind() == ErrorKind::WouldBlock) {
            return (index, result);
        }
    }
}

/// Binds a listener on every address that can be bound.
///
/// Addresses that fail to bind are logged and skipped. An error is only returned if no address
/// could be bound at all, in which case it's the last error encountered.
pub async fn bind_listeners(addresses: &[SocketAddr]) -> io::Result<Vec<TcpListener>> {
    let mut listeners = Vec::with_capacity(addresses.len());
    let mut last_error = None;

    for address in addresses {
        match TcpListener::bind(address).await {
            Ok(listener) => listeners.push(listener),
            Err(error) => {
                warn!(%address, %error, "Failed to bind listener");
                last_error = Some(error);
            }
        }
    }

    if listeners.is_empty() {
        Err(last_error.unwrap_or_else(|| Error::new(ErrorKind::InvalidInput, "No addresses to listen on")))
    } else {
        Ok(listeners)
    }
}
