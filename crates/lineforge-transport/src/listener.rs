//! TCP listener.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};

use crate::TransportError;

/// A bound TCP listener. Dropping it closes the listening socket.
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new listener to the given `host:port` address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::Bind {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::LocalAddr)
    }

    /// Waits for the next inbound connection.
    ///
    /// Cancel-safe: dropping the future before it resolves never loses an
    /// accepted socket.
    pub async fn accept(
        &self,
    ) -> Result<(TcpStream, SocketAddr), TransportError> {
        self.listener.accept().await.map_err(TransportError::Accept)
    }
}
