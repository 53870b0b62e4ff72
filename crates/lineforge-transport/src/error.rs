/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listening socket failed. Fatal at startup.
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting a single inbound connection failed. Usually transient.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// Querying the local address of the listener failed.
    #[error("local address unavailable: {0}")]
    LocalAddr(#[source] std::io::Error),
}
