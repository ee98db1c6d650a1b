/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Opening a single endpoint failed.
    #[error("could not open endpoint {index} ({path}): {source}")]
    ConnectFailed {
        index: usize,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Every endpoint in the scan was tried and none accepted a connection.
    /// The chat client is most likely not running yet.
    #[error("no endpoint accepted a connection ({attempted} tried)")]
    NoEndpoint { attempted: usize },
}
