//! Transport abstraction layer for irislink.
//!
//! Provides the [`Transport`] and [`Connection`] traits that abstract over
//! the local inter-process channel used to reach the chat client: a named
//! pipe on Windows, a Unix domain socket everywhere else.
//!
//! The transport knows nothing about frames or JSON. It finds an endpoint,
//! moves bytes in both directions, and reports when the peer goes away.

mod endpoint;
mod error;
mod reconnect;
mod stream;

pub use endpoint::{EndpointConfig, IpcConnection, IpcTransport};
pub use error::TransportError;
pub use reconnect::ReconnectPolicy;
pub use stream::StreamConnection;

use std::fmt;
use std::future::Future;

/// Process-unique number of an IPC connection, used in logs.
///
/// Every reconnect gets a fresh id, so log lines from a dropped
/// connection can be told apart from its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipc#{}", self.0)
    }
}

/// Opens connections to the chat client.
///
/// One call to [`connect`](Self::connect) is one full scan of the known
/// endpoints. Waiting between scans is the caller's business (see
/// [`ReconnectPolicy`]), because only the caller knows whether it has
/// been asked to stop.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Scans the endpoints and returns the first one that accepts.
    fn connect(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive bytes.
///
/// The methods return `Send` futures so a session generic over the
/// connection type can still be moved onto a Tokio worker thread.
pub trait Connection: Send + Sync + 'static {
    /// Writes `data` to the peer as one write.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next chunk of bytes from the peer.
    ///
    /// Chunks carry no message boundaries. Returns `Ok(None)` when the
    /// connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the connection. Closing twice is a no-op.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;

    /// Index of the endpoint this connection was opened on.
    fn endpoint(&self) -> usize;
}
