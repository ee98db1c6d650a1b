//! A [`Connection`] over any async byte stream.
//!
//! The Unix socket, the Windows named pipe client and the in-memory duplex
//! used in tests all end up here. The stream is split into halves so a
//! pending `recv` never blocks a `send`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::{Connection, ConnectionId, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Size of a single read from the stream. Frames larger than this simply
/// arrive over several chunks.
const READ_CHUNK: usize = 16 * 1024;

/// A connection backed by a split async stream.
#[derive(Debug)]
pub struct StreamConnection<S> {
    id: ConnectionId,
    endpoint: usize,
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    closed: AtomicBool,
}

impl<S> StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wraps `stream`, recording which endpoint index it came from.
    pub fn new(stream: S, endpoint: usize) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        Self {
            id,
            endpoint,
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed: AtomicBool::new(false),
        }
    }

    /// Whether [`close`](Connection::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<S> Connection for StreamConnection<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(format!(
                "{} already closed",
                self.id
            )));
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)?;
        tracing::trace!(id = %self.id, bytes = data.len(), "sent");
        Ok(())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut buf = vec![0u8; READ_CHUNK];
        let n = self
            .reader
            .lock()
            .await
            .read(&mut buf)
            .await
            .map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        tracing::trace!(id = %self.id, bytes = n, "received");
        Ok(Some(buf))
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(id = %self.id, endpoint = self.endpoint, "closing connection");
        self.writer
            .lock()
            .await
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn endpoint(&self) -> usize {
        self.endpoint
    }
}
