//! Endpoint discovery for the chat client's local IPC channel.
//!
//! The chat client listens on one of a small, fixed set of endpoints named
//! `<prefix>-0`, `<prefix>-1`, ... . Which index it picked depends on how
//! many instances were running when it started, so a client scans them in
//! order and keeps the first one that accepts.

use std::path::PathBuf;

use crate::{StreamConnection, Transport, TransportError};

#[cfg(unix)]
type IpcStream = tokio::net::UnixStream;
#[cfg(windows)]
type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

/// A connection to the chat client over the platform's IPC channel.
pub type IpcConnection = StreamConnection<IpcStream>;

/// Where and how many endpoints to scan.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Endpoint name without the index suffix.
    pub prefix: String,
    /// Number of indices to try per scan (`0..count`).
    pub count: usize,
    /// Directory holding the sockets. `None` picks the platform default.
    /// Ignored on Windows, where pipes live in a fixed namespace.
    pub dir: Option<PathBuf>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            prefix: "discord-ipc".to_string(),
            count: 10,
            dir: None,
        }
    }
}

impl EndpointConfig {
    /// Upper bound on endpoints per scan.
    pub const MAX_COUNT: usize = 32;

    /// Clamps `count` into `1..=MAX_COUNT`.
    pub fn validated(mut self) -> Self {
        if self.count == 0 || self.count > Self::MAX_COUNT {
            let clamped = self.count.clamp(1, Self::MAX_COUNT);
            tracing::warn!(
                count = self.count,
                clamped,
                "endpoint count out of range, clamping"
            );
            self.count = clamped;
        }
        self
    }

    /// Full platform path of the endpoint at `index`.
    pub fn path(&self, index: usize) -> PathBuf {
        #[cfg(windows)]
        {
            PathBuf::from(format!(r"\\?\pipe\{}-{}", self.prefix, index))
        }
        #[cfg(not(windows))]
        {
            let dir = self.dir.clone().unwrap_or_else(default_socket_dir);
            dir.join(format!("{}-{}", self.prefix, index))
        }
    }
}

/// First of `XDG_RUNTIME_DIR`, `TMPDIR`, `TMP`, `TEMP` that is set,
/// falling back to `/tmp`.
#[cfg(not(windows))]
fn default_socket_dir() -> PathBuf {
    ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// A [`Transport`] that scans the chat client's IPC endpoints.
#[derive(Debug, Clone, Default)]
pub struct IpcTransport {
    config: EndpointConfig,
}

impl IpcTransport {
    /// Creates a transport scanning the endpoints described by `config`.
    pub fn new(config: EndpointConfig) -> Self {
        Self {
            config: config.validated(),
        }
    }

    /// The endpoint configuration in use.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    async fn open(&self, index: usize) -> Result<IpcConnection, TransportError> {
        let path = self.config.path(index);
        let stream = open_stream(&path)
            .await
            .map_err(|source| TransportError::ConnectFailed {
                index,
                path: path.display().to_string(),
                source,
            })?;
        Ok(StreamConnection::new(stream, index))
    }
}

#[cfg(unix)]
async fn open_stream(path: &std::path::Path) -> std::io::Result<IpcStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
async fn open_stream(path: &std::path::Path) -> std::io::Result<IpcStream> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(path)
}

impl Transport for IpcTransport {
    type Connection = IpcConnection;

    async fn connect(&mut self) -> Result<IpcConnection, TransportError> {
        for index in 0..self.config.count {
            match self.open(index).await {
                Ok(conn) => {
                    tracing::info!(
                        index,
                        path = %self.config.path(index).display(),
                        "connected to chat client"
                    );
                    return Ok(conn);
                }
                Err(e) => {
                    tracing::debug!(index, error = %e, "endpoint unavailable");
                }
            }
        }
        Err(TransportError::NoEndpoint {
            attempted: self.config.count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_scans_ten_endpoints() {
        let config = EndpointConfig::default();
        assert_eq!(config.count, 10);
        assert_eq!(config.prefix, "discord-ipc");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_path_uses_configured_dir_and_index() {
        let config = EndpointConfig {
            dir: Some(PathBuf::from("/run/user/1000")),
            ..EndpointConfig::default()
        };
        assert_eq!(
            config.path(3),
            PathBuf::from("/run/user/1000/discord-ipc-3")
        );
    }

    #[cfg(windows)]
    #[test]
    fn test_path_uses_pipe_namespace() {
        let config = EndpointConfig::default();
        assert_eq!(config.path(0), PathBuf::from(r"\\?\pipe\discord-ipc-0"));
    }

    #[test]
    fn test_validated_clamps_zero_count() {
        let config = EndpointConfig {
            count: 0,
            ..EndpointConfig::default()
        }
        .validated();
        assert_eq!(config.count, 1);
    }

    #[test]
    fn test_validated_clamps_large_count() {
        let config = EndpointConfig {
            count: 500,
            ..EndpointConfig::default()
        }
        .validated();
        assert_eq!(config.count, EndpointConfig::MAX_COUNT);
    }
}
