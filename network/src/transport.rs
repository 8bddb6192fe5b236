//! Transport port and the TCP implementation.
//!
//! One short-lived stream connection carries exactly one newline-terminated
//! record. Connect and write are both bounded by timeouts so a stalled peer
//! cannot hold up a delivery worker.

use crate::NetworkError;
use async_trait::async_trait;
use braid_messages::Message;
use braid_types::PeerAddress;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

/// Timeout for establishing an outbound connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for writing one record.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Delivers one encoded message to an address.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, address: &PeerAddress, message: &Message) -> Result<(), NetworkError>;
}

#[derive(Clone, Debug)]
pub struct TcpTransport {
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, write_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            write_timeout,
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new(CONNECT_TIMEOUT, WRITE_TIMEOUT)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, address: &PeerAddress, message: &Message) -> Result<(), NetworkError> {
        let bytes = braid_protocol::encode(message)?;
        let target = address.to_string();

        let mut stream =
            match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&target)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(NetworkError::ConnectionFailed {
                        addr: address.clone(),
                        reason: e.to_string(),
                    })
                }
                Err(_) => {
                    return Err(NetworkError::Timeout {
                        op: "connect",
                        addr: address.clone(),
                    })
                }
            };

        let write = async {
            stream.write_all(&bytes).await?;
            stream.shutdown().await
        };
        match tokio::time::timeout(self.write_timeout, write).await {
            Ok(result) => result.map_err(NetworkError::from),
            Err(_) => Err(NetworkError::Timeout {
                op: "write",
                addr: address.clone(),
            }),
        }
    }
}
