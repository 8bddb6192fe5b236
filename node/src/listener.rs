//! Inbound TCP listener. Each accepted connection carries newline-delimited
//! records and is served by its own task.

use braid_protocol::MAX_MESSAGE_SIZE;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::context::NodeContext;

/// Longest wait for the next line on an open connection.
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until shutdown.
pub fn spawn_listener(
    listener: TcpListener,
    ctx: Arc<NodeContext>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => {
                    tracing::info!("listener shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let ctx = Arc::clone(&ctx);
                        tokio::spawn(async move {
                            serve_connection(ctx, stream, remote).await;
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
            }
        }
    })
}

/// Serve one accepted connection.
async fn serve_connection(ctx: Arc<NodeContext>, stream: TcpStream, remote: SocketAddr) {
    // The cap bounds what a peer can make us buffer.
    let limited = stream.take(MAX_MESSAGE_SIZE as u64 + 1);
    read_records(&ctx, BufReader::new(limited), remote).await;
}

/// Dispatch every newline-terminated record from `reader`. Records are handed
/// over as raw bytes so malformed ones, invalid UTF-8 included, are counted
/// as invalid drops without ending the connection. Stops at EOF, on a read
/// error or when the peer stalls past [`READ_TIMEOUT`]. Returns the number of
/// records dispatched.
async fn read_records<R>(ctx: &NodeContext, mut reader: R, remote: SocketAddr) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut records = 0;
    loop {
        buf.clear();
        match tokio::time::timeout(READ_TIMEOUT, reader.read_until(b'\n', &mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(_)) => {
                let end = buf
                    .iter()
                    .rposition(|b| !b.is_ascii_whitespace())
                    .map_or(0, |i| i + 1);
                if end == 0 {
                    continue;
                }
                ctx.handle_line(&buf[..end]);
                records += 1;
            }
            Ok(Err(e)) => {
                tracing::debug!(%remote, error = %e, "connection read failed");
                break;
            }
            Err(_) => {
                tracing::debug!(%remote, "connection read timed out");
                break;
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::harness;
    use braid_messages::{Message, PingMsg};
    use braid_network::DropReason;
    use braid_types::{MessageId, PeerId, Timestamp};

    fn remote() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 6000))
    }

    #[tokio::test]
    async fn non_utf8_record_is_counted_and_reading_continues() {
        let h = harness("5000", |_| {});
        let ping = Message::Ping(PingMsg {
            sender_id: PeerId::from("5001"),
            timestamp: Timestamp::from_secs(1),
            message_id: MessageId::random(),
        });
        let mut wire = vec![0xff, 0xfe, b'{', b'\n'];
        wire.extend(braid_protocol::encode(&ping).unwrap());

        let records = read_records(&h.ctx, BufReader::new(wire.as_slice()), remote()).await;

        assert_eq!(records, 2);
        assert_eq!(h.ctx.drops.count(DropReason::Invalid), 1);
        assert_eq!(h.ctx.metrics.messages_dispatched.get(), 1);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped() {
        let h = harness("5000", |_| {});
        let records = read_records(&h.ctx, BufReader::new(&b"\n  \r\n"[..]), remote()).await;
        assert_eq!(records, 0);
        assert_eq!(h.ctx.drops.count(DropReason::Invalid), 0);
    }
}
