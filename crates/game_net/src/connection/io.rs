//! Socket servicing for one connection on its owning worker.

use super::{Connection, ConnectionRegistry};
use crate::error::{NetError, ProtocolError};
use crate::protocol::{MessageHeader, HEADER_LEN};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Reads one complete frame, header included.
///
/// Returns `Ok(None)` when the peer closed cleanly at a frame boundary.
pub(crate) async fn read_frame<R>(reader: &mut R, max_payload: usize) -> Result<Option<Vec<u8>>, NetError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    if reader.read(&mut header[..1]).await? == 0 {
        return Ok(None);
    }
    reader.read_exact(&mut header[1..]).await?;

    let parsed = MessageHeader::parse(&header)?;
    let length = parsed.length as usize;
    if length > max_payload {
        return Err(ProtocolError::Oversized {
            length,
            limit: max_payload,
        }
        .into());
    }

    let mut frame = Vec::with_capacity(HEADER_LEN + length);
    frame.extend_from_slice(&header);
    frame.resize(HEADER_LEN + length, 0);
    reader.read_exact(&mut frame[HEADER_LEN..]).await?;
    Ok(Some(frame))
}

/// Services `stream` until the peer closes, an I/O or framing error occurs,
/// or [`Connection::shutdown`] is requested.
///
/// On exit the connection is closed (firing `on_disconnect` once), removed
/// from the registry, and the event loop's own reference is released.
pub(crate) async fn drive(
    conn: Connection,
    stream: TcpStream,
    mut output: mpsc::UnboundedReceiver<Vec<u8>>,
    max_payload: usize,
    registry: Arc<ConnectionRegistry>,
) {
    let (mut reader, mut writer) = stream.into_split();

    let inbound = async {
        loop {
            match read_frame(&mut reader, max_payload).await {
                Ok(Some(frame)) => conn.callbacks().on_message(&conn, &frame),
                Ok(None) => {
                    debug!("connection {}: peer {} closed", conn.id(), conn.peer_addr());
                    break;
                }
                Err(e) => {
                    warn!("connection {} read failed: {}", conn.id(), e);
                    break;
                }
            }
        }
    };

    let outbound = async {
        while let Some(bytes) = output.recv().await {
            if let Err(e) = writer.write_all(&bytes).await {
                warn!("connection {} write failed: {}", conn.id(), e);
                break;
            }
        }
    };

    let requested = tokio::select! {
        _ = inbound => false,
        _ = outbound => false,
        _ = conn.closing() => true,
    };

    if requested {
        // Flush whatever was queued before the shutdown request.
        while let Ok(bytes) = output.try_recv() {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
        let _ = writer.shutdown().await;
    }

    conn.close();
    registry.remove(conn.id());
}
