//! TCP connection lifecycle: accepts peer connections, frames packets off
//! the wire, and dispatches them into the bridge state machine.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::bridge::WireBridge;
use crate::codec::{FrameError, decode_frame, encode_frame};
use crate::event_handler::EventHandler;
use crate::packet::Packet;

#[derive(Debug, thiserror::Error)]
enum ConnectionError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Runs the accept loop until `shutdown` is cancelled. Each accepted
/// connection is handled on its own task and maps to exactly one peer,
/// identified by `peer_id_for` from the connecting socket address.
pub async fn serve<E, F>(
    listener: TcpListener,
    bridge: Arc<WireBridge<E>>,
    peer_id_for: F,
    shutdown: CancellationToken,
) where
    E: EventHandler + 'static,
    F: Fn(SocketAddr) -> String + Send + Sync + 'static,
{
    let peer_id_for = Arc::new(peer_id_for);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("wire bridge accept loop shutting down");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let bridge = bridge.clone();
                        let peer_id = (peer_id_for)(addr);
                        let connection_shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(error) =
                                handle_connection(stream, bridge, peer_id.clone(), connection_shutdown).await
                            {
                                tracing::warn!(peer_id, %error, "wire connection closed with error");
                            }
                        });
                    }
                    Err(error) => tracing::warn!(%error, "failed to accept wire connection"),
                }
            }
        }
    }
}

async fn handle_connection<E: EventHandler>(
    mut stream: TcpStream,
    bridge: Arc<WireBridge<E>>,
    peer_id: String,
    shutdown: CancellationToken,
) -> Result<(), ConnectionError> {
    let mut buf = BytesMut::with_capacity(8 * 1024);
    let mut chunk = [0u8; 4 * 1024];
    loop {
        while let Some(packet) = decode_frame(&mut buf)? {
            if let Some(response) = dispatch(&bridge, &peer_id, packet).await {
                let framed = encode_frame(&response)?;
                stream.write_all(&framed).await?;
            }
        }
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = stream.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

/// Only PREPARE packets are dispatched through the bridge's state machine
/// here; a FULFILL/REJECT arriving on an inbound connection answers a
/// prepare this node sent upstream and is the caller's (forwarding/upstream
/// client) responsibility to correlate, not this accept loop's.
async fn dispatch<E: EventHandler>(
    bridge: &WireBridge<E>,
    peer_id: &str,
    packet: Packet,
) -> Option<Packet> {
    match packet {
        Packet::Prepare(prepare) => Some(bridge.handle_prepare(peer_id, prepare).await),
        other => {
            tracing::debug!(peer_id, ?other, "received non-PREPARE packet on inbound connection");
            None
        }
    }
}
