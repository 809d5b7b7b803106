use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use crate::metainfo::InfoHash;
use crate::peer::{accept_peer, reply_handshake, PeerError};

use super::core::Engine;
use super::torrent::spawn_peer;

/// The engine-wide accept loop.
///
/// Accept errors are transient (fd exhaustion, aborted connects); the
/// loop logs and keeps going until the engine shuts down.
pub(super) async fn run_accept_loop(engine: Arc<Engine>, listener: TcpListener) {
    let shutdown = engine.shutdown_token();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!("inbound listener stopping");
                return;
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        tracing::trace!(peer = %addr, "inbound connection");
                        let engine = engine.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_inbound(engine, stream).await {
                                tracing::debug!(peer = %addr, error = %e, "inbound peer rejected");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                }
            }
        }
    }
}

/// Handshakes one inbound connection: read 68 bytes under the timeout,
/// look the info hash up, reply or close.
async fn handle_inbound(engine: Arc<Engine>, stream: TcpStream) -> Result<(), PeerError> {
    let (reader, mut writer, handshake, addr) = accept_peer(stream).await?;

    let info_hash = InfoHash(handshake.info_hash);
    let Some(ctx) = engine.running_context(&info_hash) else {
        // Unknown torrent: close without replying.
        return Err(PeerError::InfoHashMismatch);
    };

    reply_handshake(&mut writer, info_hash.0, engine.peer_id()).await?;
    spawn_peer(&ctx, reader, writer, handshake.peer_id, addr);

    Ok(())
}
