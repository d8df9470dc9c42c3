/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

//! Unix domain socket listener accepting envelopes from peers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::peer_table::PeerTable;
use super::protocol::{read_frame, write_heartbeat, FRAME_HEARTBEAT};
use crate::common::{PipesConfig, RouterContext, TransportError};
use crate::message::{BrokeredMessage, PeersChangedMessage, WireEnvelope};
use crate::traits::MessageEnvelope;

/// Counters kept by a running pipe listener.
#[derive(Debug, Default)]
pub struct PipeListenerStats {
    accepted: AtomicUsize,
    active: AtomicUsize,
    delivered: AtomicUsize,
    peer_updates: AtomicUsize,
    errors: AtomicUsize,
}

/// A point-in-time copy of [`PipeListenerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipeListenerCounts {
    /// Connections accepted since start.
    pub accepted: usize,
    /// Connections currently open.
    pub active: usize,
    /// Envelopes handed to the broker.
    pub delivered: usize,
    /// Peer announcements applied to the table.
    pub peer_updates: usize,
    /// Rejected connections, undecodable envelopes and I/O failures.
    pub errors: usize,
}

impl PipeListenerStats {
    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> PipeListenerCounts {
        PipeListenerCounts {
            accepted: self.accepted.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            peer_updates: self.peer_updates.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
}

/// A running listener. It stops with the bus, or earlier through [`stop`](Self::stop).
#[derive(Debug)]
pub struct PipeListenerHandle {
    /// Listener counters.
    pub stats: Arc<PipeListenerStats>,
    /// Socket the listener is bound to.
    pub socket_path: PathBuf,
    cancel_token: CancellationToken,
}

impl PipeListenerHandle {
    /// Stops accepting peers, closes open connections and removes the socket file.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}

/// Shared state of every connection handler.
struct ConnectionState {
    max_message_size: usize,
    peers: Arc<PeerTable>,
    context: RouterContext,
    stats: Arc<PipeListenerStats>,
}

/// Binds the pipe at `socket_path` and starts accepting peers.
///
/// A socket file left behind by a dead process is removed; a live one is an
/// error. The listener stops, and removes its socket file, when the token in
/// `context` is cancelled.
///
/// # Errors
///
/// * [`TransportError::ConnectionFailed`] - Another listener owns the socket.
/// * [`TransportError::IoError`] - The directory, bind or permissions failed.
pub async fn start(
    socket_path: PathBuf,
    config: &PipesConfig,
    peers: Arc<PeerTable>,
    context: RouterContext,
) -> Result<PipeListenerHandle, TransportError> {
    let stats = Arc::new(PipeListenerStats::default());

    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            TransportError::IoError(format!(
                "Failed to create socket directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    if socket_path.exists() {
        if socket_is_alive(&socket_path).await {
            return Err(TransportError::ConnectionFailed(format!(
                "Another listener is already running at {}",
                socket_path.display()
            )));
        }
        warn!("Removing stale socket: {}", socket_path.display());
        tokio::fs::remove_file(&socket_path).await.map_err(|e| {
            TransportError::IoError(format!(
                "Failed to remove stale socket {}: {}",
                socket_path.display(),
                e
            ))
        })?;
    }

    let listener = UnixListener::bind(&socket_path).map_err(|e| {
        TransportError::IoError(format!(
            "Failed to bind socket at {}: {}",
            socket_path.display(),
            e
        ))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(config.socket_mode);
        std::fs::set_permissions(&socket_path, perms).map_err(|e| {
            TransportError::IoError(format!(
                "Failed to set socket permissions on {}: {}",
                socket_path.display(),
                e
            ))
        })?;
    }

    info!("Pipe listener started on: {}", socket_path.display());

    let cancel_token = context.cancel.child_token();
    let semaphore = Arc::new(Semaphore::new(config.max_connections.max(1)));
    let state = Arc::new(ConnectionState {
        max_message_size: config.max_message_size,
        peers,
        context,
        stats: stats.clone(),
    });

    let accept_cancel = cancel_token.clone();
    let cleanup_path = socket_path.clone();
    tokio::spawn(async move {
        accept_loop(listener, state, semaphore, accept_cancel).await;

        if let Err(e) = tokio::fs::remove_file(&cleanup_path).await {
            warn!("Failed to remove socket file on shutdown: {}", e);
        } else {
            debug!("Socket file removed: {}", cleanup_path.display());
        }
        info!("Pipe listener shut down");
    });

    Ok(PipeListenerHandle {
        stats,
        socket_path,
        cancel_token,
    })
}

async fn accept_loop(
    listener: UnixListener,
    state: Arc<ConnectionState>,
    semaphore: Arc<Semaphore>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                info!("Pipe listener received shutdown signal");
                break;
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _addr)) => {
                        let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                            warn!("Maximum concurrent connections reached, rejecting connection");
                            state.stats.record_error();
                            continue;
                        };

                        let conn_id = state.stats.accepted.fetch_add(1, Ordering::Relaxed) + 1;
                        state.stats.active.fetch_add(1, Ordering::Relaxed);
                        trace!("Accepted connection #{}", conn_id);

                        let state = state.clone();
                        let cancel_token = cancel_token.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, conn_id, &state, &cancel_token).await;
                            state.stats.active.fetch_sub(1, Ordering::Relaxed);
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        state.stats.record_error();
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    conn_id: usize,
    state: &ConnectionState,
    cancel_token: &CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();
    debug!("Connection #{} handler started", conn_id);

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                trace!("Connection #{} received shutdown signal", conn_id);
                break;
            }

            frame_result = read_frame(&mut reader, state.max_message_size) => {
                match frame_result {
                    Ok((kind, _)) if kind == FRAME_HEARTBEAT => {
                        trace!("Connection #{} received heartbeat", conn_id);
                        if let Err(e) = write_heartbeat(&mut writer).await {
                            error!("Connection #{} failed to answer heartbeat: {}", conn_id, e);
                            break;
                        }
                    }
                    Ok((_, payload)) => {
                        if let Err(e) = accept_envelope(&payload, state).await {
                            warn!("Connection #{} dropped an envelope: {}", conn_id, e);
                            state.stats.record_error();
                            if e == TransportError::ConnectionClosed {
                                break;
                            }
                        }
                    }
                    Err(TransportError::ConnectionClosed) => {
                        debug!("Connection #{} closed by peer", conn_id);
                        break;
                    }
                    Err(e) => {
                        error!("Connection #{} error: {}", conn_id, e);
                        state.stats.record_error();
                        break;
                    }
                }
            }
        }
    }

    debug!("Connection #{} handler finished", conn_id);
}

/// Decodes one envelope and applies it.
///
/// Peer announcements update the peer table directly; everything else goes
/// to the broker.
async fn accept_envelope(payload: &[u8], state: &ConnectionState) -> Result<(), TransportError> {
    let message = WireEnvelope::from_bytes(payload)?.into_brokered(&state.context.types)?;
    trace!(message_id = %message.id, sender = %message.sender, "Envelope received");

    if let Some(announcement) = peers_changed(&message) {
        state.peers.replace(announcement.peers.iter().cloned());
        state.stats.peer_updates.fetch_add(1, Ordering::Relaxed);
        return Ok(());
    }

    state.context.inbound.deliver(message).await?;
    state.stats.delivered.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

fn peers_changed(message: &BrokeredMessage) -> Option<&PeersChangedMessage> {
    message
        .content()
        .ok()?
        .as_any()
        .downcast_ref::<PeersChangedMessage>()
}

/// Attempt to connect to an existing socket to check if it's alive.
pub async fn socket_is_alive(path: &Path) -> bool {
    UnixStream::connect(path).await.is_ok()
}
