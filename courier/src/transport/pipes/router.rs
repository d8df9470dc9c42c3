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

//! Router delivering brokered messages to peers over named pipes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::net::UnixStream;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};

use super::listener::{self, PipeListenerHandle};
use super::peer_table::PeerTable;
use super::protocol::write_envelope;
use crate::common::{
    HandlerRegistration, MessagingError, PipesConfig, Reply, RouteOutcome, RouterContext, TransportError,
    CONFIG,
};
use crate::message::{BrokeredMessage, MessageContext, PeerInfo, PeersChangedMessage, WireEnvelope};
use crate::traits::MessageRouter;

type Connection = Arc<Mutex<UnixStream>>;

struct PipesState {
    context: RouterContext,
    listener: PipeListenerHandle,
}

/// Delivers messages to other application instances through named pipes.
///
/// Each instance listens on `<runtime dir>/<namespace>/<server name>.pipe`.
/// Recipients are resolved through the [`PeerTable`], which is replaced
/// whenever a [`PeersChangedMessage`] arrives. Outbound connections are
/// opened on first use, cached per peer address and written to one frame at
/// a time.
///
/// Messages for this instance, and messages whose recipients are not known
/// peers, are passed on to the next router.
pub struct PipesRouter {
    config: PipesConfig,
    peers: Arc<PeerTable>,
    connections: DashMap<String, Connection>,
    state: OnceCell<PipesState>,
}

impl Default for PipesRouter {
    fn default() -> Self {
        Self::new(CONFIG.pipes.clone())
    }
}

impl PipesRouter {
    /// Creates a router; the listener starts on initialization.
    #[must_use]
    pub fn new(config: PipesConfig) -> Self {
        Self {
            config,
            peers: Arc::new(PeerTable::new()),
            connections: DashMap::new(),
            state: OnceCell::new(),
        }
    }

    /// The peer table.
    #[must_use]
    pub const fn peers(&self) -> &Arc<PeerTable> {
        &self.peers
    }

    /// Entry describing this instance, once the listener is running.
    #[must_use]
    pub fn local_peer(&self) -> Option<PeerInfo> {
        self.state.get().map(|state| {
            PeerInfo::new(
                state.context.identity.app_id.clone(),
                state.context.identity.app_instance_id.clone(),
                state.listener.socket_path.to_string_lossy().into_owned(),
            )
        })
    }

    /// The running listener.
    #[must_use]
    pub fn listener(&self) -> Option<&PipeListenerHandle> {
        self.state.get().map(|state| &state.listener)
    }

    /// Socket path this router listens on for `identity`'s instance id.
    fn socket_path(&self, context: &RouterContext) -> PathBuf {
        let server_name = self
            .config
            .server_name
            .clone()
            .unwrap_or_else(|| context.identity.app_instance_id.clone());
        self.config.socket_path(&server_name)
    }

    /// Replaces the local peer table and broadcasts `peers` to every other peer.
    ///
    /// # Returns
    ///
    /// The number of peers the announcement reached.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotInitialized`] before initialization. Failures to
    /// reach individual peers are logged and skipped.
    #[instrument(skip_all, fields(peers = peers.len()))]
    pub async fn announce_peers(&self, peers: Vec<PeerInfo>) -> Result<usize, TransportError> {
        let state = self.state()?;
        self.peers.replace(peers.iter().cloned());

        let identity = &state.context.identity;
        let announcement = BrokeredMessage::new(PeersChangedMessage { peers: peers.clone() })
            .with_sender(identity.endpoint())
            .one_way();
        let wire = WireEnvelope::from_brokered(&announcement, &state.context.types)?;

        let mut reached = 0;
        for peer in peers
            .iter()
            .filter(|peer| peer.app_instance_id != identity.app_instance_id)
        {
            match self.send_to_peer(peer, &wire).await {
                Ok(()) => reached += 1,
                Err(e) => warn!(peer = %peer.app_instance_id, error = %e, "Failed to announce peers"),
            }
        }
        debug!(reached, "Peer announcement sent");
        Ok(reached)
    }

    /// A handler applying [`PeersChangedMessage`]s that reach the processor.
    ///
    /// Announcements arriving over pipes update the table directly. Register
    /// this handler when announcements may also travel over other transports.
    #[must_use]
    pub fn peers_changed_registration(&self) -> HandlerRegistration {
        let peers = self.peers.clone();
        HandlerRegistration::for_message::<PeersChangedMessage, _, _>(move |announcement, _ctx| {
            peers.replace(announcement.peers);
            async { Reply::ready() }
        })
        .named("courier::pipes-peers-changed")
    }

    fn state(&self) -> Result<&PipesState, TransportError> {
        self.state
            .get()
            .ok_or_else(|| TransportError::NotInitialized(self.name().to_string()))
    }

    /// Peers serving the remote recipients of `message`.
    fn remote_peers(&self, message: &BrokeredMessage, context: &RouterContext) -> Vec<PeerInfo> {
        let mut targets: Vec<PeerInfo> = Vec::new();
        for recipient in &message.recipients {
            if recipient.targets(&context.identity) {
                continue;
            }
            if let Some(peer) = self.peers.find(recipient) {
                if !targets.contains(&peer) {
                    targets.push(peer);
                }
            }
        }
        targets
    }

    async fn connect(&self, address: &str) -> Result<Connection, TransportError> {
        if let Some(connection) = self.connections.get(address) {
            return Ok(connection.clone());
        }

        let stream = tokio::time::timeout(self.config.connection_timeout(), UnixStream::connect(address))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(format!("{address}: {e}")))?;
        trace!(address, "Opened pipe connection");

        let connection = self
            .connections
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(stream)))
            .clone();
        Ok(connection)
    }

    /// Writes one envelope to a peer, reconnecting once if a cached
    /// connection turns out to be broken.
    async fn send_to_peer(&self, peer: &PeerInfo, wire: &WireEnvelope) -> Result<(), TransportError> {
        if self.write_to(&peer.address, wire).await.is_ok() {
            return Ok(());
        }
        debug!(peer = %peer.app_instance_id, "Reconnecting broken pipe");
        self.write_to(&peer.address, wire).await
    }

    /// Writes one frame through the cached connection for `address`.
    ///
    /// A connection whose frame did not complete, because the write failed or
    /// the future was dropped halfway, is evicted from the cache.
    async fn write_to(&self, address: &str, wire: &WireEnvelope) -> Result<(), TransportError> {
        let connection = self.connect(address).await?;
        let mut stream = connection.lock().await;
        let mut frame = FrameGuard {
            connections: &self.connections,
            address,
            connection: &connection,
            complete: false,
        };
        let written = write_envelope(&mut *stream, wire).await;
        frame.complete = written.is_ok();
        written
    }
}

/// Evicts a connection left with a partial frame on it.
struct FrameGuard<'a> {
    connections: &'a DashMap<String, Connection>,
    address: &'a str,
    connection: &'a Connection,
    complete: bool,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        if !self.complete {
            trace!(address = self.address, "Evicting pipe connection with an unfinished frame");
            self.connections
                .remove_if(self.address, |_, cached| Arc::ptr_eq(cached, self.connection));
        }
    }
}

#[async_trait]
impl MessageRouter for PipesRouter {
    fn name(&self) -> &str {
        "pipes"
    }

    async fn initialize(&self, context: RouterContext) -> Result<(), TransportError> {
        self.state
            .get_or_try_init(|| async move {
                let socket_path = self.socket_path(&context);
                let listener =
                    listener::start(socket_path, &self.config, self.peers.clone(), context.clone()).await?;
                Ok::<_, TransportError>(PipesState { context, listener })
            })
            .await
            .map(|_| ())
    }

    async fn send_core(
        &self,
        message: &BrokeredMessage,
        _context: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome, MessagingError> {
        let state = self.state()?;
        let targets = self.remote_peers(message, &state.context);
        if targets.is_empty() {
            return Ok(RouteOutcome::continue_routing());
        }

        let wire = WireEnvelope::from_brokered(message, &state.context.types)?;
        for peer in &targets {
            trace!(message_id = %message.id, peer = %peer.app_instance_id, "Sending over pipe");
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(MessagingError::Cancelled),
                sent = self.send_to_peer(peer, &wire) => sent?,
            }
        }

        if message.one_way {
            Ok(RouteOutcome::stop(None))
        } else {
            Ok(RouteOutcome::reply_expected())
        }
    }

    fn is_authoritative_for(&self, message: &BrokeredMessage) -> bool {
        self.state
            .get()
            .is_some_and(|state| !self.remote_peers(message, &state.context).is_empty())
    }
}

impl std::fmt::Debug for PipesRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipesRouter")
            .field("namespace", &self.config.namespace)
            .field("peers", &self.peers.len())
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{InboundSink, MessageTypeRegistry};
    use crate::common::RoutingInstruction;
    use crate::message::{AppIdentity, Endpoint};
    use tokio::sync::mpsc;

    fn context(identity: AppIdentity) -> (RouterContext, mpsc::Receiver<BrokeredMessage>) {
        let (sender, receiver) = mpsc::channel(8);
        let context = RouterContext {
            identity,
            types: Arc::new(MessageTypeRegistry::new()),
            inbound: InboundSink::new(sender),
            cancel: CancellationToken::new(),
        };
        (context, receiver)
    }

    fn config(dir: &tempfile::TempDir) -> PipesConfig {
        PipesConfig {
            runtime_dir: Some(dir.path().to_path_buf()),
            ..PipesConfig::default()
        }
    }

    #[tokio::test]
    async fn test_send_before_initialize_fails() {
        let router = PipesRouter::new(PipesConfig::default());
        let message = BrokeredMessage::new(PeersChangedMessage { peers: vec![] });
        let result = router
            .send_core(&message, &MessageContext::new(), &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(MessagingError::Transport(TransportError::NotInitialized(_)))
        ));
    }

    #[tokio::test]
    async fn test_unknown_recipient_continues() {
        let dir = tempfile::tempdir().unwrap();
        let router = PipesRouter::new(config(&dir));
        let (ctx, _inbound) = context(AppIdentity::new("billing", "b-1"));
        router.initialize(ctx.clone()).await.unwrap();

        let message = BrokeredMessage::new(PeersChangedMessage { peers: vec![] }).to(Endpoint::app("pricing"));
        let outcome = router
            .send_core(&message, &MessageContext::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.instruction, RoutingInstruction::Continue);
        assert!(!router.is_authoritative_for(&message));
        ctx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_announcement_replaces_remote_peer_table() {
        let dir = tempfile::tempdir().unwrap();
        let a = PipesRouter::new(config(&dir));
        let b = PipesRouter::new(config(&dir));
        let (ctx_a, _inbound_a) = context(AppIdentity::new("billing", "a-1"));
        let (ctx_b, _inbound_b) = context(AppIdentity::new("pricing", "b-1"));
        a.initialize(ctx_a.clone()).await.unwrap();
        b.initialize(ctx_b.clone()).await.unwrap();

        let peers = vec![a.local_peer().unwrap(), b.local_peer().unwrap()];
        let reached = a.announce_peers(peers).await.unwrap();
        assert_eq!(reached, 1);

        for _ in 0..100 {
            if b.peers().len() == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(b.peers().len(), 2);
        assert!(b.peers().get("a-1").is_some());
        assert_eq!(b.listener().unwrap().stats.snapshot().peer_updates, 1);

        ctx_a.cancel.cancel();
        ctx_b.cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancelled_write_evicts_connection() {
        let dir = tempfile::tempdir().unwrap();
        let address = dir.path().join("silent.pipe");
        let silent = tokio::net::UnixListener::bind(&address).unwrap();
        // accept and hold the stream without ever reading from it
        let held = tokio::spawn(async move { silent.accept().await.map(|(stream, _)| stream) });

        let router = PipesRouter::new(config(&dir));
        let (ctx, _inbound) = context(AppIdentity::new("billing", "b-1"));
        router.initialize(ctx.clone()).await.unwrap();
        let address = address.to_string_lossy().into_owned();
        router.peers().replace(vec![PeerInfo::new("silent", "s-1", address.clone())]);

        // larger than the socket buffer, so the write stalls mid-frame
        let filler = "x".repeat(1024);
        let peers = (0..4096)
            .map(|i| PeerInfo::new("filler", format!("f-{i}"), filler.clone()))
            .collect();
        let message = BrokeredMessage::new(PeersChangedMessage { peers })
            .to(Endpoint::instance("silent", "s-1"))
            .one_way();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            canceller.cancel();
        });
        let result = router.send_core(&message, &MessageContext::new(), &cancel).await;

        assert!(matches!(result, Err(MessagingError::Cancelled)));
        assert!(router.connections.get(&address).is_none());
        drop(held);
        ctx.cancel.cancel();
    }
}
