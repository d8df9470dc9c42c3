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

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::common::{
    MessageProcessor, MessagingError, PendingReplies, RemoteFault, ReplyResult, RouterChain,
};
use crate::message::{AppIdentity, BrokeredMessage, MessageContext};

/// Ties the router chain to the local processor.
///
/// Outbound, [`dispatch`](MessageBroker::dispatch) stamps the sender and routes
/// the message through the chain. Inbound, [`receive`](MessageBroker::receive)
/// either completes the caller waiting for a reply or processes the message
/// locally and routes the answer back to its sender.
pub struct MessageBroker {
    identity: AppIdentity,
    processor: Arc<MessageProcessor>,
    chain: RouterChain,
    cancel: CancellationToken,
}

impl MessageBroker {
    /// Creates a broker.
    ///
    /// # Arguments
    ///
    /// * `identity` - The local application instance.
    /// * `processor` - Local handler execution.
    /// * `chain` - Routers for outbound messages and replies.
    /// * `cancel` - Stops the receive loop and cancels inbound processing.
    #[must_use]
    pub const fn new(
        identity: AppIdentity,
        processor: Arc<MessageProcessor>,
        chain: RouterChain,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            processor,
            chain,
            cancel,
        }
    }

    /// The local application instance.
    #[must_use]
    pub const fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// The router chain.
    #[must_use]
    pub const fn chain(&self) -> &RouterChain {
        &self.chain
    }

    /// Callers currently waiting for replies.
    #[must_use]
    pub const fn pending(&self) -> &Arc<PendingReplies> {
        self.chain.pending()
    }

    /// Routes an outbound message and returns its reply.
    ///
    /// # Errors
    ///
    /// See [`RouterChain::route`].
    #[instrument(skip_all, fields(message_id = %message.id))]
    pub async fn dispatch(&self, mut message: BrokeredMessage, cancel: &CancellationToken) -> ReplyResult {
        if message.sender.is_empty() {
            message.sender = self.identity.endpoint();
        }
        let context = MessageContext::for_brokered(&message);
        self.chain.route(&message, &context, cancel).await
    }

    /// Handles a message received from a transport.
    ///
    /// Replies complete their waiting caller (a fault completes it with
    /// [`MessagingError::Remote`]). Other messages are processed locally; unless
    /// the message is one-way, the response or the failure is routed back to
    /// the sender.
    #[instrument(skip_all, fields(message_id = %message.id))]
    pub async fn receive(&self, mut message: BrokeredMessage) {
        if let Some(reply_to) = message.reply_to.clone() {
            let result = match message.fault.take() {
                Some(fault) => Err(MessagingError::Remote(fault)),
                None => Ok(message.into_content()),
            };
            if !self.pending().complete(&reply_to, result) {
                debug!(reply_to = %reply_to, "Nobody is waiting for this reply");
            }
            return;
        }

        let outcome = self
            .processor
            .process_content(&message, MessageContext::new(), &self.cancel)
            .await;

        if message.one_way {
            if let Err(e) = outcome {
                warn!(error = %e, "One-way message failed");
            }
            return;
        }

        let sender = self.identity.endpoint();
        let reply = match outcome {
            Ok(reply) => message.reply(sender.clone(), reply.into_inner()),
            Err(e) => {
                debug!(error = %e, "Returning fault to sender");
                message.fault_reply(sender.clone(), RemoteFault::from(&e))
            }
        };
        let Err(e) = self.route_reply(&reply).await else {
            return;
        };
        if reply.fault.is_some() {
            warn!(error = %e, "Failed to route fault reply");
            return;
        }

        // the caller is still waiting on this id
        warn!(error = %e, "Failed to route reply, returning fault instead");
        let fault = message.fault_reply(sender, RemoteFault::from(&e));
        if let Err(e) = self.route_reply(&fault).await {
            warn!(error = %e, "Failed to route fault reply");
        }
    }

    async fn route_reply(&self, reply: &BrokeredMessage) -> Result<(), MessagingError> {
        trace!(reply_id = %reply.id, "Routing reply");
        let context = MessageContext::for_brokered(reply);
        self.chain.route(reply, &context, &self.cancel).await.map(|_| ())
    }

    /// Spawns the loop consuming envelopes delivered by transports.
    ///
    /// Each message is handled on its own task so a slow handler does not hold
    /// up replies. The loop ends when the broker's token is cancelled or every
    /// sender is gone.
    pub fn spawn_receive_loop(self: &Arc<Self>, mut inbound: mpsc::Receiver<BrokeredMessage>) -> JoinHandle<()> {
        let broker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = broker.cancel.cancelled() => {
                        debug!("Receive loop received shutdown signal");
                        break;
                    }

                    received = inbound.recv() => {
                        let Some(message) = received else {
                            debug!("Inbound queue closed");
                            break;
                        };
                        let broker = Arc::clone(&broker);
                        tokio::spawn(async move {
                            broker.receive(message).await;
                        });
                    }
                }
            }
            info!("Message broker receive loop stopped");
        })
    }
}

impl fmt::Debug for MessageBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBroker")
            .field("identity", &self.identity)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}
