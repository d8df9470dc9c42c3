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
use std::time::Duration;

use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::{
    MessagingError, PendingReplies, ReplyResult, RouteOutcome, RouterContext, RoutingInstruction,
    TransportError,
};
use crate::message::{BrokeredMessage, MessageContext};
use crate::traits::MessageRouter;

/// Restricts which messages a router in the chain is offered.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RecipientMatch {
    /// Every message.
    #[default]
    Any,
    /// Messages with a recipient in the named application.
    App(String),
    /// Messages with a recipient naming this application instance id.
    AppInstance(String),
    /// Messages without recipients.
    Unaddressed,
}

impl RecipientMatch {
    /// Returns `true` if the router should be offered `message`.
    #[must_use]
    pub fn accepts(&self, message: &BrokeredMessage) -> bool {
        match self {
            Self::Any => true,
            Self::Unaddressed => message.is_unaddressed(),
            Self::App(app_id) => message
                .recipients
                .iter()
                .any(|recipient| recipient.app_id.as_deref() == Some(app_id.as_str())),
            Self::AppInstance(instance_id) => message
                .recipients
                .iter()
                .any(|recipient| recipient.app_instance_id.as_deref() == Some(instance_id.as_str())),
        }
    }
}

struct RouterEntry {
    router: Arc<dyn MessageRouter>,
    priority: i32,
    recipients: RecipientMatch,
    initialized: OnceCell<()>,
}

/// The ordered chain of routers a brokered message walks through.
///
/// Routers run by descending priority, in registration order on ties. Each
/// router is initialized once, before it is first offered a message. A
/// router answering [`RoutingInstruction::Continue`] passes the message on;
/// [`Stop`](RoutingInstruction::Stop) ends routing with its reply;
/// [`ReplyExpected`](RoutingInstruction::ReplyExpected) ends routing with its
/// reply or, when it carries none, with the correlated reply awaited from
/// [`PendingReplies`].
pub struct RouterChain {
    entries: Vec<RouterEntry>,
    context: RouterContext,
    pending: Arc<PendingReplies>,
    default_timeout: Duration,
}

impl RouterChain {
    /// Creates an empty chain.
    ///
    /// # Arguments
    ///
    /// * `context` - Handed to every router on initialization.
    /// * `pending` - Table the broker completes when replies arrive.
    /// * `default_timeout` - Reply timeout for messages without their own.
    #[must_use]
    pub fn new(context: RouterContext, pending: Arc<PendingReplies>, default_timeout: Duration) -> Self {
        Self {
            entries: Vec::new(),
            context,
            pending,
            default_timeout,
        }
    }

    /// Adds a router.
    pub fn add(&mut self, router: Arc<dyn MessageRouter>, priority: i32, recipients: RecipientMatch) {
        debug!(router = router.name(), priority, ?recipients, "Adding router");
        let position = self
            .entries
            .iter()
            .position(|entry| entry.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(
            position,
            RouterEntry {
                router,
                priority,
                recipients,
                initialized: OnceCell::new(),
            },
        );
    }

    /// Router names in chain order.
    pub fn router_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.router.name())
    }

    /// Number of routers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the chain has no router.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The reply table shared with the broker.
    #[must_use]
    pub const fn pending(&self) -> &Arc<PendingReplies> {
        &self.pending
    }

    /// Initializes every router now instead of on first use.
    ///
    /// # Errors
    ///
    /// The first initialization failure. Routers before it stay initialized;
    /// the failing one is retried on its next use.
    pub async fn initialize(&self) -> Result<(), TransportError> {
        for entry in &self.entries {
            self.ensure_initialized(entry).await?;
        }
        Ok(())
    }

    async fn ensure_initialized(&self, entry: &RouterEntry) -> Result<(), TransportError> {
        entry
            .initialized
            .get_or_try_init(|| async {
                debug!(router = entry.router.name(), "Initializing router");
                entry.router.initialize(self.context.clone()).await
            })
            .await
            .map(|_| ())
    }

    /// Routes a brokered message and returns its reply.
    ///
    /// A waiter is registered before the first router runs (unless the
    /// message is one-way) and is removed on every exit path.
    ///
    /// # Errors
    ///
    /// * [`MessagingError::NoRouteFound`] - Every router declined.
    /// * [`MessagingError::RouteTimeout`] - The correlated reply did not arrive in time.
    /// * [`MessagingError::Cancelled`] - `cancel` fired.
    /// * [`MessagingError::Transport`] - An authoritative router failed.
    /// * Any non-transport error a router returned, and errors carried by the reply.
    #[instrument(skip_all, fields(message_id = %message.id))]
    pub async fn route(
        &self,
        message: &BrokeredMessage,
        context: &MessageContext,
        cancel: &CancellationToken,
    ) -> ReplyResult {
        let mut pending = (!message.one_way).then(|| self.pending.register(message.id.clone()));

        for entry in self.entries.iter().filter(|entry| entry.recipients.accepts(message)) {
            let router = entry.router.name();
            let authoritative = entry.router.is_authoritative_for(message);

            if let Err(e) = self.ensure_initialized(entry).await {
                if authoritative {
                    error!(router, error = %e, "Authoritative router failed to initialize");
                    return Err(MessagingError::Transport(e));
                }
                warn!(router, error = %e, "Router failed to initialize, skipping");
                continue;
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(MessagingError::Cancelled),
                outcome = entry.router.send_core(message, context, cancel) => outcome,
            };

            let RouteOutcome { instruction, reply } = match outcome {
                Ok(outcome) => outcome,
                Err(MessagingError::Transport(e)) if !authoritative => {
                    warn!(router, error = %e, "Transport failed, trying next router");
                    continue;
                }
                Err(e) => {
                    error!(router, error = %e, "Routing failed");
                    return Err(e);
                }
            };

            trace!(router, ?instruction, has_reply = reply.is_some(), "Router answered");
            match (instruction, reply) {
                (RoutingInstruction::Continue, _) => {}
                (RoutingInstruction::Stop, reply) | (RoutingInstruction::ReplyExpected, reply @ Some(_)) => {
                    return Ok(reply);
                }
                (RoutingInstruction::ReplyExpected, None) => {
                    let Some(pending) = pending.as_mut() else {
                        return Ok(None);
                    };
                    let timeout = message.timeout.unwrap_or(self.default_timeout);
                    return pending.wait(timeout, cancel).await;
                }
            }
        }

        warn!("No router accepted the message");
        Err(MessagingError::NoRouteFound {
            message_id: message.id.clone(),
        })
    }
}

impl fmt::Debug for RouterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterChain")
            .field("routers", &self.router_names().collect::<Vec<_>>())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}
