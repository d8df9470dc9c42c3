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

//! Specialized resolvers installed next to the default [`HandlerRegistry`].

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::{HandlerRegistration, HandlerRegistry, MessageBroker, Reply, TypeMatcher};
use crate::message::{BrokeredMessage, MessageContext};
use crate::traits::{HandlerResolver, Message, MessageHandler, MessageKind, MessageType};

/// Priority of [`BrokeredMessageResolver`] in the processor chain.
pub const BROKERED_RESOLVER_PRIORITY: i32 = 100;

/// Priority of [`EventHandlerResolver`] in the processor chain.
pub const EVENT_RESOLVER_PRIORITY: i32 = 50;

/// Resolves event subscriptions.
///
/// Owns its own registry of subscribers and only answers for messages declared
/// with [`MessageKind::Event`]. Resolution returns the single best subscriber;
/// [`resolve_all`](HandlerResolver::resolve_all) returns every subscriber for
/// fan-out.
#[derive(Debug, Default)]
pub struct EventHandlerResolver {
    subscribers: HandlerRegistry,
}

impl EventHandlerResolver {
    /// Creates a resolver without subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    pub fn subscribe(&self, registration: HandlerRegistration) {
        self.subscribers.register(registration);
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Returns `true` if nothing subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl HandlerResolver for EventHandlerResolver {
    fn priority(&self) -> i32 {
        EVENT_RESOLVER_PRIORITY
    }

    fn try_resolve(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Option<Arc<HandlerRegistration>> {
        if !message_type.is(MessageKind::Event) {
            return None;
        }
        self.subscribers.try_resolve(message_type, envelope_type)
    }

    fn resolve_all(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Vec<Arc<HandlerRegistration>> {
        if !message_type.is(MessageKind::Event) {
            return Vec::new();
        }
        self.subscribers.matching(message_type, envelope_type)
    }
}

/// Resolves whole [`BrokeredMessage`]s to the broker's dispatch handler.
///
/// Processing a brokered message through the processor therefore routes it
/// through the router chain instead of handling it locally.
#[derive(Debug)]
pub struct BrokeredMessageResolver {
    registration: Arc<HandlerRegistration>,
}

impl BrokeredMessageResolver {
    /// Creates a resolver dispatching to `broker`.
    ///
    /// The broker is held weakly: it owns the processor this resolver is
    /// installed in.
    #[must_use]
    pub fn new(broker: &Arc<MessageBroker>) -> Self {
        let handler = BrokerDispatchHandler {
            broker: Arc::downgrade(broker),
        };
        Self {
            registration: Arc::new(HandlerRegistration::new(
                "courier::broker-dispatch",
                TypeMatcher::exact::<BrokeredMessage>(),
                Arc::new(handler),
            )),
        }
    }
}

impl HandlerResolver for BrokeredMessageResolver {
    fn priority(&self) -> i32 {
        BROKERED_RESOLVER_PRIORITY
    }

    fn try_resolve(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Option<Arc<HandlerRegistration>> {
        // only whole brokered messages; unwrapped payloads go to the other resolvers
        (envelope_type.is_none() && message_type.is_type::<BrokeredMessage>())
            .then(|| self.registration.clone())
    }
}

struct BrokerDispatchHandler {
    broker: Weak<MessageBroker>,
}

#[async_trait]
impl MessageHandler for BrokerDispatchHandler {
    async fn process(
        &self,
        message: &dyn Message,
        _context: &MessageContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Reply> {
        let brokered = message
            .as_any()
            .downcast_ref::<BrokeredMessage>()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("expected a brokered message, got {}", message.type_name()))?;
        let broker = self
            .broker
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("message broker has shut down"))?;

        trace!(message_id = %brokered.id, "Dispatching brokered message");
        let reply = broker.dispatch(brokered, cancel).await?;
        Ok(Reply::from_boxed(reply))
    }
}
