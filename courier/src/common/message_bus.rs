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

//! The assembled messaging runtime.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::common::message_processor::expect_response;
use crate::common::{
    BrokeredMessageResolver, CourierConfig, EventHandlerResolver, HandlerRegistration, HandlerRegistry,
    InProcessRouter, InboundSink, MessageBroker, MessageProcessor, MessageTypeRegistry, MessagingError,
    PendingReplies, RecipientMatch, Reply, ReplyResult, RouterChain, RouterContext, CONFIG, IN_PROCESS_PRIORITY,
};
use crate::message::{AppIdentity, BrokeredMessage, Endpoint, MessageContext};
use crate::traits::{Message, MessageRouter, Request};

/// Time the receive loop gets to wind down on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Collects handlers, routers and wire types before a [`MessageBus`] starts.
///
/// # Example
///
/// ```rust,ignore
/// let bus = MessageBus::builder(AppIdentity::generate("pricing"))
///     .on::<GetPrice, _, _>(|request, _ctx| async move {
///         Reply::ok(PriceQuote { symbol: request.symbol, price: 42.0 })
///     })
///     .wire_type::<GetPrice>("GetPrice")
///     .router(Arc::new(redis), 10, RecipientMatch::Any)
///     .start()
///     .await;
/// ```
pub struct MessageBusBuilder {
    identity: AppIdentity,
    config: CourierConfig,
    handlers: Vec<HandlerRegistration>,
    subscribers: Vec<HandlerRegistration>,
    routers: Vec<(Arc<dyn MessageRouter>, i32, RecipientMatch)>,
    types: MessageTypeRegistry,
}

impl MessageBusBuilder {
    /// Replaces the configuration (defaults to the global [`CONFIG`]).
    #[must_use]
    pub fn with_config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Adds a handler registration.
    #[must_use]
    pub fn handler(mut self, registration: HandlerRegistration) -> Self {
        self.handlers.push(registration);
        self
    }

    /// Adds a handler for messages of type `M`.
    #[must_use]
    pub fn on<M, F, Fut>(self, handler: F) -> Self
    where
        M: Message + Clone,
        F: Fn(M, MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
    {
        self.handler(HandlerRegistration::for_message::<M, F, Fut>(handler))
    }

    /// Adds a subscriber for events of type `E`.
    ///
    /// Every subscriber receives each published event.
    #[must_use]
    pub fn subscribe<E, F, Fut>(mut self, handler: F) -> Self
    where
        E: Message + Clone,
        F: Fn(E, MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
    {
        self.subscribers
            .push(HandlerRegistration::for_message::<E, F, Fut>(handler));
        self
    }

    /// Adds a router to the chain.
    ///
    /// Higher priorities run first. `recipients` limits the messages the
    /// router is offered.
    #[must_use]
    pub fn router(mut self, router: Arc<dyn MessageRouter>, priority: i32, recipients: RecipientMatch) -> Self {
        self.routers.push((router, priority, recipients));
        self
    }

    /// Registers `M` for transport under `name`.
    #[must_use]
    pub fn wire_type<M>(self, name: &str) -> Self
    where
        M: Message + Serialize + DeserializeOwned,
    {
        self.types.register::<M>(name);
        self
    }

    /// Starts the bus.
    ///
    /// Builds the processor and the router chain (with the in-process router
    /// last), installs brokered-message dispatch, initializes every router and
    /// spawns the inbound receive loop. A router that fails to initialize is
    /// logged and retried the first time a message reaches it.
    #[instrument(skip_all, fields(identity = %self.identity))]
    pub async fn start(self) -> MessageBus {
        trace!("Starting message bus");
        let cancel = CancellationToken::new();

        let registry = Arc::new(HandlerRegistry::new());
        for registration in self.handlers {
            registry.register(registration);
        }
        let events = Arc::new(EventHandlerResolver::new());
        for registration in self.subscribers {
            events.subscribe(registration);
        }

        let processor = Arc::new(MessageProcessor::new());
        processor.add_resolver(registry.clone());
        processor.add_resolver(events.clone());

        let (sender, receiver) = mpsc::channel(self.config.routing.inbound_capacity.max(1));
        let types = Arc::new(self.types);
        let context = RouterContext {
            identity: self.identity.clone(),
            types: types.clone(),
            inbound: InboundSink::new(sender),
            cancel: cancel.clone(),
        };

        let pending = Arc::new(PendingReplies::new());
        let mut chain = RouterChain::new(context, pending, self.config.default_timeout());
        for (router, priority, recipients) in self.routers {
            chain.add(router, priority, recipients);
        }
        chain.add(
            Arc::new(InProcessRouter::new(self.identity.clone(), processor.clone())),
            IN_PROCESS_PRIORITY,
            RecipientMatch::Any,
        );

        let broker = Arc::new(MessageBroker::new(
            self.identity.clone(),
            processor.clone(),
            chain,
            cancel.clone(),
        ));
        processor.add_resolver(Arc::new(BrokeredMessageResolver::new(&broker)));

        if let Err(e) = broker.chain().initialize().await {
            warn!(error = %e, "Router initialization failed");
        }
        let receive_loop = broker.spawn_receive_loop(receiver);

        info!(routers = broker.chain().len(), "Message bus started");
        MessageBus {
            identity: self.identity,
            processor,
            registry,
            events,
            types,
            broker,
            cancel,
            receive_loop: Mutex::new(Some(receive_loop)),
        }
    }
}

impl fmt::Debug for MessageBusBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBusBuilder")
            .field("identity", &self.identity)
            .field("handlers", &self.handlers.len())
            .field("subscribers", &self.subscribers.len())
            .field("routers", &self.routers.len())
            .finish_non_exhaustive()
    }
}

/// A running messaging runtime for one application instance.
///
/// Local operations ([`process`](Self::process), [`request`](Self::request),
/// [`publish`](Self::publish)) run on the in-process processor. Addressed
/// operations ([`dispatch`](Self::dispatch), [`send_to`](Self::send_to),
/// [`request_from`](Self::request_from)) go through the router chain and may
/// leave the process.
pub struct MessageBus {
    identity: AppIdentity,
    processor: Arc<MessageProcessor>,
    registry: Arc<HandlerRegistry>,
    events: Arc<EventHandlerResolver>,
    types: Arc<MessageTypeRegistry>,
    broker: Arc<MessageBroker>,
    cancel: CancellationToken,
    receive_loop: Mutex<Option<JoinHandle<()>>>,
}

impl MessageBus {
    /// Starts building a bus for `identity`.
    #[must_use]
    pub fn builder(identity: AppIdentity) -> MessageBusBuilder {
        MessageBusBuilder {
            identity,
            config: CONFIG.clone(),
            handlers: Vec::new(),
            subscribers: Vec::new(),
            routers: Vec::new(),
            types: MessageTypeRegistry::new(),
        }
    }

    /// Starts building a bus configured by `config`, with the identity its
    /// `[app]` section describes.
    #[must_use]
    pub fn configured(config: CourierConfig) -> MessageBusBuilder {
        Self::builder(AppIdentity::from_config(&config.app)).with_config(config)
    }

    /// The local application instance.
    #[must_use]
    pub const fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    /// Handler registry; registrations added at runtime apply to the next message.
    #[must_use]
    pub const fn handlers(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Event subscribers.
    #[must_use]
    pub const fn events(&self) -> &Arc<EventHandlerResolver> {
        &self.events
    }

    /// Wire type registry shared with every router.
    #[must_use]
    pub const fn types(&self) -> &Arc<MessageTypeRegistry> {
        &self.types
    }

    /// The processor running local handlers.
    #[must_use]
    pub const fn processor(&self) -> &Arc<MessageProcessor> {
        &self.processor
    }

    /// The broker behind addressed operations.
    #[must_use]
    pub const fn broker(&self) -> &Arc<MessageBroker> {
        &self.broker
    }

    /// Processes a message with the best local handler.
    ///
    /// A [`BrokeredMessage`] passed here is dispatched through the router chain.
    ///
    /// # Errors
    ///
    /// See [`MessageProcessor::process`].
    pub async fn process(&self, message: &dyn Message) -> Result<Reply, MessagingError> {
        self.processor
            .process(message, MessageContext::new(), &self.cancel)
            .await
    }

    /// Sends a typed request to the best local handler.
    ///
    /// # Errors
    ///
    /// See [`MessageProcessor::request`].
    pub async fn request<R: Request>(&self, request: R) -> Result<R::Response, MessagingError> {
        self.processor
            .request(request, MessageContext::new(), &self.cancel)
            .await
    }

    /// Delivers an event to every local subscriber.
    ///
    /// # Errors
    ///
    /// See [`MessageProcessor::publish`].
    pub async fn publish(&self, event: impl Message) -> Result<usize, MessagingError> {
        self.processor
            .publish(&event, MessageContext::new(), &self.cancel)
            .await
    }

    /// Routes a brokered message through the chain.
    ///
    /// # Errors
    ///
    /// See [`RouterChain::route`].
    pub async fn dispatch(&self, message: BrokeredMessage) -> ReplyResult {
        self.broker.dispatch(message, &self.cancel).await
    }

    /// Sends `message` to `recipient` and waits for the reply content.
    ///
    /// # Errors
    ///
    /// See [`RouterChain::route`].
    pub async fn send_to(&self, recipient: Endpoint, message: impl Message) -> ReplyResult {
        self.dispatch(BrokeredMessage::new(message).to(recipient)).await
    }

    /// Sends `message` to `recipient` without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Routing failures; a transport that accepted the message counts as success.
    pub async fn post_to(&self, recipient: Endpoint, message: impl Message) -> Result<(), MessagingError> {
        self.dispatch(BrokeredMessage::new(message).to(recipient).one_way())
            .await
            .map(|_| ())
    }

    /// Sends a typed request to `recipient` and returns its typed response.
    ///
    /// # Errors
    ///
    /// Routing failures, plus [`MessagingError::UnexpectedResponse`] when the
    /// reply is missing or of another type.
    pub async fn request_from<R: Request>(&self, recipient: Endpoint, request: R) -> Result<R::Response, MessagingError> {
        let reply = Reply::from_boxed(self.send_to(recipient, request).await?);
        expect_response::<R>(&reply)
    }

    /// Stops the bus.
    ///
    /// Cancels in-flight work and background transport tasks, then waits
    /// for the receive loop to finish.
    pub async fn shutdown(&self) {
        debug!(identity = %self.identity, "Shutting down message bus");
        self.cancel.cancel();
        let receive_loop = self.receive_loop.lock().take();
        if let Some(handle) = receive_loop {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("Receive loop did not stop in time");
            }
        }
        info!(identity = %self.identity, "Message bus stopped");
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("identity", &self.identity)
            .field("broker", &self.broker)
            .finish_non_exhaustive()
    }
}
