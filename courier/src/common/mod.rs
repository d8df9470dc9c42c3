//! Runtime components of the Courier messaging layer.
//!
//! # Key Re-exported Components:
//!
//! *   [`MessageBus`]: The assembled runtime for one application instance.
//! *   [`MessageProcessor`]: Resolves and runs local handlers.
//! *   [`HandlerRegistry`]: Priority-ordered handler registrations.
//! *   [`RouterChain`]: Ordered routers with reply correlation and timeouts.
//! *   [`MessageBroker`]: Connects the router chain with the processor.
//! *   [`MessageTypeRegistry`]: Wire names of the message types that may cross transports.
//! *   [`Reply`]: The value returned by message handlers.

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

// --- Public Re-exports ---
pub use config::{AppConfig, CourierConfig, PipesConfig, RedisConfig, ServiceBusConfig, CONFIG};
pub use errors::{EnvelopeError, MessagingError, RemoteFault, TransportError};
pub use handler_registry::{HandlerRegistration, HandlerRegistry};
pub use in_process_router::{InProcessRouter, IN_PROCESS_PRIORITY};
pub use message_broker::MessageBroker;
pub use message_bus::{MessageBus, MessageBusBuilder};
pub use message_processor::MessageProcessor;
pub use pending_replies::{PendingReplies, PendingReply, ReplyResult};
pub use reply::Reply;
pub use resolvers::{
    BrokeredMessageResolver, EventHandlerResolver, BROKERED_RESOLVER_PRIORITY, EVENT_RESOLVER_PRIORITY,
};
pub use router_chain::{RecipientMatch, RouterChain};
pub use routing::{InboundSink, RouteOutcome, RouterContext, RoutingInstruction};
pub use type_matcher::TypeMatcher;
pub use type_registry::MessageTypeRegistry;

// --- Submodules ---

/// Defines the configuration loaded from XDG locations.
pub mod config;
/// Defines the error taxonomy.
mod errors;
/// Defines handler registrations and their registry.
mod handler_registry;
/// Defines the catch-all router for this application instance.
mod in_process_router;
/// Defines the broker connecting routers and the processor.
mod message_broker;
/// Defines the `MessageBus` runtime.
mod message_bus;
/// Defines the `MessageProcessor` façade.
mod message_processor;
/// Defines reply correlation.
mod pending_replies;
/// Defines the `Reply` returned by handlers.
mod reply;
/// Defines the built-in handler resolvers.
mod resolvers;
/// Defines the router chain.
mod router_chain;
/// Defines routing instructions and router context.
mod routing;
/// Defines type matchers used by registrations.
mod type_matcher;
/// Defines the wire type registry.
mod type_registry;
