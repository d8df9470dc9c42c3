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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Courier
//!
//! Courier routes messages either to local handlers or to other application
//! instances, with one API for both.
//!
//! ## Key Concepts
//!
//! - **Messages**: Any type implementing [`Message`], usually generated with
//!   `#[courier_message]`. Requests pair a message with its response type.
//! - **Handler registry**: Registrations match a message type (and optionally
//!   the envelope carrying it). The highest override priority wins, then the
//!   highest processing priority, then the earliest registration.
//! - **Processor**: Resolves and runs the best handler for a message, unwrapping
//!   envelopes when the whole envelope has no handler.
//! - **Router chain**: Ordered routers decide per message whether to pass it on
//!   (`Continue`), answer it (`Stop`) or wait for a correlated reply
//!   (`ReplyExpected`).
//! - **Transports**: Named pipes with a peer table, Redis pub/sub and Service
//!   Bus style queues, each exposed as a router.
//! - **Bus**: [`MessageBus`](common::MessageBus) assembles all of the above for one
//!   application instance.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[courier_message(response = PriceQuote)]
//! struct GetPrice {
//!     symbol: String,
//! }
//!
//! #[courier_message]
//! struct PriceQuote {
//!     price: f64,
//! }
//!
//! let bus = MessageBus::builder(AppIdentity::generate("pricing"))
//!     .on::<GetPrice, _, _>(|_request, _ctx| async move { Reply::ok(PriceQuote { price: 42.0 }) })
//!     .start()
//!     .await;
//!
//! let quote = bus.request(GetPrice { symbol: "ACME".into() }).await?;
//! ```

extern crate self as courier;

/// Runtime components: processor, registry, router chain, broker and bus.
pub mod common;

/// Message model: brokered messages, envelopes, endpoints and wire format.
pub mod message;

/// Core traits implemented by messages, handlers, resolvers and routers.
pub mod traits;

/// Router implementations for out-of-process delivery.
pub mod transport;

pub use traits::{Message, MessageKind, Request};

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros (from `courier-macro`)
/// *   [`courier_macro::courier_message`]: Attribute macro for defining messages.
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html): The macro for defining async functions in traits.
/// *   [`tokio_util::sync::CancellationToken`]: Cancellation passed to handlers and routers.
///
/// ## Core Types
/// *   [`crate::common::MessageBus`]: The assembled runtime.
/// *   [`crate::common::Reply`]: The value returned by handlers.
/// *   [`crate::common::HandlerRegistration`]: A handler plus its matching rules and priorities.
/// *   [`crate::message::BrokeredMessage`]: An addressed message with routing metadata.
/// *   [`crate::message::EventEnvelope`]: Wraps an event for publication.
pub mod prelude {
    // Macros from courier-macro
    pub use courier_macro::courier_message;

    // External crate re-exports
    pub use async_trait::async_trait;
    pub use tokio_util::sync::CancellationToken;

    // Core types
    pub use crate::common::{
        CourierConfig, HandlerRegistration, HandlerRegistry, MessageBus, MessageBusBuilder,
        MessageProcessor, MessagingError, RecipientMatch, Reply, RouteOutcome, RouterContext,
        RoutingInstruction, TransportError, TypeMatcher,
    };
    pub use crate::message::{AppIdentity, BrokeredMessage, Endpoint, EventEnvelope, MessageContext, MessageId};
    pub use crate::traits::{
        HandlerResolver, Message, MessageEnvelope, MessageHandler, MessageKind, MessageRouter, Request,
    };
    #[cfg(unix)]
    pub use crate::transport::PipesRouter;
    pub use crate::transport::{InMemoryPubSub, InMemoryQueues, RedisRouter, ServiceBusRouter};
}
