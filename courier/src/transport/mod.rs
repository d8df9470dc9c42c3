//! Routers for out-of-process delivery.
//!
//! *   [`PipesRouter`]: Named pipes between instances on one host, with a peer table.
//! *   [`RedisRouter`]: Redis pub/sub channels per application and per instance.
//! *   [`ServiceBusRouter`]: Queues with competing consumers.
//!
//! Every router serializes [`BrokeredMessage`](crate::message::BrokeredMessage)s
//! into [`WireEnvelope`](crate::message::WireEnvelope)s using the
//! [`MessageTypeRegistry`](crate::common::MessageTypeRegistry) handed over on
//! initialization, and pushes received envelopes into the broker's inbound queue.

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
pub use channel::{
    InMemoryPubSub, InMemoryQueues, PubSubConnection, PubSubConnector, QueueConnection, QueueConnector,
    Subscription,
};
#[cfg(unix)]
pub use pipes::{PeerTable, PipeListenerCounts, PipeListenerHandle, PipeListenerStats, PipesRouter};
pub use redis::RedisRouter;
pub use service_bus::ServiceBusRouter;

// --- Submodules ---

/// Connector traits and their in-memory implementations.
pub mod channel;
/// Named-pipe transport.
#[cfg(unix)]
pub mod pipes;
/// Redis pub/sub router.
mod redis;
/// Queue router.
mod service_bus;
