//! Connector seams for broker-backed transports.
//!
//! The Redis and Service Bus routers do not talk to a server directly. They
//! are given a connector that opens the connection lazily and exposes the
//! few operations the routers need:
//!
//! *   [`PubSubConnector`] / [`PubSubConnection`]: fan-out channels (Redis pub/sub).
//! *   [`QueueConnector`] / [`QueueConnection`]: named queues with competing consumers.
//!
//! [`InMemoryPubSub`] and [`InMemoryQueues`] implement both seams inside one
//! process, for tests and single-host deployments.

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

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::TransportError;

// --- Public Re-exports ---
pub use in_memory::{InMemoryPubSub, InMemoryQueues};

// --- Submodules ---

/// In-process implementations of the connector traits.
mod in_memory;

/// Payloads delivered to a subscriber.
pub type Subscription = mpsc::UnboundedReceiver<Vec<u8>>;

/// Opens pub/sub connections.
#[async_trait]
pub trait PubSubConnector: Send + Sync + 'static {
    /// Opens a connection to the server.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionFailed`] if the server cannot be reached.
    async fn connect(&self) -> Result<Arc<dyn PubSubConnection>, TransportError>;
}

/// An open pub/sub connection.
#[async_trait]
pub trait PubSubConnection: Send + Sync + 'static {
    /// Publishes `payload` on `channel`.
    ///
    /// # Returns
    ///
    /// The number of subscribers that received the payload.
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, TransportError>;

    /// Subscribes to every channel in `channels`.
    async fn subscribe(&self, channels: &[String]) -> Result<Subscription, TransportError>;
}

/// Opens queue connections.
#[async_trait]
pub trait QueueConnector: Send + Sync + 'static {
    /// Opens a connection to the namespace.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionFailed`] if the namespace cannot be reached.
    async fn connect(&self) -> Result<Arc<dyn QueueConnection>, TransportError>;
}

/// An open queue connection.
#[async_trait]
pub trait QueueConnection: Send + Sync + 'static {
    /// Creates `queue` if it does not exist yet.
    async fn declare(&self, queue: &str) -> Result<(), TransportError>;

    /// Appends `payload` to `queue`.
    ///
    /// # Errors
    ///
    /// [`TransportError::PeerNotFound`] if the queue was never declared.
    async fn send(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Waits for the next payload of `queue`.
    ///
    /// Each payload goes to exactly one of the competing receivers. Returns
    /// `None` once the queue is closed.
    async fn receive(&self, queue: &str) -> Result<Option<Vec<u8>>, TransportError>;
}
