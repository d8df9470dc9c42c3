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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;

use super::{PubSubConnection, PubSubConnector, QueueConnection, QueueConnector, Subscription};
use crate::common::TransportError;

/// Pub/sub hub living inside the process.
///
/// Clones share the same channels, so routers of several buses given clones
/// of one hub can reach each other.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPubSub {
    hub: Arc<PubSubHub>,
    connects: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
struct PubSubHub {
    channels: DashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl InMemoryPubSub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections opened so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PubSubConnector for InMemoryPubSub {
    async fn connect(&self) -> Result<Arc<dyn PubSubConnection>, TransportError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(self.hub.clone())
    }
}

#[async_trait]
impl PubSubConnection for PubSubHub {
    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<usize, TransportError> {
        let Some(mut subscribers) = self.channels.get_mut(channel) else {
            return Ok(0);
        };
        subscribers.retain(|subscriber| !subscriber.is_closed());
        let mut delivered = 0;
        for subscriber in subscribers.iter() {
            if subscriber.send(payload.clone()).is_ok() {
                delivered += 1;
            }
        }
        trace!(channel, delivered, "Published");
        Ok(delivered)
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Subscription, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        for channel in channels {
            self.channels
                .entry(channel.clone())
                .or_default()
                .push(sender.clone());
        }
        Ok(receiver)
    }
}

/// Queues living inside the process.
///
/// Clones share the same queues. Every receiver of a queue competes for its
/// payloads; each payload is taken exactly once.
#[derive(Clone, Debug, Default)]
pub struct InMemoryQueues {
    namespace: Arc<QueueNamespace>,
    connects: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
struct QueueNamespace {
    queues: DashMap<String, QueueSlot>,
}

#[derive(Clone, Debug)]
struct QueueSlot {
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl InMemoryQueues {
    /// Creates an empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections opened so far.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl QueueConnector for InMemoryQueues {
    async fn connect(&self) -> Result<Arc<dyn QueueConnection>, TransportError> {
        self.connects.fetch_add(1, Ordering::Relaxed);
        Ok(self.namespace.clone())
    }
}

impl QueueNamespace {
    fn slot(&self, queue: &str) -> Option<QueueSlot> {
        self.queues.get(queue).map(|slot| slot.clone())
    }
}

#[async_trait]
impl QueueConnection for QueueNamespace {
    async fn declare(&self, queue: &str) -> Result<(), TransportError> {
        self.queues.entry(queue.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            QueueSlot {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
            }
        });
        Ok(())
    }

    async fn send(&self, queue: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        let slot = self
            .slot(queue)
            .ok_or_else(|| TransportError::PeerNotFound(queue.to_string()))?;
        slot.sender
            .send(payload)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn receive(&self, queue: &str) -> Result<Option<Vec<u8>>, TransportError> {
        let slot = self
            .slot(queue)
            .ok_or_else(|| TransportError::PeerNotFound(queue.to_string()))?;
        let mut receiver = slot.receiver.lock().await;
        Ok(receiver.recv().await)
    }
}
