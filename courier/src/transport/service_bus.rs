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

//! Router delivering brokered messages through Service Bus style queues.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::channel::{QueueConnection, QueueConnector};
use crate::common::{MessagingError, RouteOutcome, RouterContext, ServiceBusConfig, TransportError, CONFIG};
use crate::message::{AppIdentity, BrokeredMessage, Endpoint, MessageContext, WireEnvelope};
use crate::traits::MessageRouter;

struct ServiceBusState {
    context: RouterContext,
    connection: Arc<dyn QueueConnection>,
}

/// Delivers messages through queues.
///
/// Each instance consumes two queues, `<namespace>.<app_id>` and
/// `<namespace>.<app_id>.<app_instance_id>`. Instances of one application
/// compete for the app-level queue, so an app-level message is handled by a
/// single instance.
pub struct ServiceBusRouter {
    connector: Arc<dyn QueueConnector>,
    config: ServiceBusConfig,
    state: OnceCell<ServiceBusState>,
}

impl ServiceBusRouter {
    /// Creates a router using the global configuration.
    #[must_use]
    pub fn new(connector: Arc<dyn QueueConnector>) -> Self {
        Self::with_config(connector, CONFIG.service_bus.clone())
    }

    /// Creates a router.
    #[must_use]
    pub fn with_config(connector: Arc<dyn QueueConnector>, config: ServiceBusConfig) -> Self {
        Self {
            connector,
            config,
            state: OnceCell::new(),
        }
    }

    /// Queue carrying messages for `endpoint`, if it names an application.
    #[must_use]
    pub fn queue_for(&self, endpoint: &Endpoint) -> Option<String> {
        let app = endpoint.app_id.as_deref()?;
        Some(endpoint.app_instance_id.as_deref().map_or_else(
            || format!("{}.{app}", self.config.namespace),
            |instance| format!("{}.{app}.{instance}", self.config.namespace),
        ))
    }

    fn consumed_queues(&self, identity: &AppIdentity) -> [String; 2] {
        [
            format!("{}.{}", self.config.namespace, identity.app_id),
            format!(
                "{}.{}.{}",
                self.config.namespace, identity.app_id, identity.app_instance_id
            ),
        ]
    }

    fn state(&self) -> Result<&ServiceBusState, TransportError> {
        self.state
            .get()
            .ok_or_else(|| TransportError::NotInitialized(self.name().to_string()))
    }
}

async fn consume(queue: String, connection: Arc<dyn QueueConnection>, context: RouterContext) {
    loop {
        let received = tokio::select! {
            biased;

            () = context.cancel.cancelled() => {
                debug!(queue = %queue, "Queue consumer received shutdown signal");
                break;
            }

            received = connection.receive(&queue) => received,
        };

        let payload = match received {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(queue = %queue, "Queue closed");
                break;
            }
            Err(e) => {
                warn!(queue = %queue, error = %e, "Queue receive failed");
                break;
            }
        };

        let message = match WireEnvelope::from_bytes(&payload).and_then(|wire| wire.into_brokered(&context.types)) {
            Ok(message) => message,
            Err(e) => {
                warn!(queue = %queue, error = %e, "Dropping undecodable queue payload");
                continue;
            }
        };
        trace!(queue = %queue, message_id = %message.id, "Received from queue");
        if let Err(e) = context.inbound.deliver(message).await {
            warn!(error = %e, "Inbound queue closed");
            break;
        }
    }
    info!(queue = %queue, "Queue consumer stopped");
}

#[async_trait]
impl MessageRouter for ServiceBusRouter {
    fn name(&self) -> &str {
        "service-bus"
    }

    async fn initialize(&self, context: RouterContext) -> Result<(), TransportError> {
        self.state
            .get_or_try_init(|| async move {
                debug!(namespace = %self.config.namespace, "Connecting to Service Bus");
                let connection = self.connector.connect().await?;
                for queue in self.consumed_queues(&context.identity) {
                    connection.declare(&queue).await?;
                    tokio::spawn(consume(queue, connection.clone(), context.clone()));
                }
                Ok::<_, TransportError>(ServiceBusState { context, connection })
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
        let identity = &state.context.identity;
        let mut queues: Vec<String> = Vec::new();
        for queue in message
            .recipients
            .iter()
            .filter(|recipient| !recipient.targets(identity))
            .filter_map(|recipient| self.queue_for(recipient))
        {
            if !queues.contains(&queue) {
                queues.push(queue);
            }
        }
        if queues.is_empty() {
            return Ok(RouteOutcome::continue_routing());
        }

        let payload = WireEnvelope::from_brokered(message, &state.context.types)?.to_bytes()?;
        for queue in &queues {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(MessagingError::Cancelled),
                sent = state.connection.send(queue, payload.clone()) => sent?,
            }
            trace!(message_id = %message.id, queue = %queue, "Sent to queue");
        }

        if message.one_way {
            Ok(RouteOutcome::stop(None))
        } else {
            Ok(RouteOutcome::reply_expected())
        }
    }
}

impl std::fmt::Debug for ServiceBusRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceBusRouter")
            .field("namespace", &self.config.namespace)
            .field("connected", &self.state.initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryQueues;

    #[test]
    fn test_queue_names() {
        let router = ServiceBusRouter::with_config(Arc::new(InMemoryQueues::new()), ServiceBusConfig::default());

        assert_eq!(router.queue_for(&Endpoint::app("pricing")).as_deref(), Some("courier.pricing"));
        assert_eq!(
            router.queue_for(&Endpoint::instance("pricing", "p-1")).as_deref(),
            Some("courier.pricing.p-1")
        );
        assert_eq!(router.queue_for(&Endpoint::default()), None);
    }
}
