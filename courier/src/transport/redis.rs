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

//! Router publishing brokered messages on Redis channels.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use super::channel::{PubSubConnection, PubSubConnector, Subscription};
use crate::common::{MessagingError, RedisConfig, RouteOutcome, RouterContext, TransportError, CONFIG};
use crate::message::{AppIdentity, BrokeredMessage, Endpoint, MessageContext, WireEnvelope};
use crate::traits::MessageRouter;

struct RedisState {
    context: RouterContext,
    connection: Arc<dyn PubSubConnection>,
}

/// Delivers messages through Redis pub/sub.
///
/// Every instance subscribes to two channels:
///
/// *   `<namespace>:<app_id>` for messages addressed to the application,
/// *   `<namespace>:<app_id>:<app_instance_id>` for messages addressed to the instance.
///
/// An app-level message reaches every subscribed instance of that app; the
/// first reply completes the request. Publishing to a channel nobody listens
/// on fails with [`TransportError::PeerNotFound`].
pub struct RedisRouter {
    connector: Arc<dyn PubSubConnector>,
    config: RedisConfig,
    state: OnceCell<RedisState>,
}

impl RedisRouter {
    /// Creates a router using the global configuration.
    #[must_use]
    pub fn new(connector: Arc<dyn PubSubConnector>) -> Self {
        Self::with_config(connector, CONFIG.redis.clone())
    }

    /// Creates a router.
    #[must_use]
    pub fn with_config(connector: Arc<dyn PubSubConnector>, config: RedisConfig) -> Self {
        Self {
            connector,
            config,
            state: OnceCell::new(),
        }
    }

    /// Channel carrying messages for `endpoint`, if it names an application.
    #[must_use]
    pub fn channel_for(&self, endpoint: &Endpoint) -> Option<String> {
        let app = endpoint.app_id.as_deref()?;
        Some(endpoint.app_instance_id.as_deref().map_or_else(
            || format!("{}:{app}", self.config.namespace),
            |instance| format!("{}:{app}:{instance}", self.config.namespace),
        ))
    }

    fn subscribed_channels(&self, identity: &AppIdentity) -> Vec<String> {
        vec![
            format!("{}:{}", self.config.namespace, identity.app_id),
            format!(
                "{}:{}:{}",
                self.config.namespace, identity.app_id, identity.app_instance_id
            ),
        ]
    }

    fn state(&self) -> Result<&RedisState, TransportError> {
        self.state
            .get()
            .ok_or_else(|| TransportError::NotInitialized(self.name().to_string()))
    }

    fn remote_channels(&self, message: &BrokeredMessage, identity: &AppIdentity) -> Vec<String> {
        let mut channels: Vec<String> = Vec::new();
        for recipient in &message.recipients {
            if recipient.targets(identity) {
                continue;
            }
            if let Some(channel) = self.channel_for(recipient) {
                if !channels.contains(&channel) {
                    channels.push(channel);
                }
            }
        }
        channels
    }
}

/// Forwards received payloads to the broker until cancelled.
async fn receive_loop(mut subscription: Subscription, context: RouterContext) {
    loop {
        tokio::select! {
            biased;

            () = context.cancel.cancelled() => {
                debug!("Redis receive loop received shutdown signal");
                break;
            }

            received = subscription.recv() => {
                let Some(payload) = received else {
                    debug!("Redis subscription closed");
                    break;
                };
                let message = match WireEnvelope::from_bytes(&payload)
                    .and_then(|wire| wire.into_brokered(&context.types))
                {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "Dropping undecodable Redis payload");
                        continue;
                    }
                };
                trace!(message_id = %message.id, "Received from Redis");
                if let Err(e) = context.inbound.deliver(message).await {
                    warn!(error = %e, "Inbound queue closed");
                    break;
                }
            }
        }
    }
    info!("Redis receive loop stopped");
}

#[async_trait]
impl MessageRouter for RedisRouter {
    fn name(&self) -> &str {
        "redis"
    }

    #[instrument(skip_all, fields(namespace = %self.config.namespace))]
    async fn initialize(&self, context: RouterContext) -> Result<(), TransportError> {
        self.state
            .get_or_try_init(|| async move {
                debug!(url = %self.config.url, "Connecting to Redis");
                let connection = self.connector.connect().await?;
                let channels = self.subscribed_channels(&context.identity);
                let subscription = connection.subscribe(&channels).await?;
                tokio::spawn(receive_loop(subscription, context.clone()));
                info!(?channels, "Subscribed to Redis channels");
                Ok::<_, TransportError>(RedisState { context, connection })
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
        let channels = self.remote_channels(message, &state.context.identity);
        if channels.is_empty() {
            return Ok(RouteOutcome::continue_routing());
        }

        let payload = WireEnvelope::from_brokered(message, &state.context.types)?.to_bytes()?;
        for channel in &channels {
            let delivered = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(MessagingError::Cancelled),
                delivered = state.connection.publish(channel, payload.clone()) => delivered?,
            };
            if delivered == 0 {
                return Err(TransportError::PeerNotFound(channel.clone()).into());
            }
            trace!(message_id = %message.id, channel = %channel, delivered, "Published to Redis");
        }

        if message.one_way {
            Ok(RouteOutcome::stop(None))
        } else {
            Ok(RouteOutcome::reply_expected())
        }
    }
}

impl std::fmt::Debug for RedisRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisRouter")
            .field("namespace", &self.config.namespace)
            .field("connected", &self.state.initialized())
            .finish_non_exhaustive()
    }
}
