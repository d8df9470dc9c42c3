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
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::{MessageProcessor, MessagingError, RouteOutcome, RouterContext, TransportError};
use crate::message::{AppIdentity, BrokeredMessage, MessageContext};
use crate::traits::MessageRouter;

/// Chain priority of the in-process router: it runs after every transport.
pub const IN_PROCESS_PRIORITY: i32 = i32::MIN;

/// The catch-all router delivering messages to this application instance.
///
/// Handles unaddressed messages and messages with a recipient targeting this
/// instance. Requests are executed directly on the local [`MessageProcessor`]
/// and answered with [`RoutingInstruction::Stop`](crate::common::RoutingInstruction::Stop);
/// replies addressed to this instance are handed to the broker so they complete
/// the waiting caller.
pub struct InProcessRouter {
    identity: AppIdentity,
    processor: Arc<MessageProcessor>,
    context: OnceCell<RouterContext>,
}

impl InProcessRouter {
    /// Creates the router for `identity`.
    #[must_use]
    pub fn new(identity: AppIdentity, processor: Arc<MessageProcessor>) -> Self {
        Self {
            identity,
            processor,
            context: OnceCell::new(),
        }
    }

    fn is_local(&self, message: &BrokeredMessage) -> bool {
        message.is_unaddressed()
            || message
                .recipients
                .iter()
                .any(|recipient| recipient.targets(&self.identity))
    }
}

#[async_trait]
impl MessageRouter for InProcessRouter {
    fn name(&self) -> &str {
        "in-process"
    }

    async fn initialize(&self, context: RouterContext) -> Result<(), TransportError> {
        // a second initialization keeps the first context
        let _ = self.context.set(context);
        Ok(())
    }

    async fn send_core(
        &self,
        message: &BrokeredMessage,
        context: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome, MessagingError> {
        if !self.is_local(message) {
            return Ok(RouteOutcome::continue_routing());
        }

        if message.is_reply() {
            let router_context = self
                .context
                .get()
                .ok_or_else(|| TransportError::NotInitialized(self.name().to_string()))?;
            trace!(message_id = %message.id, "Looping reply back to the broker");
            router_context.inbound.deliver(message.clone()).await?;
            return Ok(RouteOutcome::stop(None));
        }

        trace!(message_id = %message.id, "Processing in-process");
        let reply = self
            .processor
            .process_content(message, context.clone(), cancel)
            .await?;
        Ok(RouteOutcome::stop(reply.into_inner()))
    }

    fn is_authoritative_for(&self, message: &BrokeredMessage) -> bool {
        self.is_local(message)
    }
}
