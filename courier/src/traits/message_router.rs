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

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::common::{MessagingError, RouteOutcome, RouterContext, TransportError};
use crate::message::{BrokeredMessage, MessageContext};

/// One step of the distributed router chain.
///
/// A router either claims a brokered message (delivering it to a transport or
/// executing it locally) or declines with
/// [`RoutingInstruction::Continue`](crate::common::RoutingInstruction::Continue).
/// The [`RouterChain`](crate::common::RouterChain) owns chain walking, reply
/// correlation and initialization; implementations only provide
/// [`send_core`](MessageRouter::send_core).
#[async_trait]
pub trait MessageRouter: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Prepares the router before its first send (opens connections, starts listeners).
    ///
    /// The chain calls this at most once per router even under concurrent first
    /// use. Implementations holding their own connection state must still make it
    /// idempotent, since they may be shared between chains.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] if the transport could not be prepared.
    async fn initialize(&self, _context: RouterContext) -> Result<(), TransportError> {
        Ok(())
    }

    /// Attempts to deliver the message.
    ///
    /// # Errors
    ///
    /// [`MessagingError::Transport`] failures from a router that is not
    /// [authoritative](MessageRouter::is_authoritative_for) for the message are
    /// logged and treated as `Continue`. Every other error ends routing.
    async fn send_core(
        &self,
        message: &BrokeredMessage,
        context: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<RouteOutcome, MessagingError>;

    /// Whether transport failures for this message should end routing.
    fn is_authoritative_for(&self, _message: &BrokeredMessage) -> bool {
        false
    }
}
