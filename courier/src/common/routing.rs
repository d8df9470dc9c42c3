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

//! Values exchanged between the router chain and individual routers.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::common::{MessageTypeRegistry, TransportError};
use crate::message::{AppIdentity, BrokeredMessage};
use crate::traits::Message;

/// What a router did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingInstruction {
    /// Not handled here; try the next router.
    Continue,
    /// Fully handled (delivered or executed); stop routing.
    Stop,
    /// Handled, and a reply is carried now or will arrive correlated by message id.
    ReplyExpected,
}

/// Result of [`MessageRouter::send_core`](crate::traits::MessageRouter::send_core):
/// exactly one instruction plus an optional reply.
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    /// The routing decision.
    pub instruction: RoutingInstruction,
    /// Reply available immediately.
    pub reply: Option<Box<dyn Message>>,
}

impl RouteOutcome {
    /// Decline the message.
    #[must_use]
    pub const fn continue_routing() -> Self {
        Self {
            instruction: RoutingInstruction::Continue,
            reply: None,
        }
    }

    /// Handled, with an optional immediate reply.
    #[must_use]
    pub const fn stop(reply: Option<Box<dyn Message>>) -> Self {
        Self {
            instruction: RoutingInstruction::Stop,
            reply,
        }
    }

    /// Handled; the reply arrives later through the pending-reply table.
    #[must_use]
    pub const fn reply_expected() -> Self {
        Self {
            instruction: RoutingInstruction::ReplyExpected,
            reply: None,
        }
    }

    /// Handled, with the reply already at hand.
    #[must_use]
    pub const fn replied(reply: Box<dyn Message>) -> Self {
        Self {
            instruction: RoutingInstruction::ReplyExpected,
            reply: Some(reply),
        }
    }
}

/// Channel through which transports hand received envelopes to the broker.
#[derive(Clone)]
pub struct InboundSink {
    sender: mpsc::Sender<BrokeredMessage>,
}

impl InboundSink {
    /// Wraps the sending half of the broker's inbound queue.
    #[must_use]
    pub const fn new(sender: mpsc::Sender<BrokeredMessage>) -> Self {
        Self { sender }
    }

    /// Hands a received message to the broker, waiting for queue capacity.
    ///
    /// # Errors
    ///
    /// [`TransportError::ConnectionClosed`] once the broker stopped receiving.
    pub async fn deliver(&self, message: BrokeredMessage) -> Result<(), TransportError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    /// Returns `true` once the broker stopped receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for InboundSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundSink")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Everything a router receives when it is initialized.
#[derive(Clone, Debug)]
pub struct RouterContext {
    /// Identity of the local application instance.
    pub identity: AppIdentity,
    /// Wire names of the message types that may cross transports.
    pub types: Arc<MessageTypeRegistry>,
    /// Where received envelopes go.
    pub inbound: InboundSink,
    /// Cancelled when the bus shuts down; background tasks stop with it.
    pub cancel: CancellationToken,
}
