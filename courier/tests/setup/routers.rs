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
use std::time::Duration;

use courier::common::{InboundSink, MessageTypeRegistry, PendingReplies, RouterChain};
use courier::prelude::*;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Shared record of the routers that were offered a message, in order.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A router answering every message the same way.
pub struct ScriptedRouter {
    name: String,
    instruction: RoutingInstruction,
    reply: Option<Box<dyn Message>>,
    failure: Option<TransportError>,
    authoritative: bool,
    init_delay: Duration,
    log: CallLog,
    pub initializations: AtomicUsize,
}

impl ScriptedRouter {
    pub fn new(name: &str, instruction: RoutingInstruction, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            instruction,
            reply: None,
            failure: None,
            authoritative: false,
            init_delay: Duration::ZERO,
            log: log.clone(),
            initializations: AtomicUsize::new(0),
        }
    }

    pub fn replying(mut self, reply: impl Message) -> Self {
        self.reply = Some(Box::new(reply));
        self
    }

    pub fn failing(mut self, failure: TransportError) -> Self {
        self.failure = Some(failure);
        self
    }

    pub const fn authoritative(mut self) -> Self {
        self.authoritative = true;
        self
    }

    pub const fn slow_to_initialize(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }
}

#[async_trait]
impl MessageRouter for ScriptedRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self, _context: RouterContext) -> Result<(), TransportError> {
        self.initializations.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.init_delay).await;
        Ok(())
    }

    async fn send_core(
        &self,
        _message: &BrokeredMessage,
        _context: &MessageContext,
        _cancel: &CancellationToken,
    ) -> Result<RouteOutcome, MessagingError> {
        self.log.lock().push(self.name.clone());
        if let Some(failure) = &self.failure {
            return Err(MessagingError::Transport(failure.clone()));
        }
        Ok(RouteOutcome {
            instruction: self.instruction,
            reply: self.reply.clone(),
        })
    }

    fn is_authoritative_for(&self, _message: &BrokeredMessage) -> bool {
        self.authoritative
    }
}

/// A chain with its context, ready to take routers.
pub struct ChainFixture {
    pub chain: RouterChain,
    pub pending: Arc<PendingReplies>,
    pub inbound: mpsc::Receiver<BrokeredMessage>,
}

pub fn chain_fixture(default_timeout: Duration) -> ChainFixture {
    let (sender, inbound) = mpsc::channel(16);
    let context = RouterContext {
        identity: AppIdentity::new("tests", "t-1"),
        types: Arc::new(MessageTypeRegistry::new()),
        inbound: InboundSink::new(sender),
        cancel: CancellationToken::new(),
    };
    let pending = Arc::new(PendingReplies::new());
    let chain = RouterChain::new(context, pending.clone(), default_timeout);
    ChainFixture {
        chain,
        pending,
        inbound,
    }
}
