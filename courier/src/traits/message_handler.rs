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

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::common::Reply;
use crate::message::MessageContext;
use crate::traits::Message;

/// A unit of logic that consumes a message and produces a reply or a side effect.
///
/// Handlers receive the unwrapped payload; envelope metadata (sender, correlation
/// id, the envelope itself) is available through the [`MessageContext`].
/// Errors are wrapped by the processor into
/// [`MessagingError::Processing`](crate::common::MessagingError::Processing).
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Processes a single message.
    ///
    /// # Arguments
    ///
    /// * `message` - The payload, already unwrapped from any envelope.
    /// * `context` - Envelope and correlation metadata.
    /// * `cancel` - Cancelled when the caller gives up or the bus shuts down.
    async fn process(
        &self,
        message: &dyn Message,
        context: &MessageContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<Reply>;
}

/// A [`MessageHandler`] backed by an async closure over a concrete message type.
///
/// The payload is downcast to `M` and cloned before the closure runs, so the
/// closure owns its message.
pub struct FnHandler<M, F> {
    handler: F,
    _message: PhantomData<fn(M)>,
}

impl<M, F> FnHandler<M, F> {
    /// Wraps `handler`.
    pub const fn new(handler: F) -> Self {
        Self {
            handler,
            _message: PhantomData,
        }
    }
}

impl<M, F> fmt::Debug for FnHandler<M, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("message", &std::any::type_name::<M>())
            .finish()
    }
}

#[async_trait]
impl<M, F, Fut> MessageHandler for FnHandler<M, F>
where
    M: Message + Clone,
    F: Fn(M, MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
{
    async fn process(
        &self,
        message: &dyn Message,
        context: &MessageContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<Reply> {
        let typed = message
            .as_any()
            .downcast_ref::<M>()
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "handler for {} received {}",
                    std::any::type_name::<M>(),
                    message.type_name()
                )
            })?;
        (self.handler)(typed, context.clone()).await
    }
}
