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
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::common::MessagingError;
use crate::message::MessageId;
use crate::traits::Message;

/// A reply delivered to a waiting caller: the response content (if any) or the failure.
pub type ReplyResult = Result<Option<Box<dyn Message>>, MessagingError>;

/// Callers waiting for correlated replies, keyed by the id of their request.
#[derive(Default)]
pub struct PendingReplies {
    waiting: DashMap<MessageId, oneshot::Sender<ReplyResult>>,
}

impl PendingReplies {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `id`.
    ///
    /// The returned guard removes the entry when dropped, whatever way the
    /// wait ends.
    #[must_use]
    pub fn register(self: &Arc<Self>, id: MessageId) -> PendingReply {
        let (sender, receiver) = oneshot::channel();
        self.waiting.insert(id.clone(), sender);
        trace!(message_id = %id, "Awaiting reply");
        PendingReply {
            id,
            receiver,
            replies: Arc::clone(self),
        }
    }

    /// Completes the waiter for `id`.
    ///
    /// Returns `false` if nobody is waiting (unknown id, already completed,
    /// timed out, or the caller went away).
    pub fn complete(&self, id: &MessageId, result: ReplyResult) -> bool {
        match self.waiting.remove(id) {
            Some((_, sender)) => sender.send(result).is_ok(),
            None => false,
        }
    }

    /// Returns `true` if a caller waits for `id`.
    #[must_use]
    pub fn is_waiting(&self, id: &MessageId) -> bool {
        self.waiting.contains_key(id)
    }

    /// Number of waiting callers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiting.len()
    }

    /// Returns `true` if nobody waits.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiting.is_empty()
    }
}

impl fmt::Debug for PendingReplies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReplies")
            .field("waiting", &self.waiting.len())
            .finish()
    }
}

/// Guard for one registered waiter.
#[derive(Debug)]
pub struct PendingReply {
    id: MessageId,
    receiver: oneshot::Receiver<ReplyResult>,
    replies: Arc<PendingReplies>,
}

impl PendingReply {
    /// Id of the awaited request.
    #[must_use]
    pub const fn id(&self) -> &MessageId {
        &self.id
    }

    /// Waits for the reply.
    ///
    /// # Errors
    ///
    /// * [`MessagingError::RouteTimeout`] - Nothing arrived within `timeout`.
    /// * [`MessagingError::Cancelled`] - `cancel` fired first.
    /// * Any error the reply itself carries (for example [`MessagingError::Remote`]).
    pub async fn wait(&mut self, timeout: Duration, cancel: &CancellationToken) -> ReplyResult {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(MessagingError::Cancelled),
            received = tokio::time::timeout(timeout, &mut self.receiver) => match received {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(MessagingError::Transport(crate::common::TransportError::ConnectionClosed)),
                Err(_) => Err(MessagingError::RouteTimeout {
                    message_id: self.id.clone(),
                    timeout,
                }),
            },
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        self.replies.waiting.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Pong;

    impl Message for Pong {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[tokio::test]
    async fn test_completed_reply_reaches_waiter() {
        let replies = Arc::new(PendingReplies::new());
        let mut pending = replies.register(MessageId::from("msg_1"));

        assert!(replies.complete(&MessageId::from("msg_1"), Ok(Some(Box::new(Pong)))));
        let reply = pending
            .wait(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.as_any().downcast_ref::<Pong>(), Some(&Pong));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_and_entry_is_removed() {
        let replies = Arc::new(PendingReplies::new());
        let mut pending = replies.register(MessageId::from("msg_2"));

        let result = pending.wait(Duration::from_secs(2), &CancellationToken::new()).await;
        assert!(matches!(result, Err(MessagingError::RouteTimeout { .. })));

        drop(pending);
        assert!(replies.is_empty());
        assert!(!replies.complete(&MessageId::from("msg_2"), Ok(None)));
    }

    #[tokio::test]
    async fn test_cancellation_ends_wait() {
        let replies = Arc::new(PendingReplies::new());
        let mut pending = replies.register(MessageId::from("msg_3"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = pending.wait(Duration::from_secs(30), &cancel).await;
        assert!(matches!(result, Err(MessagingError::Cancelled)));
    }

    #[test]
    fn test_unknown_id_is_not_completed() {
        let replies = PendingReplies::new();
        assert!(!replies.complete(&MessageId::from("msg_unknown"), Ok(None)));
    }
}
