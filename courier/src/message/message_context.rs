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

use crate::message::{BrokeredMessage, Endpoint, MessageId};
use crate::traits::{Message, MessageType};

/// Metadata handed to a handler alongside the unwrapped payload.
///
/// When the processed message arrived inside an envelope, the envelope is kept
/// here together with the routing metadata of brokered messages (correlation id,
/// sender, channel).
#[derive(Clone, Debug, Default)]
pub struct MessageContext {
    correlation_id: Option<MessageId>,
    sender: Option<Endpoint>,
    channel: Option<String>,
    envelope: Option<Arc<dyn Message>>,
}

impl MessageContext {
    /// An empty context for direct in-process calls.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Context carrying the routing metadata of `message`, without the envelope itself.
    #[must_use]
    pub fn for_brokered(message: &BrokeredMessage) -> Self {
        Self {
            correlation_id: Some(message.id.clone()),
            sender: (!message.sender.is_empty()).then(|| message.sender.clone()),
            channel: message.channel.clone(),
            envelope: None,
        }
    }

    /// Retains `envelope`, copying brokered metadata when the envelope is a
    /// [`BrokeredMessage`] and the context does not carry it yet.
    #[must_use]
    pub fn with_envelope(mut self, envelope: &dyn Message) -> Self {
        if let Some(brokered) = envelope.as_any().downcast_ref::<BrokeredMessage>() {
            let metadata = Self::for_brokered(brokered);
            self.correlation_id = self.correlation_id.or(metadata.correlation_id);
            self.sender = self.sender.or(metadata.sender);
            self.channel = self.channel.or(metadata.channel);
        }
        self.envelope = Some(Arc::from(dyn_clone::clone_box(envelope)));
        self
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: MessageId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_sender(mut self, sender: Endpoint) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Id used to correlate this message with its reply.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<&MessageId> {
        self.correlation_id.as_ref()
    }

    /// The sending endpoint, for messages received from a transport.
    #[must_use]
    pub const fn sender(&self) -> Option<&Endpoint> {
        self.sender.as_ref()
    }

    /// Transport channel hint of the originating brokered message.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// The envelope the payload was unwrapped from.
    #[must_use]
    pub fn envelope(&self) -> Option<&dyn Message> {
        self.envelope.as_deref()
    }

    /// Type information of the envelope, used as the envelope half of handler matching.
    #[must_use]
    pub fn envelope_type(&self) -> Option<MessageType> {
        self.envelope().map(|envelope| envelope.message_type())
    }

    /// The envelope as a brokered message, if it is one.
    #[must_use]
    pub fn brokered(&self) -> Option<&BrokeredMessage> {
        self.envelope()
            .and_then(|envelope| envelope.as_any().downcast_ref::<BrokeredMessage>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EventEnvelope;

    #[derive(Clone, Debug)]
    struct Ping;

    impl Message for Ping {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_brokered_envelope_fills_metadata() {
        let brokered = BrokeredMessage::new(Ping)
            .with_sender(Endpoint::instance("orders", "i1"))
            .on_channel("fast");
        let context = MessageContext::new().with_envelope(&brokered);

        assert_eq!(context.correlation_id(), Some(&brokered.id));
        assert_eq!(context.sender(), Some(&Endpoint::instance("orders", "i1")));
        assert_eq!(context.channel(), Some("fast"));
        assert_eq!(context.brokered().map(|b| &b.id), Some(&brokered.id));
        assert!(context
            .envelope_type()
            .is_some_and(|t| t.is_type::<BrokeredMessage>()));
    }

    #[test]
    fn test_explicit_metadata_wins_over_envelope() {
        let brokered = BrokeredMessage::new(Ping);
        let context = MessageContext::new()
            .with_correlation_id(MessageId::from("msg_explicit"))
            .with_envelope(&brokered);

        assert_eq!(context.correlation_id(), Some(&MessageId::from("msg_explicit")));
    }

    #[test]
    fn test_event_envelope_has_no_brokered_view() {
        let context = MessageContext::new().with_envelope(&EventEnvelope::new(Ping));
        assert!(context.brokered().is_none());
        assert!(context.sender().is_none());
        assert!(context.envelope().is_some());
    }
}
