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

use std::any::Any;
use std::time::Duration;

use crate::common::{EnvelopeError, RemoteFault};
use crate::message::{Endpoint, MessageId};
use crate::traits::{Message, MessageEnvelope, MessageKind};

/// An envelope carrying a payload plus the metadata needed to route it between
/// application instances and to correlate its reply.
///
/// A message with an empty `recipients` list is unaddressed: the router chain
/// decides where it goes (by default it is handled in-process). A message whose
/// `reply_to` is set is a reply and completes the caller waiting on that id.
///
/// # Example
///
/// ```rust,ignore
/// let message = BrokeredMessage::new(GetPrice { symbol: "ACME".into() })
///     .to(Endpoint::app("pricing"))
///     .with_timeout(Duration::from_secs(2));
/// let reply = bus.dispatch(message).await?;
/// ```
#[derive(Clone, Debug)]
pub struct BrokeredMessage {
    /// Unique id, also the correlation key for the reply.
    pub id: MessageId,
    /// The sending instance. Filled in by the broker when left empty.
    pub sender: Endpoint,
    /// Target endpoints. Empty means unaddressed.
    pub recipients: Vec<Endpoint>,
    /// Id of the request this message answers.
    pub reply_to: Option<MessageId>,
    /// How long the sender waits for a reply. Falls back to the configured default.
    pub timeout: Option<Duration>,
    /// `true` when no reply is expected.
    pub one_way: bool,
    /// Optional transport channel hint.
    pub channel: Option<String>,
    /// Remote failure carried by a reply instead of content.
    pub fault: Option<RemoteFault>,
    content: Option<Box<dyn Message>>,
}

impl BrokeredMessage {
    /// Wraps `content` in an unaddressed envelope with a fresh id.
    #[must_use]
    pub fn new(content: impl Message) -> Self {
        Self::from_boxed(Some(Box::new(content)))
    }

    /// Wraps already boxed (possibly absent) content.
    #[must_use]
    pub fn from_boxed(content: Option<Box<dyn Message>>) -> Self {
        Self {
            id: MessageId::generate(),
            sender: Endpoint::default(),
            recipients: Vec::new(),
            reply_to: None,
            timeout: None,
            one_way: false,
            channel: None,
            fault: None,
            content,
        }
    }

    /// Sets the sender.
    #[must_use]
    pub fn with_sender(mut self, sender: Endpoint) -> Self {
        self.sender = sender;
        self
    }

    /// Adds a recipient.
    #[must_use]
    pub fn to(mut self, recipient: Endpoint) -> Self {
        self.recipients.push(recipient);
        self
    }

    /// Sets the reply timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Marks the message as fire-and-forget.
    #[must_use]
    pub const fn one_way(mut self) -> Self {
        self.one_way = true;
        self
    }

    /// Sets the transport channel hint.
    #[must_use]
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Builds the reply to this message.
    ///
    /// The reply is one-way, addressed to the original sender, and correlated
    /// through `reply_to`.
    #[must_use]
    pub fn reply(&self, sender: Endpoint, content: Option<Box<dyn Message>>) -> Self {
        let mut reply = Self::from_boxed(content).with_sender(sender).one_way();
        reply.reply_to = Some(self.id.clone());
        reply.channel = self.channel.clone();
        if !self.sender.is_empty() {
            reply.recipients.push(self.sender.clone());
        }
        reply
    }

    /// Builds a reply carrying a failure instead of content.
    #[must_use]
    pub fn fault_reply(&self, sender: Endpoint, fault: RemoteFault) -> Self {
        let mut reply = self.reply(sender, None);
        reply.fault = Some(fault);
        reply
    }

    /// Returns `true` if this message answers another one.
    #[must_use]
    pub const fn is_reply(&self) -> bool {
        self.reply_to.is_some()
    }

    /// Returns `true` if the message names no recipient.
    #[must_use]
    pub fn is_unaddressed(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Takes the content out of the envelope.
    #[must_use]
    pub fn into_content(self) -> Option<Box<dyn Message>> {
        self.content
    }
}

impl Message for BrokeredMessage {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::Brokered, MessageKind::Envelope]
    }

    fn as_envelope(&self) -> Option<&dyn MessageEnvelope> {
        Some(self)
    }
}

impl MessageEnvelope for BrokeredMessage {
    fn content(&self) -> Result<&dyn Message, EnvelopeError> {
        self.content.as_deref().ok_or(EnvelopeError::MissingContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct Ping(u32);

    impl Message for Ping {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_reply_is_addressed_to_sender_and_correlated() {
        let request = BrokeredMessage::new(Ping(1))
            .with_sender(Endpoint::instance("orders", "i1"))
            .to(Endpoint::app("billing"))
            .on_channel("priority");

        let reply = request.reply(Endpoint::instance("billing", "b1"), Some(Box::new(Ping(2))));

        assert_eq!(reply.reply_to.as_ref(), Some(&request.id));
        assert_eq!(reply.recipients, vec![Endpoint::instance("orders", "i1")]);
        assert_eq!(reply.channel.as_deref(), Some("priority"));
        assert!(reply.one_way);
        assert_ne!(reply.id, request.id);
    }

    #[test]
    fn test_content_is_returned_not_the_envelope() {
        let message = BrokeredMessage::new(Ping(7));
        let content = message.content().unwrap();
        assert_eq!(content.as_any().downcast_ref::<Ping>(), Some(&Ping(7)));
    }

    #[test]
    fn test_missing_content_is_an_error() {
        let message = BrokeredMessage::from_boxed(None);
        assert!(matches!(message.content(), Err(EnvelopeError::MissingContent)));
    }

    #[test]
    fn test_brokered_message_reports_envelope_kinds() {
        let message_type = BrokeredMessage::new(Ping(1)).message_type();
        assert!(message_type.is(MessageKind::Brokered));
        assert!(message_type.is(MessageKind::Envelope));
        assert!(message_type.is_type::<BrokeredMessage>());
    }
}
