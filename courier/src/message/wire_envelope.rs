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

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::common::{MessageTypeRegistry, RemoteFault, TransportError};
use crate::message::{BrokeredMessage, Endpoint, MessageId};
use crate::traits::MessageEnvelope;

/// The serialized form of a [`BrokeredMessage`] crossing a transport.
///
/// # Wire Format
///
/// ```json
/// {
///   "id": "msg_01h9xz7n2e5p6q8r3t1u2v3w4x",
///   "sender": { "app_id": "orders", "app_instance_id": "inst_01h9..." },
///   "recipients": [{ "app_id": "pricing" }],
///   "timeout_ms": 2000,
///   "content_type": "GetPrice",
///   "content": { "symbol": "ACME" }
/// }
/// ```
///
/// `content_type` is the name the payload type was registered under in the
/// [`MessageTypeRegistry`]; both sides must register the same name.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct WireEnvelope {
    /// Message id.
    pub id: MessageId,
    /// Sending instance.
    #[serde(default)]
    pub sender: Endpoint,
    /// Target endpoints.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<Endpoint>,
    /// Id of the answered request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
    /// Reply timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Fire-and-forget flag.
    #[serde(default)]
    pub one_way: bool,
    /// Channel hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Registered type name of `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Serialized payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
    /// Remote failure carried by a reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<RemoteFault>,
}

impl WireEnvelope {
    /// Serializes a brokered message using the registered content serializer.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownMessageType`] if the content type was never
    /// registered, or [`TransportError::SerializationError`] if serialization fails.
    pub fn from_brokered(
        message: &BrokeredMessage,
        types: &MessageTypeRegistry,
    ) -> Result<Self, TransportError> {
        let (content_type, content) = match message.content() {
            Ok(content) => {
                let (name, value) = types.serialize(content)?;
                (Some(name), Some(value))
            }
            Err(_) => (None, None),
        };

        Ok(Self {
            id: message.id.clone(),
            sender: message.sender.clone(),
            recipients: message.recipients.clone(),
            reply_to: message.reply_to.clone(),
            timeout_ms: message
                .timeout
                .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)),
            one_way: message.one_way,
            channel: message.channel.clone(),
            content_type,
            content,
            fault: message.fault.clone(),
        })
    }

    /// Rebuilds the brokered message, deserializing the content by its registered name.
    ///
    /// # Errors
    ///
    /// [`TransportError::UnknownMessageType`] for unregistered content types,
    /// [`TransportError::ProtocolError`] when content and type name disagree on
    /// presence, or [`TransportError::SerializationError`] for malformed content.
    pub fn into_brokered(self, types: &MessageTypeRegistry) -> Result<BrokeredMessage, TransportError> {
        let content = match (self.content_type, self.content) {
            (Some(name), Some(value)) => Some(types.deserialize_value(&name, &value)?),
            (None, None) => None,
            (Some(name), None) => {
                return Err(TransportError::ProtocolError(format!(
                    "Envelope {} names content type {name} but carries no content",
                    self.id
                )))
            }
            (None, Some(_)) => {
                return Err(TransportError::ProtocolError(format!(
                    "Envelope {} carries content without a content type",
                    self.id
                )))
            }
        };

        let mut message = BrokeredMessage::from_boxed(content);
        message.id = self.id;
        message.sender = self.sender;
        message.recipients = self.recipients;
        message.reply_to = self.reply_to;
        message.timeout = self.timeout_ms.map(Duration::from_millis);
        message.one_way = self.one_way;
        message.channel = self.channel;
        message.fault = self.fault;
        Ok(message)
    }

    /// Encodes the envelope as JSON bytes.
    ///
    /// # Errors
    ///
    /// [`TransportError::SerializationError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an envelope from JSON bytes.
    ///
    /// # Errors
    ///
    /// [`TransportError::SerializationError`] if the bytes are not a valid envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{PeerInfo, PeersChangedMessage};
    use crate::traits::Message;

    #[test]
    fn test_brokered_message_survives_the_wire() {
        let types = MessageTypeRegistry::new();
        let original = BrokeredMessage::new(PeersChangedMessage {
            peers: vec![PeerInfo::new("orders", "i1", "/tmp/orders.pipe")],
        })
        .with_sender(Endpoint::instance("orders", "i1"))
        .to(Endpoint::app("billing"))
        .with_timeout(Duration::from_millis(1500));

        let bytes = WireEnvelope::from_brokered(&original, &types)
            .unwrap()
            .to_bytes()
            .unwrap();
        let decoded = WireEnvelope::from_bytes(&bytes)
            .unwrap()
            .into_brokered(&types)
            .unwrap();

        assert_eq!(decoded.id, original.id);
        assert_eq!(decoded.recipients, original.recipients);
        assert_eq!(decoded.timeout, Some(Duration::from_millis(1500)));
        let peers = decoded
            .content()
            .unwrap()
            .as_any()
            .downcast_ref::<PeersChangedMessage>()
            .map(|message| message.peers.len());
        assert_eq!(peers, Some(1));
    }

    #[test]
    fn test_unregistered_content_cannot_be_encoded() {
        #[derive(Clone, Debug)]
        struct Unregistered;

        impl Message for Unregistered {
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }

        let types = MessageTypeRegistry::new();
        let result = WireEnvelope::from_brokered(&BrokeredMessage::new(Unregistered), &types);
        assert!(matches!(result, Err(TransportError::UnknownMessageType(_))));
    }

    #[test]
    fn test_content_type_without_content_is_rejected() {
        let json = serde_json::json!({
            "id": "msg_1",
            "content_type": "courier.PeersChanged"
        });
        let envelope: WireEnvelope = serde_json::from_value(json).unwrap();
        let result = envelope.into_brokered(&MessageTypeRegistry::new());
        assert!(matches!(result, Err(TransportError::ProtocolError(_))));
    }
}
