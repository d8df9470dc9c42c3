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

//! Registry of message types allowed to cross transports.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::TransportError;
use crate::message::PeersChangedMessage;
use crate::traits::Message;

type DeserializerFn =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Message>, String> + Send + Sync>;

type SerializerFn = Arc<dyn Fn(&dyn Message) -> Result<serde_json::Value, String> + Send + Sync>;

/// Maps wire names to message (de)serializers.
///
/// Before a message can travel inside a [`WireEnvelope`](crate::message::WireEnvelope)
/// its type must be registered under the same name on both sides. Content is
/// serialized by looking up the runtime [`TypeId`] of the message and
/// deserialized by the name carried in the envelope.
///
/// [`PeersChangedMessage`] is registered by [`new`](MessageTypeRegistry::new).
///
/// # Example
///
/// ```rust,ignore
/// #[courier_message(wire, response = PriceQuote)]
/// struct GetPrice {
///     symbol: String,
/// }
///
/// let types = MessageTypeRegistry::new();
/// types.register::<GetPrice>("GetPrice");
/// ```
pub struct MessageTypeRegistry {
    deserializers: DashMap<String, DeserializerFn>,
    names: DashMap<TypeId, String>,
    serializers: DashMap<TypeId, SerializerFn>,
}

impl Default for MessageTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTypeRegistry")
            .field("registered_types", &self.deserializers.len())
            .finish()
    }
}

impl MessageTypeRegistry {
    /// Creates a registry holding the built-in message types.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self {
            deserializers: DashMap::new(),
            names: DashMap::new(),
            serializers: DashMap::new(),
        };
        registry.register::<PeersChangedMessage>(PeersChangedMessage::WIRE_NAME);
        registry
    }

    /// Registers `M` under `name`.
    ///
    /// Registering another type under an existing name replaces it.
    pub fn register<M>(&self, name: &str)
    where
        M: Message + Serialize + DeserializeOwned,
    {
        let deserializer: DeserializerFn = Arc::new(|value: &serde_json::Value| {
            let message = M::deserialize(value).map_err(|e| e.to_string())?;
            Ok(Box::new(message))
        });
        self.deserializers.insert(name.to_string(), deserializer);

        let type_id = TypeId::of::<M>();
        self.names.insert(type_id, name.to_string());

        let serializer: SerializerFn = Arc::new(|message: &dyn Message| {
            let concrete = message
                .as_any()
                .downcast_ref::<M>()
                .ok_or_else(|| "Type mismatch during serialization".to_string())?;
            serde_json::to_value(concrete).map_err(|e| e.to_string())
        });
        self.serializers.insert(type_id, serializer);
    }

    /// Registers `M` under its Rust type name.
    pub fn register_with_type_name<M>(&self)
    where
        M: Message + Serialize + DeserializeOwned,
    {
        self.register::<M>(std::any::type_name::<M>());
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.deserializers.contains_key(name)
    }

    /// Wire name of a registered type.
    #[must_use]
    pub fn name_of(&self, type_id: &TypeId) -> Option<String> {
        self.names.get(type_id).map(|name| name.clone())
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deserializers.len()
    }

    /// Returns `true` if no name is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deserializers.is_empty()
    }

    /// Registered names.
    pub fn type_names(&self) -> impl Iterator<Item = String> + '_ {
        self.deserializers.iter().map(|entry| entry.key().clone())
    }

    /// Serializes a message, returning its wire name and JSON value.
    ///
    /// # Errors
    ///
    /// * [`TransportError::UnknownMessageType`] - The type was never registered.
    /// * [`TransportError::SerializationError`] - Serialization failed.
    pub fn serialize(&self, message: &dyn Message) -> Result<(String, serde_json::Value), TransportError> {
        let type_id = message.as_any().type_id();
        let name = self
            .name_of(&type_id)
            .ok_or_else(|| TransportError::UnknownMessageType(message.type_name().to_string()))?;
        let serializer = self
            .serializers
            .get(&type_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::UnknownMessageType(name.clone()))?;
        let value = serializer(message).map_err(TransportError::SerializationError)?;
        Ok((name, value))
    }

    /// Deserializes a JSON value registered under `name`.
    ///
    /// # Errors
    ///
    /// * [`TransportError::UnknownMessageType`] - `name` is not registered.
    /// * [`TransportError::SerializationError`] - The value does not fit the type.
    pub fn deserialize_value(
        &self,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<Box<dyn Message>, TransportError> {
        let deserializer = self
            .deserializers
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::UnknownMessageType(name.to_string()))?;
        deserializer(value).map_err(TransportError::SerializationError)
    }
}
