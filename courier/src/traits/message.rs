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

use std::any::{Any, TypeId};
use std::fmt::Debug;

use dyn_clone::DynClone;

use crate::traits::MessageEnvelope;

/// Classification tags a message carries in addition to its concrete type.
///
/// Handler rules can match on a kind instead of an exact type, which is how
/// "every event" or "every brokered message" rules are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Broadcast semantics: every interested handler may receive it.
    Event,
    /// A [`BrokeredMessage`](crate::message::BrokeredMessage) carrying routing metadata.
    Brokered,
    /// A wrapper exposing its content through [`MessageEnvelope`].
    Envelope,
    /// Application-defined classification.
    Custom(&'static str),
}

/// A trait for types that can flow through the Courier processor and routers.
///
/// Combines `Any + Send + Sync + Debug` with [`DynClone`] so messages can be
/// shared between tasks, cloned as trait objects and downcast back to their
/// concrete types. The runtime [`TypeId`] of the implementing type is the
/// dispatch key used by handler resolution.
///
/// Implementations are normally generated with `#[courier_message]`:
///
/// ```rust,ignore
/// #[courier_message(event)]
/// struct OrderPlaced {
///     order_id: u64,
/// }
/// ```
pub trait Message: DynClone + Any + Send + Sync + Debug {
    /// Returns the message as a dynamic [`Any`] reference for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Kinds this message belongs to. Empty by default.
    fn kinds(&self) -> &'static [MessageKind] {
        &[]
    }

    /// Returns the envelope view of this message, if it wraps other content.
    fn as_envelope(&self) -> Option<&dyn MessageEnvelope> {
        None
    }

    /// The Rust type name of the concrete message.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Captures the runtime type information used for handler matching.
    fn message_type(&self) -> MessageType {
        MessageType {
            id: self.as_any().type_id(),
            name: self.type_name(),
            kinds: self.kinds(),
        }
    }
}

dyn_clone::clone_trait_object!(Message);

/// A message that expects a typed response.
///
/// Generated by `#[courier_message(response = T)]`.
pub trait Request: Message {
    /// The message type the handler replies with.
    type Response: Message + Clone;
}

/// Runtime type information of a message, as seen by handler resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageType {
    /// The concrete type id.
    pub id: TypeId,
    /// The concrete type name, for diagnostics.
    pub name: &'static str,
    /// Declared kinds.
    pub kinds: &'static [MessageKind],
}

impl MessageType {
    /// Returns `true` if the type was declared with the given kind.
    #[must_use]
    pub fn is(&self, kind: MessageKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Returns `true` if this type is the concrete type `M`.
    #[must_use]
    pub fn is_type<M: Message>(&self) -> bool {
        self.id == TypeId::of::<M>()
    }
}
