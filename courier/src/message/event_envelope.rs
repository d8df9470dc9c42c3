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

use crate::common::EnvelopeError;
use crate::traits::{Message, MessageEnvelope, MessageKind};

/// Wraps an event for pub/sub fan-out.
///
/// Handlers receive the wrapped event; the envelope stays reachable through
/// [`MessageContext::envelope`](crate::message::MessageContext::envelope).
#[derive(Clone, Debug, Default)]
pub struct EventEnvelope {
    content: Option<Box<dyn Message>>,
}

impl EventEnvelope {
    /// Wraps `event`.
    #[must_use]
    pub fn new(event: impl Message) -> Self {
        Self {
            content: Some(Box::new(event)),
        }
    }

    /// Wraps an already boxed event.
    #[must_use]
    pub fn from_boxed(event: Box<dyn Message>) -> Self {
        Self {
            content: Some(event),
        }
    }

    /// An envelope without content.
    #[must_use]
    pub const fn empty() -> Self {
        Self { content: None }
    }
}

impl Message for EventEnvelope {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn kinds(&self) -> &'static [MessageKind] {
        &[MessageKind::Envelope]
    }

    fn as_envelope(&self) -> Option<&dyn MessageEnvelope> {
        Some(self)
    }
}

impl MessageEnvelope for EventEnvelope {
    fn content(&self) -> Result<&dyn Message, EnvelopeError> {
        self.content.as_deref().ok_or(EnvelopeError::MissingContent)
    }
}
