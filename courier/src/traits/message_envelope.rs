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

use crate::common::EnvelopeError;
use crate::traits::Message;

/// A message wrapping other content.
///
/// The processor unwraps envelopes through [`content`](MessageEnvelope::content)
/// before resolving a handler, keeping the envelope itself in the
/// [`MessageContext`](crate::message::MessageContext).
pub trait MessageEnvelope: Message {
    /// Returns the wrapped payload, never the envelope itself.
    ///
    /// # Errors
    ///
    /// [`EnvelopeError::MissingContent`] when the envelope carries no payload.
    fn content(&self) -> Result<&dyn Message, EnvelopeError>;
}
