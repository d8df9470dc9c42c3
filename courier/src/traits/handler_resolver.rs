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

use crate::common::HandlerRegistration;
use crate::traits::MessageType;

/// Maps a `(message type, envelope type)` pair to a handler registration.
///
/// Returning `None` is not an error: it means this resolver does not own the
/// message, and the processor moves on to the next resolver. Resolvers are
/// consulted in descending [`priority`](HandlerResolver::priority).
pub trait HandlerResolver: Send + Sync + 'static {
    /// Position of this resolver in the processor's chain. Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Returns `true` if a handler would be resolved for the pair.
    fn can_handle(&self, message_type: &MessageType, envelope_type: Option<&MessageType>) -> bool {
        self.try_resolve(message_type, envelope_type).is_some()
    }

    /// Returns the best matching registration, if any.
    fn try_resolve(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Option<Arc<HandlerRegistration>>;

    /// Returns every matching registration in resolution order.
    ///
    /// Used for event fan-out. Defaults to the single best match.
    fn resolve_all(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Vec<Arc<HandlerRegistration>> {
        self.try_resolve(message_type, envelope_type)
            .into_iter()
            .collect()
    }
}
