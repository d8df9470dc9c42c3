//! Message model: identifiers, endpoints and the envelopes carried by routers.
//!
//! *   [`BrokeredMessage`]: Envelope with routing metadata (sender, recipients, reply
//!     correlation, timeout) used for distributed messaging.
//! *   [`EventEnvelope`]: Envelope wrapping an event for pub/sub fan-out.
//! *   [`MessageContext`]: Metadata handed to handlers alongside the unwrapped payload.
//! *   [`WireEnvelope`]: The serde form of a brokered message crossing a transport.

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

// --- Public Re-exports ---
pub use brokered_message::BrokeredMessage;
pub use endpoint::{AppIdentity, Endpoint, EndpointParseError};
pub use event_envelope::EventEnvelope;
pub use message_context::MessageContext;
pub use message_id::MessageId;
pub use peers_changed::{PeerInfo, PeersChangedMessage};
pub use wire_envelope::WireEnvelope;

// --- Submodules ---

/// Defines [`BrokeredMessage`].
mod brokered_message;
/// Defines [`Endpoint`] and [`AppIdentity`].
mod endpoint;
/// Defines [`EventEnvelope`].
mod event_envelope;
mod message_context;
mod message_id;
/// Defines the peer discovery broadcast.
mod peers_changed;
/// Defines [`WireEnvelope`].
mod wire_envelope;
