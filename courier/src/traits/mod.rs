//! Core traits of the Courier messaging layer.
//!
//! *   [`Message`]: Implemented by every payload that flows through the processor or a
//!     router. Usually generated by `#[courier_message]`.
//! *   [`Request`]: Pairs a request message with its response type.
//! *   [`MessageEnvelope`]: Wrappers (events, brokered messages) exposing their content.
//! *   [`MessageHandler`]: A unit of logic consuming a message and producing a [`Reply`](crate::common::Reply).
//! *   [`HandlerResolver`]: Maps a message/envelope type pair to a handler registration.
//! *   [`MessageRouter`]: A step of the distributed router chain (in-process, pipes, Redis, ...).

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
pub use handler_resolver::HandlerResolver;
pub use message::{Message, MessageKind, MessageType, Request};
pub use message_envelope::MessageEnvelope;
pub use message_handler::{FnHandler, MessageHandler};
pub use message_router::MessageRouter;

// --- Submodules ---

/// Defines the [`HandlerResolver`] trait.
mod handler_resolver;
/// Defines the [`Message`] and [`Request`] traits.
mod message;
/// Defines the [`MessageEnvelope`] trait.
mod message_envelope;
/// Defines the [`MessageHandler`] trait and closure-backed handlers.
mod message_handler;
/// Defines the [`MessageRouter`] trait.
mod message_router;
