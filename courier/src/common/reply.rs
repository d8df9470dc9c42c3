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

//! Handler return values.
//!
//! Handlers return `anyhow::Result<Reply>`. [`Reply`] carries the optional
//! response message; the helpers keep handler bodies short:
//!
//! ```ignore
//! // Fire-and-forget handler
//! builder.on::<AuditEvent, _, _>(|event, _ctx| async move {
//!     store(event).await?;
//!     Reply::ready()
//! });
//!
//! // Request handler
//! builder.on::<GetPrice, _, _>(|request, _ctx| async move {
//!     Reply::ok(PriceQuote { symbol: request.symbol, price: 42.0 })
//! });
//! ```

use crate::traits::Message;

/// The outcome of a successful handler invocation: an optional response message.
#[derive(Clone, Debug, Default)]
pub struct Reply(Option<Box<dyn Message>>);

impl Reply {
    /// A reply without a response message.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(None)
    }

    /// A reply carrying `message`.
    #[inline]
    #[must_use]
    pub fn with(message: impl Message) -> Self {
        Self(Some(Box::new(message)))
    }

    /// A reply carrying an already boxed (possibly absent) message.
    #[inline]
    #[must_use]
    pub const fn from_boxed(message: Option<Box<dyn Message>>) -> Self {
        Self(message)
    }

    /// `Ok` with an empty reply, for handlers that only perform side effects.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` matches the handler signature.
    #[inline]
    pub fn ready() -> anyhow::Result<Self> {
        Ok(Self::empty())
    }

    /// `Ok` with a reply carrying `message`.
    ///
    /// # Errors
    ///
    /// Never fails; the `Result` matches the handler signature.
    #[inline]
    pub fn ok(message: impl Message) -> anyhow::Result<Self> {
        Ok(Self::with(message))
    }

    /// Returns `true` if no response message is carried.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Borrows the response message.
    #[must_use]
    pub fn message(&self) -> Option<&dyn Message> {
        self.0.as_deref()
    }

    /// Takes the response message.
    #[must_use]
    pub fn into_inner(self) -> Option<Box<dyn Message>> {
        self.0
    }

    /// Downcasts the response message to `T`.
    #[must_use]
    pub fn downcast<T: Message + Clone>(&self) -> Option<T> {
        self.message()
            .and_then(|message| message.as_any().downcast_ref::<T>())
            .cloned()
    }
}

impl From<Option<Box<dyn Message>>> for Reply {
    fn from(message: Option<Box<dyn Message>>) -> Self {
        Self(message)
    }
}
