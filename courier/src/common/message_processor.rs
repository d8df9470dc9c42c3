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
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::common::{HandlerRegistration, MessagingError, Reply};
use crate::message::{EventEnvelope, MessageContext};
use crate::traits::{HandlerResolver, Message, MessageEnvelope, MessageType, Request};

/// The single in-process entry point for handling messages.
///
/// The processor walks its resolvers (highest [`priority`](HandlerResolver::priority)
/// first) to find a handler, invokes it and returns its [`Reply`] unchanged.
/// It holds no state besides the resolver list, which may grow while the
/// processor is in use.
///
/// Resolution takes two passes. The message is first offered whole, which lets
/// rules naming an envelope type (such as brokered dispatch) claim it. If no
/// resolver does and the message is an envelope, its content is unwrapped and
/// resolved against the `(content type, envelope type)` pair, with the envelope
/// kept in the [`MessageContext`].
pub struct MessageProcessor {
    resolvers: RwLock<Arc<Vec<Arc<dyn HandlerResolver>>>>,
}

impl Default for MessageProcessor {
    fn default() -> Self {
        Self {
            resolvers: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl fmt::Debug for MessageProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageProcessor")
            .field("resolvers", &self.resolvers.read().len())
            .finish()
    }
}

impl MessageProcessor {
    /// Creates a processor without resolvers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a processor consulting `resolver`.
    #[must_use]
    pub fn with_resolver(resolver: Arc<dyn HandlerResolver>) -> Self {
        let processor = Self::new();
        processor.add_resolver(resolver);
        processor
    }

    /// Adds a resolver, keeping the chain ordered by descending priority.
    /// Resolvers with equal priority keep their insertion order.
    pub fn add_resolver(&self, resolver: Arc<dyn HandlerResolver>) {
        let mut guard = self.resolvers.write();
        let mut resolvers: Vec<_> = guard.iter().cloned().collect();
        let position = resolvers
            .iter()
            .position(|existing| existing.priority() < resolver.priority())
            .unwrap_or(resolvers.len());
        resolvers.insert(position, resolver);
        *guard = Arc::new(resolvers);
    }

    /// Finds the handler for the pair, asking each resolver in turn.
    #[must_use]
    pub fn resolve(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Option<Arc<HandlerRegistration>> {
        let resolvers = self.resolvers.read().clone();
        resolvers
            .iter()
            .find_map(|resolver| resolver.try_resolve(message_type, envelope_type))
    }

    /// Processes a message with the best matching handler.
    ///
    /// # Arguments
    ///
    /// * `message` - The message, possibly an envelope.
    /// * `context` - Caller-supplied metadata; extended with the envelope when one is unwrapped.
    /// * `cancel` - Cancelling it abandons the handler and returns [`MessagingError::Cancelled`].
    ///
    /// # Errors
    ///
    /// * [`MessagingError::HandlerNotFound`] - No resolver owns the message.
    /// * [`MessagingError::Envelope`] - An envelope without content could not be unwrapped.
    /// * [`MessagingError::Processing`] - The handler returned an error or panicked.
    /// * [`MessagingError::Cancelled`] - `cancel` fired first.
    #[instrument(skip_all, fields(message_type = message.type_name()))]
    pub async fn process(
        &self,
        message: &dyn Message,
        context: MessageContext,
        cancel: &CancellationToken,
    ) -> Result<Reply, MessagingError> {
        let message_type = message.message_type();
        if let Some(registration) = self.resolve(&message_type, None) {
            return Self::invoke(&registration, message, &context, cancel).await;
        }
        if message.as_envelope().is_none() {
            debug!("No handler found");
            return Err(MessagingError::HandlerNotFound {
                message_type: message_type.name.to_string(),
            });
        }
        self.process_content(message, context, cancel).await
    }

    /// Processes the content of `envelope`, never the envelope as a whole.
    ///
    /// Used for envelopes that already reached their destination, such as
    /// brokered messages received from a transport. A message that is not an
    /// envelope is processed as is.
    ///
    /// # Errors
    ///
    /// Same as [`process`](Self::process).
    #[instrument(skip_all, fields(envelope_type = envelope.type_name()))]
    pub async fn process_content(
        &self,
        envelope: &dyn Message,
        context: MessageContext,
        cancel: &CancellationToken,
    ) -> Result<Reply, MessagingError> {
        let Some(view) = envelope.as_envelope() else {
            let message_type = envelope.message_type();
            let registration = self.resolve(&message_type, None).ok_or_else(|| {
                MessagingError::HandlerNotFound {
                    message_type: message_type.name.to_string(),
                }
            })?;
            return Self::invoke(&registration, envelope, &context, cancel).await;
        };

        let envelope_type = envelope.message_type();
        let content = view.content()?;
        let content_type = content.message_type();
        let context = context.with_envelope(envelope);
        let Some(registration) = self.resolve(&content_type, Some(&envelope_type)) else {
            debug!(content_type = content_type.name, "No handler found for envelope content");
            return Err(MessagingError::HandlerNotFound {
                message_type: content_type.name.to_string(),
            });
        };
        Self::invoke(&registration, content, &context, cancel).await
    }

    /// Sends a typed request and returns its typed response.
    ///
    /// # Errors
    ///
    /// Every error of [`process`](Self::process), plus
    /// [`MessagingError::UnexpectedResponse`] when the handler replied with
    /// nothing or with another type.
    pub async fn request<R: Request>(
        &self,
        request: R,
        context: MessageContext,
        cancel: &CancellationToken,
    ) -> Result<R::Response, MessagingError> {
        let reply = self.process(&request, context, cancel).await?;
        expect_response::<R>(&reply)
    }

    /// Delivers an event to every matching handler, in resolution order.
    ///
    /// `event` may be an [`EventEnvelope`], which is unwrapped first. Having no
    /// subscriber is not an error for events.
    ///
    /// # Returns
    ///
    /// The number of handlers invoked.
    ///
    /// # Errors
    ///
    /// All handlers run even when one fails; the first failure is returned
    /// afterwards. [`MessagingError::Cancelled`] stops the fan-out immediately.
    #[instrument(skip_all, fields(message_type = event.type_name()))]
    pub async fn publish(
        &self,
        event: &dyn Message,
        context: MessageContext,
        cancel: &CancellationToken,
    ) -> Result<usize, MessagingError> {
        let (payload, envelope_type, context) =
            match event.as_any().downcast_ref::<EventEnvelope>() {
                Some(envelope) => (
                    envelope.content()?,
                    Some(event.message_type()),
                    context.with_envelope(event),
                ),
                None => (event, None, context),
            };

        let payload_type = payload.message_type();
        let resolvers = self.resolvers.read().clone();
        let registrations: Vec<_> = resolvers
            .iter()
            .flat_map(|resolver| resolver.resolve_all(&payload_type, envelope_type.as_ref()))
            .collect();
        trace!(subscribers = registrations.len(), "Publishing event");

        let mut first_error = None;
        for registration in &registrations {
            match Self::invoke(registration, payload, &context, cancel).await {
                Ok(_) => {}
                Err(MessagingError::Cancelled) => return Err(MessagingError::Cancelled),
                Err(e) => {
                    warn!(handler = registration.name(), error = %e, "Event handler failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        first_error.map_or(Ok(registrations.len()), Err)
    }

    async fn invoke(
        registration: &HandlerRegistration,
        message: &dyn Message,
        context: &MessageContext,
        cancel: &CancellationToken,
    ) -> Result<Reply, MessagingError> {
        trace!(handler = registration.name(), "Invoking handler");
        let invocation =
            AssertUnwindSafe(registration.handler().process(message, context, cancel)).catch_unwind();

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(MessagingError::Cancelled),
            outcome = invocation => outcome,
        };

        let failure = match outcome {
            Ok(Ok(reply)) => return Ok(reply),
            Ok(Err(source)) => source,
            Err(panic) => anyhow::anyhow!("handler panicked: {}", panic_message(panic.as_ref())),
        };

        error!(handler = registration.name(), error = %failure, "Handler failed");
        Err(MessagingError::Processing {
            message_type: message.type_name().to_string(),
            handler: registration.name().to_string(),
            correlation_id: context.correlation_id().cloned(),
            source: failure,
        })
    }
}

/// Extracts the typed response of `R` from a reply.
pub(crate) fn expect_response<R: Request>(reply: &Reply) -> Result<R::Response, MessagingError> {
    reply.downcast::<R::Response>().ok_or_else(|| MessagingError::UnexpectedResponse {
        expected: std::any::type_name::<R::Response>(),
        actual: reply.message().map(|message| message.type_name().to_string()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
