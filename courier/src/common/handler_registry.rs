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

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::common::{Reply, TypeMatcher};
use crate::message::MessageContext;
use crate::traits::{FnHandler, HandlerResolver, Message, MessageHandler, MessageKind, MessageType};

/// A handler together with the rules and priorities used to select it.
///
/// Among registrations matching a message, the one with the highest override
/// priority wins, then the highest processing priority, then the earliest
/// registration.
pub struct HandlerRegistration {
    name: String,
    message_matcher: TypeMatcher,
    envelope_matcher: TypeMatcher,
    handler: Arc<dyn MessageHandler>,
    processing_priority: i32,
    override_priority: i32,
    order: u64,
}

impl HandlerRegistration {
    /// Creates a registration matching messages with `message_matcher`, with or
    /// without an envelope.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        message_matcher: TypeMatcher,
        handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            message_matcher,
            envelope_matcher: TypeMatcher::Any,
            handler,
            processing_priority: 0,
            override_priority: 0,
            order: 0,
        }
    }

    /// Creates a registration for the concrete message type `M` backed by an
    /// async closure.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let registration = HandlerRegistration::for_message::<GetPrice, _, _>(|request, _ctx| async move {
    ///     Reply::ok(PriceQuote { symbol: request.symbol, price: 42.0 })
    /// })
    /// .with_override_priority(10);
    /// ```
    #[must_use]
    pub fn for_message<M, F, Fut>(handler: F) -> Self
    where
        M: Message + Clone,
        F: Fn(M, MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Reply>> + Send + 'static,
    {
        Self::new(
            std::any::type_name::<M>(),
            TypeMatcher::exact::<M>(),
            Arc::new(FnHandler::<M, F>::new(handler)),
        )
    }

    /// Renames the registration.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Restricts the envelope the message must arrive in.
    #[must_use]
    pub fn with_envelope(mut self, envelope_matcher: TypeMatcher) -> Self {
        self.envelope_matcher = envelope_matcher;
        self
    }

    /// Sets the processing priority (higher wins).
    #[must_use]
    pub const fn with_processing_priority(mut self, priority: i32) -> Self {
        self.processing_priority = priority;
        self
    }

    /// Sets the override priority (higher wins, compared before processing priority).
    #[must_use]
    pub const fn with_override_priority(mut self, priority: i32) -> Self {
        self.override_priority = priority;
        self
    }

    /// Registration name, used in logs and processing errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The handler.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    /// Processing priority.
    #[must_use]
    pub const fn processing_priority(&self) -> i32 {
        self.processing_priority
    }

    /// Override priority.
    #[must_use]
    pub const fn override_priority(&self) -> i32 {
        self.override_priority
    }

    /// Returns `true` if both rules accept the pair.
    ///
    /// A wildcard message rule sees payloads only: whole envelopes match only
    /// rules that name them.
    #[must_use]
    pub fn matches(&self, message_type: &MessageType, envelope_type: Option<&MessageType>) -> bool {
        if message_type.is(MessageKind::Envelope)
            && matches!(self.message_matcher, TypeMatcher::Any)
        {
            return false;
        }
        self.message_matcher.matches(Some(message_type)) && self.envelope_matcher.matches(envelope_type)
    }

    fn resolution_order(&self, other: &Self) -> Ordering {
        other
            .override_priority
            .cmp(&self.override_priority)
            .then(other.processing_priority.cmp(&self.processing_priority))
            .then(self.order.cmp(&other.order))
    }
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("name", &self.name)
            .field("message_matcher", &self.message_matcher)
            .field("envelope_matcher", &self.envelope_matcher)
            .field("processing_priority", &self.processing_priority)
            .field("override_priority", &self.override_priority)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

/// Priority-ordered handler registry.
///
/// Registrations are kept sorted in resolution order inside a copy-on-write
/// snapshot: lookups clone the current `Arc` and never wait for writers, and
/// [`register`](HandlerRegistry::register) swaps in a new snapshot, so handlers
/// can be added while messages are being processed.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: RwLock<Arc<Vec<Arc<HandlerRegistration>>>>,
    next_order: AtomicU64,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a registration.
    pub fn register(&self, mut registration: HandlerRegistration) {
        registration.order = self.next_order.fetch_add(1, AtomicOrdering::Relaxed);
        debug!(
            handler = registration.name(),
            override_priority = registration.override_priority,
            processing_priority = registration.processing_priority,
            "Registering handler"
        );

        let mut guard = self.entries.write();
        let mut entries = Vec::with_capacity(guard.len() + 1);
        entries.extend(guard.iter().cloned());
        entries.push(Arc::new(registration));
        entries.sort_by(|a, b| a.resolution_order(b));
        *guard = Arc::new(entries);
    }

    /// The current registrations in resolution order.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<HandlerRegistration>>> {
        self.entries.read().clone()
    }

    /// Every registration matching the pair, in resolution order.
    #[must_use]
    pub fn matching(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Vec<Arc<HandlerRegistration>> {
        self.snapshot()
            .iter()
            .filter(|entry| entry.matches(message_type, envelope_type))
            .cloned()
            .collect()
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registered_handlers", &self.len())
            .finish()
    }
}

impl HandlerResolver for HandlerRegistry {
    fn try_resolve(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Option<Arc<HandlerRegistration>> {
        let resolved = self
            .snapshot()
            .iter()
            .find(|entry| entry.matches(message_type, envelope_type))
            .cloned();
        trace!(
            message_type = message_type.name,
            handler = resolved.as_ref().map(|entry| entry.name()),
            "Resolved handler"
        );
        resolved
    }

    fn resolve_all(
        &self,
        message_type: &MessageType,
        envelope_type: Option<&MessageType>,
    ) -> Vec<Arc<HandlerRegistration>> {
        self.matching(message_type, envelope_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BrokeredMessage, EventEnvelope};

    #[derive(Clone, Debug)]
    struct OrderPlaced;

    impl Message for OrderPlaced {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn kinds(&self) -> &'static [MessageKind] {
            &[MessageKind::Event]
        }
    }

    fn named(name: &str) -> HandlerRegistration {
        HandlerRegistration::for_message::<OrderPlaced, _, _>(|_, _| async { Reply::ready() }).named(name)
    }

    fn resolve(registry: &HandlerRegistry) -> Option<String> {
        registry
            .try_resolve(&OrderPlaced.message_type(), None)
            .map(|entry| entry.name().to_string())
    }

    #[test]
    fn test_higher_override_priority_wins() {
        let registry = HandlerRegistry::new();
        registry.register(named("ha").with_override_priority(0));
        registry.register(named("hb").with_override_priority(10));

        assert_eq!(resolve(&registry).as_deref(), Some("hb"));
    }

    #[test]
    fn test_override_priority_beats_processing_priority() {
        let registry = HandlerRegistry::new();
        registry.register(named("busy").with_processing_priority(100));
        registry.register(named("override").with_override_priority(1));

        assert_eq!(resolve(&registry).as_deref(), Some("override"));
    }

    #[test]
    fn test_ties_resolve_to_first_registration() {
        let registry = HandlerRegistry::new();
        registry.register(named("first").with_processing_priority(5));
        registry.register(named("second").with_processing_priority(5));

        assert_eq!(resolve(&registry).as_deref(), Some("first"));
        let order: Vec<String> = registry
            .matching(&OrderPlaced.message_type(), None)
            .iter()
            .map(|entry| entry.name().to_string())
            .collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[test]
    fn test_no_match_is_not_an_error() {
        let registry = HandlerRegistry::new();
        assert!(resolve(&registry).is_none());
        assert!(!registry.can_handle(&OrderPlaced.message_type(), None));
    }

    #[test]
    fn test_envelope_rule_is_applied() {
        let registry = HandlerRegistry::new();
        registry.register(
            named("only-events").with_envelope(TypeMatcher::exact::<EventEnvelope>()),
        );

        let envelope_type = EventEnvelope::new(OrderPlaced).message_type();
        assert!(registry.can_handle(&OrderPlaced.message_type(), Some(&envelope_type)));
        assert!(!registry.can_handle(&OrderPlaced.message_type(), None));
    }

    #[test]
    fn test_wildcard_rule_skips_whole_envelopes() {
        let registry = HandlerRegistry::new();
        registry.register(HandlerRegistration::new(
            "catch-all",
            TypeMatcher::Any,
            Arc::new(FnHandler::<OrderPlaced, _>::new(
                |_: OrderPlaced, _: MessageContext| async { Reply::ready() },
            )),
        ));

        let brokered_type = BrokeredMessage::new(OrderPlaced).message_type();
        assert!(!registry.can_handle(&brokered_type, None));
        assert!(registry.can_handle(&OrderPlaced.message_type(), Some(&brokered_type)));
    }

    #[test]
    fn test_registration_after_snapshot_does_not_disturb_readers() {
        let registry = HandlerRegistry::new();
        registry.register(named("first"));
        let before = registry.snapshot();

        registry.register(named("second").with_override_priority(1));

        assert_eq!(before.len(), 1);
        assert_eq!(registry.len(), 2);
        assert_eq!(resolve(&registry).as_deref(), Some("second"));
    }
}
