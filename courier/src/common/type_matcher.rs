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

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use crate::traits::{Message, MessageKind, MessageType};

type TypePredicate = Arc<dyn Fn(Option<&MessageType>) -> bool + Send + Sync>;

/// A rule matching one half (message or envelope) of a handler lookup key.
///
/// The envelope half is `None` when the message was not wrapped.
#[derive(Clone)]
pub enum TypeMatcher {
    /// Matches every type, including the absence of an envelope.
    Any,
    /// Matches exactly one concrete type.
    Exact {
        /// The concrete type id.
        id: TypeId,
        /// Type name, for diagnostics.
        name: &'static str,
    },
    /// Matches every type declared with the kind (assignable-from matching).
    Kind(MessageKind),
    /// Matches only when there is no envelope.
    Unwrapped,
    /// Custom rule.
    Predicate(TypePredicate),
}

impl TypeMatcher {
    /// Matches exactly the type `M`.
    #[must_use]
    pub fn exact<M: Message>() -> Self {
        Self::Exact {
            id: TypeId::of::<M>(),
            name: std::any::type_name::<M>(),
        }
    }

    /// Matches with a custom predicate.
    #[must_use]
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(Option<&MessageType>) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Applies the rule.
    #[must_use]
    pub fn matches(&self, message_type: Option<&MessageType>) -> bool {
        match self {
            Self::Any => true,
            Self::Exact { id, .. } => message_type.is_some_and(|t| t.id == *id),
            Self::Kind(kind) => message_type.is_some_and(|t| t.is(*kind)),
            Self::Unwrapped => message_type.is_none(),
            Self::Predicate(predicate) => predicate(message_type),
        }
    }
}

impl fmt::Debug for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "Any"),
            Self::Exact { name, .. } => write!(f, "Exact({name})"),
            Self::Kind(kind) => write!(f, "Kind({kind:?})"),
            Self::Unwrapped => write!(f, "Unwrapped"),
            Self::Predicate(_) => write!(f, "Predicate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct OrderPlaced;

    impl Message for OrderPlaced {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn kinds(&self) -> &'static [MessageKind] {
            &[MessageKind::Event, MessageKind::Custom("Order")]
        }
    }

    #[derive(Clone, Debug)]
    struct Ping;

    impl Message for Ping {
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    #[test]
    fn test_exact_matches_only_its_type() {
        let matcher = TypeMatcher::exact::<OrderPlaced>();
        assert!(matcher.matches(Some(&OrderPlaced.message_type())));
        assert!(!matcher.matches(Some(&Ping.message_type())));
        assert!(!matcher.matches(None));
    }

    #[test]
    fn test_kind_matches_declared_kinds() {
        assert!(TypeMatcher::Kind(MessageKind::Event).matches(Some(&OrderPlaced.message_type())));
        assert!(TypeMatcher::Kind(MessageKind::Custom("Order")).matches(Some(&OrderPlaced.message_type())));
        assert!(!TypeMatcher::Kind(MessageKind::Event).matches(Some(&Ping.message_type())));
    }

    #[test]
    fn test_unwrapped_and_any() {
        assert!(TypeMatcher::Unwrapped.matches(None));
        assert!(!TypeMatcher::Unwrapped.matches(Some(&Ping.message_type())));
        assert!(TypeMatcher::Any.matches(None));
        assert!(TypeMatcher::Any.matches(Some(&Ping.message_type())));
    }

    #[test]
    fn test_predicate_sees_the_type() {
        let matcher = TypeMatcher::predicate(|t| t.is_some_and(|t| t.name.ends_with("Ping")));
        assert!(matcher.matches(Some(&Ping.message_type())));
        assert!(!matcher.matches(Some(&OrderPlaced.message_type())));
    }
}
