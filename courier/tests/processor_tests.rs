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

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use courier::common::{EnvelopeError, EventHandlerResolver};
use courier::prelude::*;
use courier_test::prelude::*;
use parking_lot::Mutex;

use crate::setup::initialize_tracing;
use crate::setup::messages::{GetPrice, OrderPlaced, Ping, PriceQuote};

mod setup;

fn quote_handler(price: f64) -> HandlerRegistration {
    HandlerRegistration::for_message::<GetPrice, _, _>(move |request, _ctx| async move {
        Reply::ok(PriceQuote {
            symbol: request.symbol,
            price,
        })
    })
}

fn processor_with(registry: HandlerRegistry) -> MessageProcessor {
    MessageProcessor::with_resolver(Arc::new(registry))
}

#[courier_test]
async fn test_request_returns_typed_response() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = HandlerRegistry::new();
    registry.register(quote_handler(42.0));
    let processor = processor_with(registry);

    let quote = processor
        .request(
            GetPrice {
                symbol: "ACME".to_string(),
            },
            MessageContext::new(),
            &CancellationToken::new(),
        )
        .await?;

    assert_eq!(
        quote,
        PriceQuote {
            symbol: "ACME".to_string(),
            price: 42.0
        }
    );
    Ok(())
}

#[courier_test]
async fn test_missing_handler_is_handler_not_found() -> anyhow::Result<()> {
    initialize_tracing();
    let processor = processor_with(HandlerRegistry::new());

    let result = processor
        .process(&Ping, MessageContext::new(), &CancellationToken::new())
        .await;

    let Err(MessagingError::HandlerNotFound { message_type }) = result else {
        panic!("expected HandlerNotFound, got {result:?}");
    };
    assert!(message_type.ends_with("Ping"));
    Ok(())
}

#[courier_test]
async fn test_handler_error_is_wrapped_with_context() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = HandlerRegistry::new();
    registry.register(
        HandlerRegistration::for_message::<GetPrice, _, _>(|request, _ctx| async move {
            Err::<Reply, _>(anyhow::anyhow!("{} is out of stock", request.symbol))
        })
        .named("stock-check"),
    );
    let processor = processor_with(registry);

    let correlation_id = MessageId::from("msg_42");
    let result = processor
        .process(
            &GetPrice {
                symbol: "ACME".to_string(),
            },
            MessageContext::new().with_correlation_id(correlation_id.clone()),
            &CancellationToken::new(),
        )
        .await;

    let Err(error @ MessagingError::Processing { .. }) = result else {
        panic!("expected Processing, got {result:?}");
    };
    assert_eq!(error.code(), "PROCESSING_ERROR");
    let MessagingError::Processing {
        handler,
        correlation_id: carried,
        source,
        ..
    } = error
    else {
        unreachable!();
    };
    assert_eq!(handler, "stock-check");
    assert_eq!(carried, Some(correlation_id));
    assert_eq!(source.to_string(), "ACME is out of stock");
    Ok(())
}

#[courier_test]
async fn test_override_priority_wins() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = HandlerRegistry::new();
    registry.register(quote_handler(1.0).named("ha"));
    registry.register(quote_handler(2.0).named("hb").with_override_priority(10));
    registry.register(quote_handler(3.0).named("hc").with_processing_priority(100));
    let processor = processor_with(registry);

    let quote = processor
        .request(
            GetPrice {
                symbol: "ACME".to_string(),
            },
            MessageContext::new(),
            &CancellationToken::new(),
        )
        .await?;

    assert!((quote.price - 2.0).abs() < f64::EPSILON);
    Ok(())
}

#[courier_test]
async fn test_envelope_rules_select_handler() -> anyhow::Result<()> {
    initialize_tracing();
    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    let registry = HandlerRegistry::new();

    let wrapped = seen.clone();
    registry.register(
        HandlerRegistration::for_message::<OrderPlaced, _, _>(move |order, ctx| {
            let envelope = ctx.envelope_type().map(|t| t.name.to_string());
            wrapped.lock().push(format!("wrapped {} in {envelope:?}", order.order_id));
            async { Reply::ready() }
        })
        .with_envelope(TypeMatcher::exact::<EventEnvelope>()),
    );
    let bare = seen.clone();
    registry.register(
        HandlerRegistration::for_message::<OrderPlaced, _, _>(move |order, _ctx| {
            bare.lock().push(format!("bare {}", order.order_id));
            async { Reply::ready() }
        })
        .with_envelope(TypeMatcher::Unwrapped),
    );
    let processor = processor_with(registry);
    let cancel = CancellationToken::new();

    processor
        .process(&EventEnvelope::new(OrderPlaced { order_id: 1 }), MessageContext::new(), &cancel)
        .await?;
    processor
        .process(&OrderPlaced { order_id: 2 }, MessageContext::new(), &cancel)
        .await?;

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].starts_with("wrapped 1 in Some("));
    assert!(seen[0].contains("EventEnvelope"));
    assert_eq!(seen[1], "bare 2");
    Ok(())
}

#[courier_test]
async fn test_empty_envelope_is_an_envelope_error() -> anyhow::Result<()> {
    initialize_tracing();
    let processor = processor_with(HandlerRegistry::new());

    let result = processor
        .process(&EventEnvelope::empty(), MessageContext::new(), &CancellationToken::new())
        .await;

    assert!(matches!(
        result,
        Err(MessagingError::Envelope(EnvelopeError::MissingContent))
    ));
    Ok(())
}

#[courier_test]
async fn test_publish_reaches_every_subscriber() -> anyhow::Result<()> {
    initialize_tracing();
    let received: Arc<Mutex<Vec<&'static str>>> = Arc::default();
    let events = EventHandlerResolver::new();
    for name in ["audit", "billing"] {
        let received = received.clone();
        events.subscribe(HandlerRegistration::for_message::<OrderPlaced, _, _>(
            move |_order, _ctx| {
                received.lock().push(name);
                async { Reply::ready() }
            },
        ));
    }
    let processor = MessageProcessor::with_resolver(Arc::new(events));
    let cancel = CancellationToken::new();

    let direct = processor
        .publish(&OrderPlaced { order_id: 7 }, MessageContext::new(), &cancel)
        .await?;
    let wrapped = processor
        .publish(
            &EventEnvelope::new(OrderPlaced { order_id: 8 }),
            MessageContext::new(),
            &cancel,
        )
        .await?;

    assert_eq!(direct, 2);
    assert_eq!(wrapped, 2);
    assert_eq!(*received.lock(), vec!["audit", "billing", "audit", "billing"]);
    Ok(())
}

#[courier_test]
async fn test_publish_without_subscribers_is_not_an_error() -> anyhow::Result<()> {
    initialize_tracing();
    let processor = MessageProcessor::with_resolver(Arc::new(EventHandlerResolver::new()));

    let invoked = processor
        .publish(&OrderPlaced { order_id: 1 }, MessageContext::new(), &CancellationToken::new())
        .await?;

    assert_eq!(invoked, 0);
    Ok(())
}

#[courier_test]
async fn test_cancelled_processing() -> anyhow::Result<()> {
    initialize_tracing();
    let registry = HandlerRegistry::new();
    registry.register(HandlerRegistration::for_message::<Ping, _, _>(|_, _ctx| async move {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Reply::ready()
    }));
    let processor = processor_with(registry);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });
    let result = processor.process(&Ping, MessageContext::new(), &cancel).await;

    assert!(matches!(result, Err(MessagingError::Cancelled)));
    Ok(())
}
