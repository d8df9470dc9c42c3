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

#[cfg(unix)]
use courier::common::PipesConfig;
use courier::prelude::*;
use courier_test::prelude::*;
use tokio::sync::mpsc;

use crate::setup::initialize_tracing;
use crate::setup::messages::{register_wire_types, GetPrice, Notify, PriceQuote};

mod setup;

const TRANSPORT_PRIORITY: i32 = 10;

fn get_price() -> GetPrice {
    GetPrice {
        symbol: "ACME".to_string(),
    }
}

fn pricing_builder(identity: AppIdentity) -> MessageBusBuilder {
    register_wire_types(MessageBus::builder(identity)).on::<GetPrice, _, _>(|request, _ctx| async move {
        Reply::ok(PriceQuote {
            symbol: request.symbol,
            price: 42.5,
        })
    })
}

#[courier_test]
async fn test_local_request() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = pricing_builder(AppIdentity::new("pricing", "p-1")).start().await;

    let quote = bus.request(get_price()).await?;

    assert_eq!(quote.price, 42.5);
    bus.shutdown().await;
    Ok(())
}

#[courier_test]
async fn test_brokered_message_routes_to_local_handler() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = pricing_builder(AppIdentity::new("pricing", "p-1")).start().await;

    let message = BrokeredMessage::new(get_price()).to(Endpoint::app("pricing"));
    let reply = bus.process(&message).await?;

    assert_eq!(reply.downcast::<PriceQuote>().map(|quote| quote.price), Some(42.5));
    bus.shutdown().await;
    Ok(())
}

#[courier_test]
async fn test_request_across_pub_sub() -> anyhow::Result<()> {
    initialize_tracing();
    let hub = Arc::new(InMemoryPubSub::new());
    let (notices, mut received) = mpsc::unbounded_channel();

    let pricing = pricing_builder(AppIdentity::new("pricing", "p-1"))
        .on::<Notify, _, _>(move |notice, _ctx| {
            let notices = notices.clone();
            async move {
                notices.send(notice.text)?;
                Reply::ready()
            }
        })
        .router(Arc::new(RedisRouter::new(hub.clone())), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;
    let billing = register_wire_types(MessageBus::builder(AppIdentity::new("billing", "b-1")))
        .router(Arc::new(RedisRouter::new(hub.clone())), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;

    let quote = billing.request_from(Endpoint::app("pricing"), get_price()).await?;
    assert_eq!(quote.price, 42.5);
    assert!(billing.broker().pending().is_empty());

    billing
        .post_to(
            Endpoint::instance("pricing", "p-1"),
            Notify {
                text: "hello".to_string(),
            },
        )
        .await?;
    let text = tokio::time::timeout(Duration::from_secs(5), received.recv()).await?;
    assert_eq!(text.as_deref(), Some("hello"));

    billing.shutdown().await;
    pricing.shutdown().await;
    Ok(())
}

#[courier_test]
async fn test_remote_failure_returns_fault() -> anyhow::Result<()> {
    initialize_tracing();
    let hub = Arc::new(InMemoryPubSub::new());

    // no GetPrice handler on the receiving side
    let inventory = register_wire_types(MessageBus::builder(AppIdentity::new("inventory", "i-1")))
        .router(Arc::new(RedisRouter::new(hub.clone())), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;
    let billing = register_wire_types(MessageBus::builder(AppIdentity::new("billing", "b-1")))
        .router(Arc::new(RedisRouter::new(hub.clone())), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;

    let result = billing.request_from(Endpoint::app("inventory"), get_price()).await;

    let Err(MessagingError::Remote(fault)) = result else {
        panic!("expected a remote fault, got {result:?}");
    };
    assert_eq!(fault.code, "HANDLER_NOT_FOUND");

    billing.shutdown().await;
    inventory.shutdown().await;
    Ok(())
}

#[courier_message]
struct LocalOnlyQuote;

#[courier_test]
async fn test_unsendable_reply_returns_fault() -> anyhow::Result<()> {
    initialize_tracing();
    let hub = Arc::new(InMemoryPubSub::new());

    let catalog = register_wire_types(MessageBus::builder(AppIdentity::new("catalog", "c-1")))
        .on::<GetPrice, _, _>(|_request, _ctx| async { Reply::ok(LocalOnlyQuote) })
        .router(Arc::new(RedisRouter::new(hub.clone())), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;
    let billing = register_wire_types(MessageBus::builder(AppIdentity::new("billing", "b-1")))
        .router(Arc::new(RedisRouter::new(hub.clone())), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;

    let request = BrokeredMessage::new(get_price())
        .to(Endpoint::app("catalog"))
        .with_timeout(Duration::from_secs(30));
    let result = tokio::time::timeout(Duration::from_secs(5), billing.dispatch(request)).await?;

    assert!(matches!(result, Err(MessagingError::Remote(_))), "got {result:?}");
    assert!(billing.broker().pending().is_empty());

    billing.shutdown().await;
    catalog.shutdown().await;
    Ok(())
}

#[courier_test]
async fn test_request_across_queues() -> anyhow::Result<()> {
    initialize_tracing();
    let queues = Arc::new(InMemoryQueues::new());

    let pricing = pricing_builder(AppIdentity::new("pricing", "p-1"))
        .router(
            Arc::new(ServiceBusRouter::new(queues.clone())),
            TRANSPORT_PRIORITY,
            RecipientMatch::Any,
        )
        .start()
        .await;
    let billing = register_wire_types(MessageBus::builder(AppIdentity::new("billing", "b-1")))
        .router(
            Arc::new(ServiceBusRouter::new(queues.clone())),
            TRANSPORT_PRIORITY,
            RecipientMatch::Any,
        )
        .start()
        .await;

    let quote = billing.request_from(Endpoint::app("pricing"), get_price()).await?;

    assert_eq!(quote.price, 42.5);
    billing.shutdown().await;
    pricing.shutdown().await;
    Ok(())
}

#[cfg(unix)]
#[courier_test]
async fn test_request_across_pipes() -> anyhow::Result<()> {
    initialize_tracing();
    let runtime = tempfile::tempdir()?;
    let mut config = PipesConfig::default();
    config.runtime_dir = Some(runtime.path().to_path_buf());

    let pricing_pipes = Arc::new(PipesRouter::new(config.clone()));
    let billing_pipes = Arc::new(PipesRouter::new(config));
    let pricing = pricing_builder(AppIdentity::new("pricing", "p-1"))
        .router(pricing_pipes.clone(), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;
    let billing = register_wire_types(MessageBus::builder(AppIdentity::new("billing", "b-1")))
        .router(billing_pipes.clone(), TRANSPORT_PRIORITY, RecipientMatch::Any)
        .start()
        .await;

    let peers = vec![
        billing_pipes.local_peer().ok_or_else(|| anyhow::anyhow!("billing pipes not started"))?,
        pricing_pipes.local_peer().ok_or_else(|| anyhow::anyhow!("pricing pipes not started"))?,
    ];
    assert_eq!(billing_pipes.announce_peers(peers).await?, 1);
    tokio::time::timeout(Duration::from_secs(5), async {
        while pricing_pipes.peers().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;

    let quote = billing.request_from(Endpoint::app("pricing"), get_price()).await?;

    assert_eq!(quote.price, 42.5);
    billing.shutdown().await;
    pricing.shutdown().await;
    Ok(())
}

#[courier_test]
async fn test_configured_bus_takes_identity_from_app_section() -> anyhow::Result<()> {
    initialize_tracing();
    let config = CourierConfig::from_toml(
        r#"
        [app]
        app_id = "pricing"
        app_instance_id = "pricing-7"
        "#,
    )?;

    let bus = MessageBus::configured(config).start().await;

    assert_eq!(bus.identity(), &AppIdentity::new("pricing", "pricing-7"));
    bus.shutdown().await;
    Ok(())
}

#[courier_test]
async fn test_shutdown_cancels_requests() -> anyhow::Result<()> {
    initialize_tracing();
    let bus = pricing_builder(AppIdentity::new("pricing", "p-1")).start().await;

    bus.shutdown().await;

    assert!(bus.is_shut_down());
    assert!(matches!(bus.request(get_price()).await, Err(MessagingError::Cancelled)));
    Ok(())
}
