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

use courier::prelude::*;

/// Request answered with a [`PriceQuote`].
#[courier_message(wire, response = PriceQuote)]
pub struct GetPrice {
    pub symbol: String,
}

#[courier_message(wire)]
#[derive(PartialEq)]
pub struct PriceQuote {
    pub symbol: String,
    pub price: f64,
}

/// Fire-and-forget notification.
#[courier_message(wire)]
pub struct Notify {
    pub text: String,
}

#[courier_message(event)]
pub struct OrderPlaced {
    pub order_id: u32,
}

#[courier_message]
pub struct Ping;

#[courier_message]
pub struct Explode;

/// Registers the wire types used across buses.
pub fn register_wire_types(builder: MessageBusBuilder) -> MessageBusBuilder {
    builder
        .wire_type::<GetPrice>("test.GetPrice")
        .wire_type::<PriceQuote>("test.PriceQuote")
        .wire_type::<Notify>("test.Notify")
}
