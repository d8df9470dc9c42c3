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

#![forbid(unsafe_code)]

//! Courier Macro Library
//!
//! Procedural macros for declaring Courier messages.
//!
//! ```ignore
//! // Fire-and-forget message handled in-process
//! #[courier_message]
//! pub struct Ping;
//!
//! // Event delivered to every interested handler
//! #[courier_message(event)]
//! pub struct OrderPlaced {
//!     pub order_id: u64,
//! }
//!
//! // Request/response pair that may cross a transport
//! #[courier_message(wire, response = PriceQuote)]
//! pub struct GetPrice {
//!     pub symbol: String,
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput, LitStr, Type};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name)
                    || meta
                        .path
                        .segments
                        .last()
                        .is_some_and(|segment| segment.ident == trait_name)
                {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Options accepted by `#[courier_message(...)]`.
#[derive(Default)]
struct MessageOptions {
    /// Declares the message as an event (`MessageKind::Event`).
    event: bool,
    /// Derives serde traits so the message can cross a transport.
    wire: bool,
    /// Response type for request/response messages.
    response: Option<Type>,
    /// Additional custom kinds.
    kinds: Vec<LitStr>,
}

/// Turns a struct or enum into a Courier message.
///
/// The macro:
/// - derives `Clone` and `Debug` when they are not already derived,
/// - implements `courier::Message`, reporting the declared kinds,
/// - with `event`, tags the message with `MessageKind::Event` so event
///   resolvers and `publish` pick it up,
/// - with `wire`, derives `serde::Serialize` and `serde::Deserialize`
///   (the message still has to be registered with the bus under a wire name),
/// - with `response = T`, implements `courier::Request` with `Response = T`,
/// - with `kind = "Name"` (repeatable), adds `MessageKind::Custom("Name")`.
///
/// # Example
///
/// ```ignore
/// #[courier_message(event, kind = "Audit")]
/// pub struct UserLoggedIn {
///     pub user: String,
/// }
/// ```
#[proc_macro_attribute]
pub fn courier_message(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut options = MessageOptions::default();
    let option_parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("event") {
            options.event = true;
            Ok(())
        } else if meta.path.is_ident("wire") {
            options.wire = true;
            Ok(())
        } else if meta.path.is_ident("response") {
            options.response = Some(meta.value()?.parse()?);
            Ok(())
        } else if meta.path.is_ident("kind") {
            options.kinds.push(meta.value()?.parse()?);
            Ok(())
        } else {
            Err(meta.error("unsupported courier_message option; expected `event`, `wire`, `response = Type` or `kind = \"Name\"`"))
        }
    });
    parse_macro_input!(attr with option_parser);

    let input = parse_macro_input!(item as DeriveInput);
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if options.wire {
            if !has_derive(&input, "Serialize") {
                traits.push(quote!(serde::Serialize));
            }
            if !has_derive(&input, "Deserialize") {
                traits.push(quote!(serde::Deserialize));
            }
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let mut kinds = Vec::new();
    if options.event {
        kinds.push(quote!(::courier::MessageKind::Event));
    }
    for kind in &options.kinds {
        kinds.push(quote!(::courier::MessageKind::Custom(#kind)));
    }

    let request_impl = options.response.as_ref().map(|response| {
        quote! {
            impl #impl_generics ::courier::Request for #name #ty_generics #where_clause {
                type Response = #response;
            }
        }
    });

    let expanded = quote! {
        #derives
        #input

        impl #impl_generics ::courier::Message for #name #ty_generics #where_clause {
            #[inline]
            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            #[inline]
            fn kinds(&self) -> &'static [::courier::MessageKind] {
                &[#(#kinds),*]
            }
        }

        #request_impl
    };

    TokenStream::from(expanded)
}
