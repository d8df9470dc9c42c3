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

//! Attribute macro backing `#[courier_test]`.

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn, ReturnType};

/// Runs an `async fn` test on a fresh multi-threaded Tokio runtime.
///
/// Panics raised anywhere in the runtime (including spawned router and
/// receive-loop tasks) are recorded through a panic hook, logged through
/// `tracing`, and re-raised on the test thread once the test body finishes,
/// so a failure inside a background task still fails the test.
///
/// The test body runs inside a `courier_test` span carrying the test name.
/// A test returning `Result` fails when it yields `Err`.
#[proc_macro_attribute]
pub fn courier_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let inputs = &sig.inputs;
    let output = &sig.output;

    let body_name = syn::Ident::new(&format!("__{name}_body"), name.span());

    let finish = match output {
        ReturnType::Default => quote! { let () = outcome; },
        ReturnType::Type(..) => quote! {
            if let Err(err) = outcome {
                panic!("test {} returned an error: {:?}", stringify!(#name), err);
            }
        },
    };

    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() {
            use std::sync::atomic::{AtomicBool, Ordering};
            use std::sync::Arc;

            #[derive(Default)]
            struct CapturedPanic {
                occurred: AtomicBool,
                message: parking_lot::Mutex<Option<String>>,
                location: parking_lot::Mutex<Option<String>>,
            }

            let captured = Arc::new(CapturedPanic::default());
            let hook_capture = Arc::clone(&captured);

            let previous_hook = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                hook_capture.occurred.store(true, Ordering::SeqCst);
                let message = info
                    .payload()
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| info.payload().downcast_ref::<String>().cloned());
                *hook_capture.location.lock() =
                    info.location().map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                tracing::error!(
                    panic = %message.as_deref().unwrap_or("no panic message").trim().replace('\n', " "),
                    "panic captured during courier test"
                );
                *hook_capture.message.lock() = message;
                previous_hook(info);
            }));

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .expect("failed to build the courier test runtime");

            let outcome = runtime.block_on(async {
                let span = tracing::info_span!("courier_test", name = stringify!(#name));
                let _entered = span.enter();
                #body_name().await
            });
            runtime.shutdown_timeout(std::time::Duration::from_secs(1));

            if captured.occurred.load(Ordering::SeqCst) {
                let message = captured
                    .message
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "no panic message".to_string());
                let location = captured
                    .location
                    .lock()
                    .clone()
                    .unwrap_or_else(|| "unknown location".to_string());
                panic!("panic at {}: {}", location, message.trim().replace('\n', " "));
            }

            #finish
        }

        async fn #body_name(#inputs) #output #body
    };

    expanded.into()
}
