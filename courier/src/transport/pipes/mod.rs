//! Named-pipe transport.
//!
//! Pipes are Unix domain sockets at `<runtime dir>/<namespace>/<server name>.pipe`.
//! Each instance runs a listener for its own pipe and opens outbound
//! connections to the peers it sends to.

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
pub use listener::{socket_is_alive, PipeListenerCounts, PipeListenerHandle, PipeListenerStats};
pub use peer_table::PeerTable;
pub use router::PipesRouter;

// --- Submodules ---

/// Accepts connections and forwards envelopes to the broker.
mod listener;
/// Known peers, replaced wholesale on announcements.
mod peer_table;
/// Length-prefixed frame format.
pub mod protocol;
/// The pipes router.
mod router;
