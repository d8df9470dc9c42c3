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

use courier_macro::courier_message;
use serde::{Deserialize, Serialize};

use crate::message::Endpoint;

/// A live remote application instance reachable over the pipes transport.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Application name of the peer.
    pub app_id: String,
    /// Instance id of the peer.
    pub app_instance_id: String,
    /// Pipe address (socket path) the peer listens on.
    pub address: String,
}

impl PeerInfo {
    /// Creates a peer entry.
    #[must_use]
    pub fn new(
        app_id: impl Into<String>,
        app_instance_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_instance_id: app_instance_id.into(),
            address: address.into(),
        }
    }

    /// The endpoint addressing this peer instance.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::instance(self.app_id.clone(), self.app_instance_id.clone())
    }
}

/// Broadcast carrying the complete list of live peers.
///
/// Receivers replace their peer table with `peers`; entries absent from the
/// latest broadcast are gone.
#[courier_message(wire, event)]
pub struct PeersChangedMessage {
    /// Every live peer, including the sender.
    pub peers: Vec<PeerInfo>,
}

impl PeersChangedMessage {
    /// Registered wire name.
    pub const WIRE_NAME: &'static str = "courier.PeersChanged";
}
