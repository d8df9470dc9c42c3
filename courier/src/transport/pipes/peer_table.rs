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

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::message::{Endpoint, PeerInfo};

/// Known peers of the pipes transport, keyed by instance id.
///
/// The table is only ever replaced as a whole. Readers take a snapshot and
/// never observe a half-applied update.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: RwLock<Arc<HashMap<String, PeerInfo>>>,
}

impl PeerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every entry with `peers`.
    pub fn replace(&self, peers: impl IntoIterator<Item = PeerInfo>) {
        let next: HashMap<_, _> = peers
            .into_iter()
            .map(|peer| (peer.app_instance_id.clone(), peer))
            .collect();
        debug!(peers = next.len(), "Replacing peer table");
        *self.peers.write() = Arc::new(next);
    }

    /// The current entries.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<String, PeerInfo>> {
        self.peers.read().clone()
    }

    /// Looks up a peer by instance id.
    #[must_use]
    pub fn get(&self, app_instance_id: &str) -> Option<PeerInfo> {
        self.peers.read().get(app_instance_id).cloned()
    }

    /// Finds the peer serving `endpoint`.
    ///
    /// An instance-level endpoint matches that instance only. An app-level
    /// endpoint matches the instance of that app with the lowest instance id,
    /// so repeated lookups pick the same peer.
    #[must_use]
    pub fn find(&self, endpoint: &Endpoint) -> Option<PeerInfo> {
        let peers = self.snapshot();
        if let Some(instance) = endpoint.app_instance_id.as_deref() {
            return peers
                .get(instance)
                .filter(|peer| {
                    endpoint
                        .app_id
                        .as_deref()
                        .map_or(true, |app| app == peer.app_id)
                })
                .cloned();
        }
        let app = endpoint.app_id.as_deref()?;
        peers
            .values()
            .filter(|peer| peer.app_id == app)
            .min_by(|a, b| a.app_instance_id.cmp(&b.app_instance_id))
            .cloned()
    }

    /// Number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Returns `true` if no peer is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(app: &str, instance: &str) -> PeerInfo {
        PeerInfo::new(app, instance, format!("/tmp/courier/{instance}.pipe"))
    }

    #[test]
    fn test_replace_drops_missing_peers() {
        let table = PeerTable::new();
        table.replace([peer("a", "x"), peer("a", "y")]);
        table.replace([peer("a", "y"), peer("b", "z")]);

        let snapshot = table.snapshot();
        let mut instances: Vec<_> = snapshot.keys().cloned().collect();
        instances.sort();
        assert_eq!(instances, vec!["y".to_string(), "z".to_string()]);
        assert!(table.get("x").is_none());
    }

    #[test]
    fn test_snapshot_is_not_affected_by_replace() {
        let table = PeerTable::new();
        table.replace([peer("a", "x")]);
        let before = table.snapshot();

        table.replace(Vec::new());

        assert_eq!(before.len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn test_find_by_instance() {
        let table = PeerTable::new();
        table.replace([peer("a", "x"), peer("b", "y")]);

        assert_eq!(table.find(&Endpoint::instance("b", "y")), Some(peer("b", "y")));
        assert_eq!(table.find(&Endpoint::instance("a", "y")), None);
    }

    #[test]
    fn test_find_by_app_is_stable() {
        let table = PeerTable::new();
        table.replace([peer("a", "x2"), peer("a", "x1"), peer("b", "y")]);

        assert_eq!(table.find(&Endpoint::app("a")), Some(peer("a", "x1")));
        assert_eq!(table.find(&Endpoint::app("c")), None);
        assert_eq!(table.find(&Endpoint::default()), None);
    }
}
