//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Shared registry of live client connections
//!
//! The registry is the single source of truth for "who is currently
//! connected". One coarse mutex guards the whole map: registration,
//! removal, lookup, iteration, and the send attempts inside a broadcast all
//! run in the same critical section, so no caller ever acts on a partial
//! view. The lock is never held across a blocking receive.

use crate::{Connection, Result, ServiceError};
use metrics::gauge;
use remotix_codec::Message;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Result of a broadcast operation
#[derive(Debug, Clone, Default)]
pub struct BroadcastResult {
    /// Total number of connections attempted
    pub total: usize,
    /// Number of successful sends
    pub succeeded: usize,
    /// Number of failed sends
    pub failed: usize,
    /// Per-peer failures (address and error text)
    pub errors: Vec<(SocketAddr, String)>,
}

impl BroadcastResult {
    /// Check if all sends succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    /// Get the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }
}

/// Mutex-guarded mapping from peer address to live connection
#[derive(Debug, Default)]
pub struct ClientRegistry {
    connections: Mutex<HashMap<SocketAddr, Arc<Connection>>>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection under its peer address
    ///
    /// A stale prior entry for the same address is overwritten and closed;
    /// addresses are only reused by the network once the old connection is
    /// gone.
    pub async fn register(&self, connection: Arc<Connection>) {
        let addr = connection.peer_addr();
        let stale = {
            let mut connections = self.connections.lock().await;
            let stale = connections.insert(addr, connection);
            gauge!("remotix.registry.size").set(connections.len() as f64);
            stale
        };
        if let Some(stale) = stale {
            debug!(peer = %addr, "overwriting stale registry entry");
            stale.close().await;
        }
    }

    /// Remove a connection if present
    ///
    /// Tolerates double removal from overlapping teardown paths; returns
    /// the connection when one was actually removed.
    pub async fn unregister(&self, addr: SocketAddr) -> Option<Arc<Connection>> {
        let mut connections = self.connections.lock().await;
        let removed = connections.remove(&addr);
        gauge!("remotix.registry.size").set(connections.len() as f64);
        removed
    }

    /// Look up a connection by peer address
    pub async fn get(&self, addr: SocketAddr) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(&addr).cloned()
    }

    /// Send a message to one registered client
    ///
    /// Reports [`ServiceError::ClientNotFound`] when the address is absent
    /// or the connection is no longer live, rather than panicking.
    pub async fn send_to(&self, addr: SocketAddr, msg: Message) -> Result<()> {
        let connection = {
            let connections = self.connections.lock().await;
            connections
                .get(&addr)
                .filter(|c| c.is_connected())
                .cloned()
                .ok_or(ServiceError::ClientNotFound(addr))?
        };
        connection.send(msg).await
    }

    /// Send the same message to every currently connected client
    ///
    /// Iterates under the registry lock so the set of recipients is a
    /// consistent snapshot; entries that are not connected are skipped, and
    /// a failure on one client is recorded without aborting the sweep.
    pub async fn broadcast(&self, msg: Message) -> BroadcastResult {
        let mut result = BroadcastResult::default();
        let connections = self.connections.lock().await;

        for (addr, connection) in connections.iter() {
            if !connection.is_connected() {
                continue;
            }
            result.total += 1;
            match connection.send(msg.clone()).await {
                Ok(()) => result.succeeded += 1,
                Err(e) => {
                    warn!(peer = %addr, error = %e, "broadcast send failed");
                    result.failed += 1;
                    result.errors.push((*addr, e.to_string()));
                }
            }
        }

        result
    }

    /// Close every live connection and clear the map
    ///
    /// Runs as one critical section, so a concurrent [`register`] lands
    /// either entirely before (and its connection is closed here) or
    /// entirely after (and is untouched) — never half-way.
    ///
    /// [`register`]: ClientRegistry::register
    pub async fn close_all(&self) {
        let mut connections = self.connections.lock().await;
        for connection in connections.values() {
            connection.close().await;
        }
        connections.clear();
        gauge!("remotix.registry.size").set(0.0);
        debug!("all clients disconnected");
    }

    /// Number of registered connections
    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    /// Check if the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Check if an address is registered
    pub async fn contains(&self, addr: SocketAddr) -> bool {
        self.connections.lock().await.contains_key(&addr)
    }

    /// Snapshot of all registered peer addresses
    pub async fn peers(&self) -> Vec<SocketAddr> {
        self.connections.lock().await.keys().copied().collect()
    }
}
