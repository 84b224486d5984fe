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

//! Observer traits and capability seams for the session layer
//!
//! The transport core never renders, evaluates, or spawns anything itself.
//! Presentation layers subscribe through [`SessionObserver`]; the dynamic
//! code-evaluation and command-execution facilities plug in through
//! [`Evaluator`] and [`CommandRunner`]. The dispatcher only marshals bytes
//! to and from these seams.

use async_trait::async_trait;
use remotix_codec::Message;
use std::net::SocketAddr;
use std::path::Path;
use tracing::{error, info};

/// Session event subscriber
///
/// All methods are async and default to no-ops; implement the ones you care
/// about. The dispatcher fans every event out to all registered observers,
/// and core logic never depends on which subscribers exist.
#[async_trait]
pub trait SessionObserver: Send + Sync + 'static {
    /// Called when a new connection has been registered
    async fn on_connect(&self, _peer: SocketAddr) {}

    /// Called exactly once when a connection is torn down
    async fn on_disconnect(&self, _peer: SocketAddr) {}

    /// Called for every routed inbound message
    async fn on_message(&self, _peer: SocketAddr, _msg: &Message) {}

    /// Called when a peer reports an error or a handler fails
    async fn on_error(&self, _peer: SocketAddr, _error: &str) {}

    /// Called when a file transfer completes on the receiving side
    async fn on_file_received(&self, _peer: SocketAddr, _path: &Path, _bytes: u64) {}
}

/// Host-supplied code-evaluation capability
///
/// `inject` stores (and typically runs) the payload; `execute` runs the
/// previously injected payload. Both return the textual result or an error
/// text that is relayed to the peer as an `ERROR` message. The transport
/// never interprets the code itself.
#[async_trait]
pub trait Evaluator: Send + Sync + 'static {
    /// Store and evaluate the given code bytes
    async fn inject(&self, code: &[u8]) -> std::result::Result<String, String>;

    /// Execute the previously injected payload
    async fn execute(&self) -> std::result::Result<String, String>;
}

/// Host-supplied command-execution capability
///
/// Runs one command line in the given working directory and returns its
/// textual output. `cd` lines never reach this trait; the dispatcher
/// handles them by mutating the session's recorded working directory.
#[async_trait]
pub trait CommandRunner: Send + Sync + 'static {
    /// Run a command line inside `cwd`
    async fn run(&self, command: &str, cwd: &Path) -> std::result::Result<String, String>;
}

/// Observer that writes every event through `tracing`
///
/// The default subscriber wired into demo binaries; applications replace or
/// accompany it with their own presentation layer.
#[derive(Debug, Default)]
pub struct LogObserver;

impl LogObserver {
    /// Create a new logging observer
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionObserver for LogObserver {
    async fn on_connect(&self, peer: SocketAddr) {
        info!(%peer, "client connected");
    }

    async fn on_disconnect(&self, peer: SocketAddr) {
        info!(%peer, "client disconnected");
    }

    async fn on_message(&self, peer: SocketAddr, msg: &Message) {
        info!(%peer, kind = %msg.kind, "{}", msg.payload_text());
    }

    async fn on_error(&self, peer: SocketAddr, error: &str) {
        error!(%peer, "{error}");
    }

    async fn on_file_received(&self, peer: SocketAddr, path: &Path, bytes: u64) {
        info!(%peer, path = %path.display(), bytes, "file received");
    }
}
