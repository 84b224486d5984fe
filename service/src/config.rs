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

//! Server configuration types and builders

use remotix_codec::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FRAME_SIZE};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Control server configuration
///
/// # Examples
///
/// ```
/// use remotix_service::ServerConfig;
///
/// let config = ServerConfig::new("127.0.0.1:6000".parse().unwrap())
///     .with_max_connections(32)
///     .with_download_dir("Downloads")
///     .with_echo_back(true);
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the listener to
    pub bind_address: SocketAddr,

    /// Maximum number of concurrently registered connections; further
    /// accepts are closed immediately
    pub max_connections: usize,

    /// Root directory for received files; each client gets a subdirectory
    /// keyed by its peer address
    pub download_dir: PathBuf,

    /// Size of a single file-transfer chunk in bytes
    pub chunk_size: usize,

    /// Maximum accepted frame size (tag plus payload) in bytes
    pub max_frame_size: usize,

    /// Echo `ECHO` payloads back to the sending client
    pub echo_back: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:6000".parse().expect("valid default address"),
            max_connections: 64,
            download_dir: PathBuf::from("Downloads"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            echo_back: false,
        }
    }
}

impl ServerConfig {
    /// Create a configuration bound to the given address
    pub fn new(bind_address: SocketAddr) -> Self {
        Self {
            bind_address,
            ..Default::default()
        }
    }

    /// Set the maximum number of concurrent connections
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the root directory for received files
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set the file-transfer chunk size
    ///
    /// The maximum frame size is raised along with it when needed so chunks
    /// always fit in a single frame.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        if self.max_frame_size < size + 1 {
            self.max_frame_size = size + 1024;
        }
        self
    }

    /// Set the maximum accepted frame size
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Enable or disable echoing `ECHO` payloads back to the sender
    pub fn with_echo_back(mut self, enabled: bool) -> Self {
        self.echo_back = enabled;
        self
    }
}
