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

//! Client configuration

use remotix_codec::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FRAME_SIZE};
use std::path::PathBuf;
use std::time::Duration;

/// Control client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server hostname or IP address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Enable automatic reconnection after a lost connection
    pub auto_reconnect: bool,

    /// Delay before each reconnection attempt
    pub reconnect_delay: Duration,

    /// Maximum number of reconnection attempts (None for unlimited)
    pub max_reconnect_attempts: Option<usize>,

    /// Text sent in the `CONNECT` greeting after the socket opens
    pub greeting: Option<String>,

    /// Root directory for files the server pushes down
    pub download_root: PathBuf,

    /// Size of a single file-transfer chunk in bytes
    pub chunk_size: usize,

    /// Maximum accepted frame size (tag plus payload) in bytes
    pub max_frame_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6000,
            connect_timeout: Duration::from_secs(10),
            auto_reconnect: false,
            reconnect_delay: Duration::from_secs(5),
            max_reconnect_attempts: Some(3),
            greeting: None,
            download_root: PathBuf::from("Downloads"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl ClientConfig {
    /// Create a new client configuration with the given host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable automatic reconnection
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the reconnection delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the maximum reconnection attempts
    pub fn with_max_reconnect_attempts(mut self, max: Option<usize>) -> Self {
        self.max_reconnect_attempts = max;
        self
    }

    /// Set the greeting text sent after the socket opens
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.greeting = Some(greeting.into());
        self
    }

    /// Set the root directory for files the server pushes down
    pub fn with_download_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.download_root = root.into();
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

    /// Get the server address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.port, 6000);
        assert!(!config.auto_reconnect);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_builder_chain() {
        let config = ClientConfig::new("10.0.0.5", 7000)
            .with_auto_reconnect(true)
            .with_greeting("build-agent-01")
            .with_max_reconnect_attempts(None);

        assert_eq!(config.address(), "10.0.0.5:7000");
        assert!(config.auto_reconnect);
        assert_eq!(config.greeting.as_deref(), Some("build-agent-01"));
        assert!(config.max_reconnect_attempts.is_none());
    }

    #[test]
    fn test_chunk_size_raises_frame_limit() {
        let config = ClientConfig::default()
            .with_max_frame_size(64)
            .with_chunk_size(2048);
        assert!(config.max_frame_size > 2048);
    }
}
