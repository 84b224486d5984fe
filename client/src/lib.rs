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

//! # Remotix Control Client
//!
//! High-level client for the remotix control protocol with reconnection
//! support and pluggable host capabilities.
//!
//! ## Features
//!
//! - **Greeting Handshake** - Announces itself with a `CONNECT` frame on dial
//! - **Reconnection Support** - Automatic redial with configurable retry logic
//! - **Pluggable Capabilities** - Inbound `INJECT`/`EXECUTE`/`CMD` frames route
//!   to host-supplied [`Evaluator`] and [`CommandRunner`] implementations
//! - **File Transfer** - Chunked uploads and server-pushed downloads
//! - **Async-First** - Built on Tokio
//!
//! ## Quick Start
//!
//! ```no_run
//! use remotix_client::{ClientConfig, ControlClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("localhost", 6000)
//!         .with_greeting("agent-01")
//!         .with_auto_reconnect(true);
//!
//!     let client = Arc::new(ControlClient::new(config));
//!     client.connect().await?;
//!
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;

pub use client::{ClientState, ControlClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};

// Re-export the types callers need to drive a client
pub use remotix_codec::{Message, MessageKind};
pub use remotix_service::{CommandRunner, Evaluator, LogObserver, SessionObserver};
