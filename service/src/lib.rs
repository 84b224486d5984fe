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

//! Session management and transport for the remotix control protocol
//!
//! This crate builds the server side of the protocol on top of
//! [`remotix_codec`]: connection lifecycle, the shared client registry,
//! message dispatch, chunked file transfer, and the listening
//! [`ControlServer`] itself.
//!
//! # Architecture
//!
//! ```text
//! ControlServer ── accept loop ──► Connection (framed TCP stream)
//!       │                              │
//!       ├─► ClientRegistry ◄── register/unregister
//!       │                              │
//!       └─► Dispatcher ◄── SessionWorker (one receive loop per client)
//!               │
//!               ├─► SessionObserver (presentation fan-out)
//!               ├─► Evaluator / CommandRunner (host capabilities)
//!               └─► transfer (chunked file send/receive)
//! ```
//!
//! The server never renders or evaluates anything itself; those concerns
//! plug in through the traits in [`handler`].

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod transfer;
pub mod types;
pub mod worker;

pub use self::config::ServerConfig;
pub use self::connection::Connection;
pub use self::dispatch::{DestinationPolicy, DispatchOutcome, Dispatcher, Session};
pub use self::error::{Result, ServiceError};
pub use self::handler::{CommandRunner, Evaluator, LogObserver, SessionObserver};
pub use self::metrics::{MetricsSnapshot, ServerMetrics};
pub use self::registry::{BroadcastResult, ClientRegistry};
pub use self::server::ControlServer;
pub use self::transfer::FileReceiver;
pub use self::types::{ConnectionState, ServerState};
pub use self::worker::SessionWorker;
