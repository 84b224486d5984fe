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

//! Demo Control Server
//!
//! This example demonstrates a basic control server that:
//! - Accepts connections on port 6000
//! - Logs every session event through `tracing`
//! - Echoes `ECHO` payloads back to the sender
//! - Lands uploaded files under `Downloads/<peer-address>/`
//!
//! ## Usage
//!
//! Run the server:
//! ```bash
//! cargo run --example demo_server
//! ```
//!
//! Then run the matching client:
//! ```bash
//! cargo run --example demo_client
//! ```

use remotix_service::{ControlServer, LogObserver, ServerConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    println!("Starting remotix control server on 127.0.0.1:6000");
    println!("Press Ctrl+C to stop the server\n");

    // Configure the server
    let config = ServerConfig::new("127.0.0.1:6000".parse()?)
        .with_max_connections(100)
        .with_download_dir("Downloads")
        .with_echo_back(true);

    // Create and start the server
    let server = ControlServer::new(config).with_observer(Arc::new(LogObserver::new()));
    server.start().await?;

    // Wait for Ctrl+C
    tokio::signal::ctrl_c().await?;
    println!("\nShutting down server...");

    // Graceful shutdown
    server.stop().await?;
    let metrics = server.metrics();
    println!(
        "Server stopped after {:?}: {} connections, {} files received, {} errors",
        metrics.uptime,
        metrics.total_connections,
        metrics.files_received,
        metrics.total_errors()
    );

    Ok(())
}
