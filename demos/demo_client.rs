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

//! Demo Control Client
//!
//! This example demonstrates a basic control client that:
//! - Connects to the demo server on port 6000 with a greeting
//! - Reconnects automatically when the connection drops
//! - Answers `CMD` frames by running them in a shell
//! - Sends a few `ECHO` frames and prints what comes back
//!
//! ## Usage
//!
//! Start the demo server first, then:
//! ```bash
//! cargo run --example demo_client
//! ```

use async_trait::async_trait;
use remotix_client::{ClientConfig, CommandRunner, ControlClient, LogObserver, Message};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

/// Runs each command line through the system shell
struct SystemShell;

#[async_trait]
impl CommandRunner for SystemShell {
    async fn run(&self, command: &str, cwd: &Path) -> Result<String, String> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| e.to_string())?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(text)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    println!("Connecting to the remotix control server on 127.0.0.1:6000\n");

    let config = ClientConfig::new("127.0.0.1", 6000)
        .with_greeting(format!("demo-client-{}", std::process::id()))
        .with_auto_reconnect(true)
        .with_reconnect_delay(Duration::from_secs(2))
        .with_max_reconnect_attempts(Some(5))
        .with_download_root("Downloads");

    let client = Arc::new(
        ControlClient::new(config)
            .with_observer(Arc::new(LogObserver::new()))
            .with_command_runner(Arc::new(SystemShell)),
    );

    // Drive the session on its own task
    let runner = client.clone();
    let session = tokio::spawn(async move { runner.connect().await });

    // Give the handshake a moment, then send some traffic
    tokio::time::sleep(Duration::from_millis(200)).await;
    if client.is_connected().await {
        client.send(Message::echo("hello from the demo client")).await?;
        client.send(Message::heartbeat()).await?;
    }

    // Run until Ctrl+C or until the server ends the session
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nDisconnecting...");
            let _ = client.disconnect().await;
        }
        result = session => {
            result??;
        }
    }

    println!("Client stopped");
    Ok(())
}
