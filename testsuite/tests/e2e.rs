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

//! End-to-end tests running real clients against a real server

use async_trait::async_trait;
use remotix_client::{ClientConfig, ControlClient};
use remotix_codec::{Message, MessageKind};
use remotix_service::{CommandRunner, ControlServer, ServerConfig, SessionObserver};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 1024;

static SCRATCH_SEQ: AtomicU32 = AtomicU32::new(0);

fn scratch_dir(label: &str) -> PathBuf {
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "remotix-e2e-{label}-{}-{seq}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Observer that records every routed message payload
#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<(MessageKind, String)>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl Recorder {
    fn payloads_of(&self, kind: MessageKind) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl SessionObserver for Recorder {
    async fn on_connect(&self, _peer: SocketAddr) {
        self.connects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_disconnect(&self, _peer: SocketAddr) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_message(&self, _peer: SocketAddr, msg: &Message) {
        self.messages
            .lock()
            .unwrap()
            .push((msg.kind, msg.payload_text()));
    }
}

struct FakeShell;

#[async_trait]
impl CommandRunner for FakeShell {
    async fn run(&self, command: &str, cwd: &Path) -> Result<String, String> {
        Ok(format!("[{}] ran: {command}", cwd.display()))
    }
}

async fn start_server(downloads: &Path, recorder: Arc<Recorder>) -> ControlServer {
    let server = ControlServer::new(
        ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_download_dir(downloads)
            .with_chunk_size(CHUNK_SIZE),
    )
    .with_observer(recorder);
    server.start().await.unwrap();
    server
}

fn spawn_client(
    server: &ControlServer,
    config: impl FnOnce(ClientConfig) -> ClientConfig,
) -> (Arc<ControlClient>, JoinHandle<()>) {
    let addr = server.local_addr().unwrap();
    let base = ClientConfig::new("127.0.0.1", addr.port()).with_chunk_size(CHUNK_SIZE);
    let client = Arc::new(ControlClient::new(config(base)));
    let runner = client.clone();
    let handle = tokio::spawn(async move {
        runner.connect().await.unwrap();
    });
    (client, handle)
}

async fn wait_until(mut probe: impl AsyncFnMut() -> bool, what: &str) {
    for _ in 0..300 {
        if probe().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn test_session_lifecycle() {
    let downloads = scratch_dir("lifecycle");
    let recorder = Arc::new(Recorder::default());
    let server = start_server(&downloads, recorder.clone()).await;

    // The client gets its own recorder so both directions are observable
    let client_recorder = Arc::new(Recorder::default());
    let addr = server.local_addr().unwrap();
    let client = Arc::new(
        ControlClient::new(
            ClientConfig::new("127.0.0.1", addr.port())
                .with_chunk_size(CHUNK_SIZE)
                .with_greeting("agent-42"),
        )
        .with_observer(client_recorder.clone()),
    );
    let runner = client.clone();
    let handle = tokio::spawn(async move {
        runner.connect().await.unwrap();
    });
    wait_until(async || server.connection_count().await == 1, "registration").await;
    assert_eq!(recorder.connects.load(Ordering::SeqCst), 1);

    // The greeting arrived as a CONNECT frame
    wait_until(
        async || !recorder.payloads_of(MessageKind::Connect).is_empty(),
        "greeting",
    )
    .await;
    assert_eq!(recorder.payloads_of(MessageKind::Connect), vec!["agent-42"]);

    // Server-to-client traffic flows over the registered connection and is
    // observed by the client's own receive loop
    let peer = server.registry().peers().await[0];
    server.send_to(peer, Message::echo("ping")).await.unwrap();
    wait_until(
        async || {
            client_recorder
                .payloads_of(MessageKind::Echo)
                .contains(&"ping".to_string())
        },
        "echo delivery",
    )
    .await;

    client.disconnect().await.unwrap();
    handle.await.unwrap();

    wait_until(async || server.connection_count().await == 0, "teardown").await;
    assert_eq!(recorder.disconnects.load(Ordering::SeqCst), 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_survives_dead_client() {
    let downloads = scratch_dir("broadcast");
    let recorder = Arc::new(Recorder::default());
    let server = start_server(&downloads, recorder.clone()).await;

    let mut clients = Vec::new();
    for i in 0..3 {
        let (client, handle) = spawn_client(&server, |c| c.with_greeting(format!("agent-{i}")));
        clients.push((client, handle));
    }
    wait_until(async || server.connection_count().await == 3, "registrations").await;

    // One client leaves; the sweep still reaches the remaining two
    clients[0].0.disconnect().await.unwrap();
    wait_until(async || server.connection_count().await == 2, "departure").await;

    let result = server.broadcast(Message::echo("announcement")).await;
    assert_eq!(result.total, 2);
    assert!(result.all_succeeded());

    for (client, handle) in clients {
        let _ = client.disconnect().await;
        let _ = handle.await;
    }
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_upload_round_trip() {
    let downloads = scratch_dir("upload-server");
    let outbound = scratch_dir("upload-source");
    let recorder = Arc::new(Recorder::default());
    let server = start_server(&downloads, recorder).await;

    // Three full chunks plus a ragged tail
    let contents: Vec<u8> = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 249) as u8).collect();
    let source = outbound.join("dataset.bin");
    std::fs::write(&source, &contents).unwrap();

    let (client, handle) = spawn_client(&server, |c| c);
    wait_until(async || server.connection_count().await == 1, "registration").await;

    let sent = client.send_file(&source, "dataset.bin").await.unwrap();
    assert_eq!(sent, contents.len() as u64);

    let peer = server.registry().peers().await[0];
    let dest = downloads.join(peer.to_string()).join("dataset.bin");
    wait_until(async || dest.exists(), "upload completion").await;

    // Byte-identical after a short settle for the final write
    wait_until(
        async || std::fs::read(&dest).map(|d| d == contents).unwrap_or(false),
        "upload contents",
    )
    .await;

    client.disconnect().await.unwrap();
    handle.await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_client_download_request() {
    let downloads = scratch_dir("download-server");
    let served = scratch_dir("download-source");
    let landing = scratch_dir("download-client");
    let recorder = Arc::new(Recorder::default());
    let server = start_server(&downloads, recorder).await;

    let contents: Vec<u8> = (0..CHUNK_SIZE + 321).map(|i| (i % 241) as u8).collect();
    let remote_file = served.join("firmware.bin");
    std::fs::write(&remote_file, &contents).unwrap();

    let (client, handle) = spawn_client(&server, {
        let landing = landing.clone();
        move |c| c.with_download_root(landing)
    });
    wait_until(async || server.connection_count().await == 1, "registration").await;

    client
        .request_file(remote_file.to_str().unwrap())
        .await
        .unwrap();

    let dest = landing.join("firmware.bin");
    wait_until(
        async || std::fs::read(&dest).map(|d| d == contents).unwrap_or(false),
        "download completion",
    )
    .await;

    client.disconnect().await.unwrap();
    handle.await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_server_commands_client_shell() {
    let downloads = scratch_dir("cmd");
    let recorder = Arc::new(Recorder::default());
    let server = start_server(&downloads, recorder.clone()).await;

    let addr = server.local_addr().unwrap();
    let client = Arc::new(
        ControlClient::new(ClientConfig::new("127.0.0.1", addr.port()).with_chunk_size(CHUNK_SIZE))
            .with_command_runner(Arc::new(FakeShell)),
    );
    let runner = client.clone();
    let handle = tokio::spawn(async move {
        runner.connect().await.unwrap();
    });
    wait_until(async || server.connection_count().await == 1, "registration").await;

    let peer = server.registry().peers().await[0];
    server.send_to(peer, Message::cmd("uname -a")).await.unwrap();

    // The client's shell output comes back as an ECHO frame
    wait_until(
        async || {
            recorder
                .payloads_of(MessageKind::Echo)
                .iter()
                .any(|p| p.contains("ran: uname -a"))
        },
        "command output",
    )
    .await;

    client.disconnect().await.unwrap();
    handle.await.unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_tag_does_not_disturb_other_sessions() {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    let downloads = scratch_dir("unknown-tag");
    let recorder = Arc::new(Recorder::default());
    let server = start_server(&downloads, recorder.clone()).await;

    let (client, handle) = spawn_client(&server, |c| c.with_greeting("healthy"));
    wait_until(async || server.connection_count().await == 1, "registration").await;

    // A raw peer spews an unknown tag; the healthy session keeps flowing
    let mut raw = TcpStream::connect(server.local_addr().unwrap()).await.unwrap();
    raw.write_all(&1u32.to_le_bytes()).await.unwrap();
    raw.write_all(&[0xEE]).await.unwrap();
    raw.flush().await.unwrap();

    client.send(Message::echo("still alive")).await.unwrap();
    wait_until(
        async || {
            recorder
                .payloads_of(MessageKind::Echo)
                .contains(&"still alive".to_string())
        },
        "healthy traffic",
    )
    .await;

    client.disconnect().await.unwrap();
    handle.await.unwrap();
    server.stop().await.unwrap();
}
