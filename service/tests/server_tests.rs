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

//! Integration tests driving a live server over real sockets

use async_trait::async_trait;
use remotix_codec::{Message, MessageKind};
use remotix_service::{
    CommandRunner, Connection, ControlServer, Evaluator, FileReceiver, ServerConfig,
    SessionObserver,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;

const TEST_CHUNK_SIZE: usize = 1024;

static SCRATCH_SEQ: AtomicU32 = AtomicU32::new(0);

fn scratch_dir(label: &str) -> PathBuf {
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "remotix-server-tests-{label}-{}-{seq}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn test_config(download_dir: &Path) -> ServerConfig {
    ServerConfig::new("127.0.0.1:0".parse().unwrap())
        .with_download_dir(download_dir)
        .with_chunk_size(TEST_CHUNK_SIZE)
}

async fn connect_client(server: &ControlServer) -> Arc<Connection> {
    let addr = server.local_addr().expect("server not bound");
    let stream = TcpStream::connect(addr).await.unwrap();
    let connection = Arc::new(
        Connection::wrap(stream, TEST_CHUNK_SIZE + 1024).unwrap(),
    );
    connection.mark_connected();
    connection
}

async fn wait_for_count(server: &ControlServer, expected: usize) {
    for _ in 0..200 {
        if server.connection_count().await == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("registry never reached {expected} connections");
}

struct UppercaseEvaluator;

#[async_trait]
impl Evaluator for UppercaseEvaluator {
    async fn inject(&self, code: &[u8]) -> Result<String, String> {
        Ok(String::from_utf8_lossy(code).to_uppercase())
    }

    async fn execute(&self) -> Result<String, String> {
        Ok("executed".to_string())
    }
}

struct RecordingRunner;

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &str, cwd: &Path) -> Result<String, String> {
        Ok(format!("{}$ {command}", cwd.display()))
    }
}

#[derive(Default)]
struct FileObserver {
    received: AtomicUsize,
}

#[async_trait]
impl SessionObserver for FileObserver {
    async fn on_file_received(&self, _peer: SocketAddr, _path: &Path, _bytes: u64) {
        self.received.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_echo_back_roundtrip() {
    let downloads = scratch_dir("echo");
    let server = ControlServer::new(test_config(&downloads).with_echo_back(true));
    server.start().await.unwrap();

    let client = connect_client(&server).await;
    wait_for_count(&server, 1).await;

    client.send(Message::echo("hello there")).await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.kind, MessageKind::Echo);
    assert_eq!(reply.payload.as_ref(), b"hello there");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_inject_routes_through_evaluator() {
    let downloads = scratch_dir("inject");
    let server = ControlServer::new(test_config(&downloads))
        .with_evaluator(Arc::new(UppercaseEvaluator));
    server.start().await.unwrap();

    let client = connect_client(&server).await;
    wait_for_count(&server, 1).await;

    client.send(Message::inject(&b"print('hi')"[..])).await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.kind, MessageKind::Echo);
    assert_eq!(reply.payload_text(), "PRINT('HI')");

    client.send(Message::execute()).await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.payload_text(), "executed");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_cmd_runs_in_session_cwd() {
    let downloads = scratch_dir("cmd");
    let server = ControlServer::new(test_config(&downloads))
        .with_command_runner(Arc::new(RecordingRunner));
    server.start().await.unwrap();

    let client = connect_client(&server).await;
    wait_for_count(&server, 1).await;

    // cd is absorbed into session state, then the next command sees it
    client.send(Message::cmd("cd /var/log")).await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.payload_text(), "/var/log");

    client.send(Message::cmd("ls")).await.unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.payload_text(), "/var/log$ ls");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_upload_lands_in_per_peer_directory() {
    let downloads = scratch_dir("upload");
    let observer = Arc::new(FileObserver::default());
    let server =
        ControlServer::new(test_config(&downloads)).with_observer(observer.clone());
    server.start().await.unwrap();

    let client = connect_client(&server).await;
    wait_for_count(&server, 1).await;

    // Three full chunks plus a ragged tail
    let contents: Vec<u8> = (0..TEST_CHUNK_SIZE * 3 + 17)
        .map(|i| (i % 251) as u8)
        .collect();

    client.send(Message::file_upload("payload.bin")).await.unwrap();
    for chunk in contents.chunks(TEST_CHUNK_SIZE) {
        client.send(Message::file_chunk(chunk.to_vec())).await.unwrap();
    }
    client.send(Message::end_of_file()).await.unwrap();

    for _ in 0..200 {
        if observer.received.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(observer.received.load(Ordering::SeqCst), 1);

    let dest = downloads
        .join(client.local_addr().to_string())
        .join("payload.bin");
    let written = std::fs::read(&dest).unwrap();
    assert_eq!(written, contents);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_traversal_filename_is_rejected() {
    let downloads = scratch_dir("traversal");
    let server = ControlServer::new(test_config(&downloads));
    server.start().await.unwrap();

    let client = connect_client(&server).await;
    wait_for_count(&server, 1).await;

    client
        .send(Message::file_upload("../../etc/passwd"))
        .await
        .unwrap();
    let reply = client.recv().await.unwrap();
    assert_eq!(reply.kind, MessageKind::Error);

    // The session survived the rejected transfer
    client.send(Message::heartbeat()).await.unwrap();
    assert_eq!(server.connection_count().await, 1);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_server_pushes_file_to_client() {
    let downloads = scratch_dir("push-server");
    let outbound = scratch_dir("push-source");
    let inbound = scratch_dir("push-client");

    let source = outbound.join("update.bin");
    let contents: Vec<u8> = (0..TEST_CHUNK_SIZE + 100).map(|i| (i % 199) as u8).collect();
    std::fs::write(&source, &contents).unwrap();

    let server = ControlServer::new(test_config(&downloads));
    server.start().await.unwrap();

    let client = connect_client(&server).await;
    wait_for_count(&server, 1).await;
    let peer = *server.registry().peers().await.first().unwrap();

    let sent = server
        .send_file_to(peer, &source, "update.bin")
        .await
        .unwrap();
    assert_eq!(sent, contents.len() as u64);

    // Drive the receiving side by hand: control frame, chunks, sentinel
    let control = client.recv().await.unwrap();
    assert_eq!(control.kind, MessageKind::FileUpload);
    assert_eq!(control.payload_text(), "update.bin");

    let mut receiver = FileReceiver::open(inbound.join("update.bin")).await.unwrap();
    let received = remotix_service::transfer::receive_into(&client, &mut receiver)
        .await
        .unwrap();
    assert_eq!(received, contents.len() as u64);
    assert_eq!(std::fs::read(inbound.join("update.bin")).unwrap(), contents);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_empties_registry() {
    let downloads = scratch_dir("disconnect");
    let server = ControlServer::new(test_config(&downloads));
    server.start().await.unwrap();

    let client = connect_client(&server).await;
    wait_for_count(&server, 1).await;

    client.send(Message::disconnect()).await.unwrap();
    wait_for_count(&server, 0).await;

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_malformed_frame_does_not_affect_other_clients() {
    use tokio::io::AsyncWriteExt;

    let downloads = scratch_dir("malformed");
    let server = ControlServer::new(test_config(&downloads).with_echo_back(true));
    server.start().await.unwrap();

    let healthy = connect_client(&server).await;
    let addr = server.local_addr().unwrap();
    let mut raw = TcpStream::connect(addr).await.unwrap();
    wait_for_count(&server, 2).await;

    // An unknown tag on one connection leaves the other untouched
    raw.write_all(&1u32.to_le_bytes()).await.unwrap();
    raw.write_all(&[0xEE]).await.unwrap();

    healthy.send(Message::echo("still here")).await.unwrap();
    let reply = healthy.recv().await.unwrap();
    assert_eq!(reply.payload.as_ref(), b"still here");
    assert_eq!(server.connection_count().await, 2);

    server.stop().await.unwrap();
}
