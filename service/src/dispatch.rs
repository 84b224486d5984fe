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

//! Message routing for one session
//!
//! The dispatcher interprets each incoming frame's kind and routes it to
//! the right seam: observers for presentation, the transfer engine for
//! files, the injected capabilities for code evaluation and command
//! execution. Capability calls run under `catch_unwind` so a panicking
//! handler is reported as an `ERROR` reply instead of leaking out as an
//! unrelated disconnect.

use crate::{
    CommandRunner, Connection, Evaluator, FileReceiver, Result, ServiceError, SessionObserver,
    transfer,
};
use futures::FutureExt;
use remotix_codec::{Message, MessageKind};
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where received files land
#[derive(Debug, Clone)]
pub enum DestinationPolicy {
    /// Server side: under `<root>/<peer-ip>:<peer-port>/<filename>`
    PerPeerDirectory(PathBuf),
    /// Client side: under the root at the path carried in the control frame
    ControlFramePath(PathBuf),
}

impl DestinationPolicy {
    fn resolve(&self, peer: SocketAddr, filename: &str) -> Result<PathBuf> {
        match self {
            DestinationPolicy::PerPeerDirectory(root) => {
                transfer::resolve_destination(root, Some(peer), filename)
            }
            DestinationPolicy::ControlFramePath(root) => {
                transfer::resolve_destination(root, None, filename)
            }
        }
    }
}

/// Per-connection mutable session state
///
/// Currently the recorded working directory for `CMD` handling: `cd` lines
/// mutate it instead of spawning a process, and every other command runs
/// inside it.
#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    cwd: PathBuf,
}

impl Session {
    /// Create session state for a peer, starting in the process cwd
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// The peer this session belongs to
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// The session's recorded working directory
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn change_dir(&mut self, target: &str) {
        if target.is_empty() {
            return;
        }
        let target = Path::new(target);
        if target.is_absolute() {
            self.cwd = target.to_path_buf();
        } else {
            self.cwd.push(target);
        }
    }
}

/// What the receive loop should do after one routed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Keep receiving
    Continue,
    /// Peer requested a graceful close; run teardown
    Disconnect,
}

/// Routes incoming messages for a session
///
/// One dispatcher is shared by all sessions of a server (or by a client's
/// single session); per-connection state lives in [`Session`].
pub struct Dispatcher {
    policy: DestinationPolicy,
    observers: Vec<Arc<dyn SessionObserver>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
    chunk_size: usize,
    echo_back: bool,
}

impl Dispatcher {
    /// Create a dispatcher with the given destination policy
    pub fn new(policy: DestinationPolicy) -> Self {
        Self {
            policy,
            observers: Vec::new(),
            evaluator: None,
            command_runner: None,
            chunk_size: remotix_codec::DEFAULT_CHUNK_SIZE,
            echo_back: false,
        }
    }

    /// Subscribe an observer to session events
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Plug in the code-evaluation capability
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Plug in the command-execution capability
    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(runner);
        self
    }

    /// Set the chunk size used when answering `FILE_DOWNLOAD` requests
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Echo `ECHO` payloads back to the sender
    pub fn with_echo_back(mut self, enabled: bool) -> Self {
        self.echo_back = enabled;
        self
    }

    /// Fan out a connect event to all observers
    pub async fn notify_connect(&self, peer: SocketAddr) {
        for observer in &self.observers {
            observer.on_connect(peer).await;
        }
    }

    /// Fan out a disconnect event to all observers
    pub async fn notify_disconnect(&self, peer: SocketAddr) {
        for observer in &self.observers {
            observer.on_disconnect(peer).await;
        }
    }

    /// Fan out an error to all observers
    pub async fn notify_error(&self, peer: SocketAddr, error: &str) {
        for observer in &self.observers {
            observer.on_error(peer, error).await;
        }
    }

    async fn notify_message(&self, peer: SocketAddr, msg: &Message) {
        for observer in &self.observers {
            observer.on_message(peer, msg).await;
        }
    }

    /// Route one incoming message
    ///
    /// Transport-fatal errors propagate to the caller; everything else is
    /// converted to an `ERROR` reply here or by the session worker, and the
    /// loop continues.
    pub async fn dispatch(
        &self,
        conn: &Connection,
        session: &mut Session,
        msg: Message,
    ) -> Result<DispatchOutcome> {
        let peer = session.peer();
        match msg.kind {
            MessageKind::Error => {
                self.notify_error(peer, &msg.payload_text()).await;
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::Disconnect => {
                debug!(%peer, "peer requested disconnect");
                Ok(DispatchOutcome::Disconnect)
            }
            MessageKind::Heartbeat | MessageKind::Connect => {
                self.notify_message(peer, &msg).await;
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::Echo => {
                self.notify_message(peer, &msg).await;
                if self.echo_back {
                    conn.send(Message::new(MessageKind::Echo, msg.payload.clone()))
                        .await?;
                }
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::Inject => {
                let result = match &self.evaluator {
                    Some(evaluator) => self.guard(evaluator.inject(&msg.payload)).await,
                    None => Err("no evaluation capability available".to_string()),
                };
                self.reply(conn, peer, result).await?;
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::Execute => {
                let result = match &self.evaluator {
                    Some(evaluator) => self.guard(evaluator.execute()).await,
                    None => Err("no evaluation capability available".to_string()),
                };
                self.reply(conn, peer, result).await?;
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::Cmd => {
                self.handle_cmd(conn, session, &msg.payload_text()).await?;
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::FileUpload => {
                self.handle_file_upload(conn, peer, &msg.payload_text())
                    .await?;
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::FileDownload => {
                self.handle_file_download(conn, &msg.payload_text()).await?;
                Ok(DispatchOutcome::Continue)
            }
            MessageKind::File | MessageKind::EndOfFile => Err(ServiceError::Protocol(format!(
                "{} outside an active file transfer",
                msg.kind
            ))),
        }
    }

    /// Run a capability call, converting a panic into an error text
    async fn guard<F>(&self, call: F) -> std::result::Result<String, String>
    where
        F: Future<Output = std::result::Result<String, String>>,
    {
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(panic_text(panic)),
        }
    }

    /// Relay a capability result back to the peer
    async fn reply(
        &self,
        conn: &Connection,
        peer: SocketAddr,
        result: std::result::Result<String, String>,
    ) -> Result<()> {
        match result {
            Ok(output) => conn.send(Message::echo(output)).await,
            Err(text) => {
                warn!(%peer, "handler failed: {text}");
                self.notify_error(peer, &text).await;
                conn.send(Message::error(ServiceError::Handler(text).to_string()))
                    .await
            }
        }
    }

    async fn handle_cmd(
        &self,
        conn: &Connection,
        session: &mut Session,
        line: &str,
    ) -> Result<()> {
        let line = line.trim();
        // A cd prefix mutates the session cwd instead of spawning a process
        if line == "cd" || line.starts_with("cd ") {
            session.change_dir(line.strip_prefix("cd").unwrap_or("").trim());
            return conn
                .send(Message::echo(session.cwd().display().to_string()))
                .await;
        }

        let result = match &self.command_runner {
            Some(runner) => self.guard(runner.run(line, session.cwd())).await,
            None => Err("no command capability available".to_string()),
        };
        self.reply(conn, session.peer(), result).await
    }

    async fn handle_file_upload(
        &self,
        conn: &Connection,
        peer: SocketAddr,
        filename: &str,
    ) -> Result<()> {
        let dest = self.policy.resolve(peer, filename)?;
        let mut receiver = FileReceiver::open(&dest).await?;
        let bytes = transfer::receive_into(conn, &mut receiver).await?;
        for observer in &self.observers {
            observer.on_file_received(peer, receiver.path(), bytes).await;
        }
        Ok(())
    }

    async fn handle_file_download(&self, conn: &Connection, filename: &str) -> Result<()> {
        let source = Path::new(filename);
        let remote_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ServiceError::InvalidFilename(filename.to_string()))?;
        transfer::send_file(conn, source, &remote_name, self.chunk_size).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("policy", &self.policy)
            .field("observers", &self.observers.len())
            .field("has_evaluator", &self.evaluator.is_some())
            .field("has_command_runner", &self.command_runner.is_some())
            .field("echo_back", &self.echo_back)
            .finish()
    }
}

fn panic_text(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {text}")
    } else if let Some(text) = panic.downcast_ref::<String>() {
        format!("handler panicked: {text}")
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use remotix_codec::DEFAULT_MAX_FRAME_SIZE;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::{TcpListener, TcpStream};

    struct PanickingEvaluator;

    #[async_trait]
    impl Evaluator for PanickingEvaluator {
        async fn inject(&self, _code: &[u8]) -> std::result::Result<String, String> {
            panic!("evaluation blew up");
        }

        async fn execute(&self) -> std::result::Result<String, String> {
            Err("nothing injected".to_string())
        }
    }

    struct CountingObserver {
        messages: AtomicUsize,
        errors: AtomicUsize,
    }

    #[async_trait]
    impl SessionObserver for CountingObserver {
        async fn on_message(&self, _peer: SocketAddr, _msg: &Message) {
            self.messages.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_error(&self, _peer: SocketAddr, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn connection_pair() -> (Arc<Connection>, Arc<Connection>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server_stream, _) = listener.accept().await.unwrap();
        let client_stream = client_task.await.unwrap();

        let server = Arc::new(Connection::wrap(server_stream, DEFAULT_MAX_FRAME_SIZE).unwrap());
        let client = Arc::new(Connection::wrap(client_stream, DEFAULT_MAX_FRAME_SIZE).unwrap());
        server.mark_connected();
        client.mark_connected();
        (server, client)
    }

    fn test_dispatcher() -> Dispatcher {
        Dispatcher::new(DestinationPolicy::PerPeerDirectory(std::env::temp_dir()))
    }

    #[tokio::test]
    async fn test_disconnect_routes_to_teardown() {
        let (server, client) = connection_pair().await;
        let dispatcher = test_dispatcher();
        let mut session = Session::new(server.peer_addr());

        let outcome = dispatcher
            .dispatch(&server, &mut session, Message::disconnect())
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Disconnect);
        drop(client);
    }

    #[tokio::test]
    async fn test_echo_back_when_configured() {
        let (server, client) = connection_pair().await;
        let dispatcher = test_dispatcher().with_echo_back(true);
        let mut session = Session::new(server.peer_addr());

        dispatcher
            .dispatch(&server, &mut session, Message::echo("ping"))
            .await
            .unwrap();

        let reply = client.recv().await.unwrap();
        assert_eq!(reply.kind, MessageKind::Echo);
        assert_eq!(reply.payload.as_ref(), b"ping");
    }

    #[tokio::test]
    async fn test_panicking_evaluator_becomes_error_reply() {
        let (server, client) = connection_pair().await;
        let observer = Arc::new(CountingObserver {
            messages: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        });
        let dispatcher = test_dispatcher()
            .with_evaluator(Arc::new(PanickingEvaluator))
            .with_observer(observer.clone());
        let mut session = Session::new(server.peer_addr());

        let outcome = dispatcher
            .dispatch(&server, &mut session, Message::inject(&b"boom"[..]))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);

        // The panic text came back over the wire, not a disconnect
        let reply = client.recv().await.unwrap();
        assert_eq!(reply.kind, MessageKind::Error);
        assert!(reply.payload_text().contains("evaluation blew up"));
        assert!(server.is_connected());
    }

    #[tokio::test]
    async fn test_missing_capability_reports_error() {
        let (server, client) = connection_pair().await;
        let dispatcher = test_dispatcher();
        let mut session = Session::new(server.peer_addr());

        dispatcher
            .dispatch(&server, &mut session, Message::execute())
            .await
            .unwrap();

        let reply = client.recv().await.unwrap();
        assert_eq!(reply.kind, MessageKind::Error);
        assert!(reply.payload_text().contains("no evaluation capability"));
    }

    #[tokio::test]
    async fn test_cd_mutates_session_cwd() {
        let (server, client) = connection_pair().await;
        let dispatcher = test_dispatcher();
        let mut session = Session::new(server.peer_addr());

        dispatcher
            .dispatch(&server, &mut session, Message::cmd("cd /tmp"))
            .await
            .unwrap();
        assert_eq!(session.cwd(), Path::new("/tmp"));

        let reply = client.recv().await.unwrap();
        assert_eq!(reply.kind, MessageKind::Echo);
        assert_eq!(reply.payload_text(), "/tmp");

        // Relative cd appends to the recorded cwd
        dispatcher
            .dispatch(&server, &mut session, Message::cmd("cd work"))
            .await
            .unwrap();
        assert_eq!(session.cwd(), Path::new("/tmp/work"));
    }

    #[tokio::test]
    async fn test_stray_transfer_frame_is_protocol_error() {
        let (server, client) = connection_pair().await;
        let dispatcher = test_dispatcher();
        let mut session = Session::new(server.peer_addr());

        let err = dispatcher
            .dispatch(&server, &mut session, Message::file_chunk(vec![1, 2]))
            .await
            .unwrap_err();
        assert!(err.is_protocol());
        assert!(!err.is_transport_fatal());
        drop(client);
    }

    #[tokio::test]
    async fn test_observer_counts_messages() {
        let (server, client) = connection_pair().await;
        let observer = Arc::new(CountingObserver {
            messages: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        });
        let dispatcher = test_dispatcher().with_observer(observer.clone());
        let mut session = Session::new(server.peer_addr());

        for msg in [Message::heartbeat(), Message::connect("hi"), Message::echo("x")] {
            dispatcher.dispatch(&server, &mut session, msg).await.unwrap();
        }
        assert_eq!(observer.messages.load(Ordering::SeqCst), 3);
        drop(client);
    }
}
