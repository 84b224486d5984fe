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

//! Control server with lifecycle management
//!
//! [`ControlServer`] owns the TCP listener, the client registry, and the
//! accept loop. Capabilities and observers are attached before [`start`],
//! which binds the listener and spawns one [`SessionWorker`] per accepted
//! connection. [`stop`] wakes the accept loop, waits for it to exit, and
//! closes every registered connection.
//!
//! [`start`]: ControlServer::start
//! [`stop`]: ControlServer::stop

use crate::{
    ClientRegistry, CommandRunner, Connection, DestinationPolicy, Dispatcher, Evaluator,
    MetricsSnapshot, Result, ServerConfig, ServerMetrics, ServerState, ServiceError,
    SessionObserver, SessionWorker,
    registry::BroadcastResult,
};
use remotix_codec::Message;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before retrying after a failed accept
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// TCP control server
///
/// # Examples
///
/// ```no_run
/// use remotix_service::{ControlServer, LogObserver, ServerConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> remotix_service::Result<()> {
/// let config = ServerConfig::new("127.0.0.1:6000".parse().unwrap());
/// let server = ControlServer::new(config).with_observer(Arc::new(LogObserver::new()));
/// server.start().await?;
/// // ... serve ...
/// server.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct ControlServer {
    config: ServerConfig,
    state: AtomicU8,
    registry: Arc<ClientRegistry>,
    metrics: Arc<ServerMetrics>,
    observers: Vec<Arc<dyn SessionObserver>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
    shutdown: Arc<Notify>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    local_addr: std::sync::Mutex<Option<SocketAddr>>,
}

impl ControlServer {
    /// Create a server from configuration
    ///
    /// Nothing is bound until [`ControlServer::start`] is called.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(ServerState::NotListening.as_u8()),
            registry: Arc::new(ClientRegistry::new()),
            metrics: Arc::new(ServerMetrics::new()),
            observers: Vec::new(),
            evaluator: None,
            command_runner: None,
            shutdown: Arc::new(Notify::new()),
            accept_handle: Mutex::new(None),
            local_addr: std::sync::Mutex::new(None),
        }
    }

    /// Subscribe an observer to session events on every connection
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

    /// The server's lifecycle state
    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The bound listener address, once started
    ///
    /// Useful when binding to port 0 in tests.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().expect("local_addr lock poisoned")
    }

    /// The shared client registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// A point-in-time snapshot of server metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Number of currently registered connections
    pub async fn connection_count(&self) -> usize {
        self.registry.len().await
    }

    /// Bind the listener and spawn the accept loop
    ///
    /// Fails with [`ServiceError::AlreadyRunning`] on a second call. A bind
    /// failure leaves the server in [`ServerState::NotListening`] so the
    /// caller may retry with a different address.
    pub async fn start(&self) -> Result<()> {
        self.state
            .compare_exchange(
                ServerState::NotListening.as_u8(),
                ServerState::Listening.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ServiceError::AlreadyRunning)?;

        let listener = match TcpListener::bind(self.config.bind_address).await {
            Ok(listener) => listener,
            Err(e) => {
                self.state
                    .store(ServerState::NotListening.as_u8(), Ordering::Release);
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock().expect("local_addr lock poisoned") = Some(local_addr);
        info!(addr = %local_addr, "server listening");

        let dispatcher = Arc::new(self.build_dispatcher());
        let loop_task = AcceptLoop {
            listener,
            registry: self.registry.clone(),
            dispatcher,
            metrics: self.metrics.clone(),
            shutdown: self.shutdown.clone(),
            max_connections: self.config.max_connections,
            max_frame_size: self.config.max_frame_size,
        };
        let handle = tokio::spawn(loop_task.run());
        *self.accept_handle.lock().await = Some(handle);
        Ok(())
    }

    /// Stop accepting, wait for the accept loop, and close all clients
    ///
    /// Fails with [`ServiceError::ServerNotRunning`] unless the server is
    /// currently listening. After a stop the server cannot be restarted.
    pub async fn stop(&self) -> Result<()> {
        self.state
            .compare_exchange(
                ServerState::Listening.as_u8(),
                ServerState::Stopped.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ServiceError::ServerNotRunning)?;

        info!("server stopping");
        self.shutdown.notify_one();
        if let Some(handle) = self.accept_handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "accept loop task failed");
            }
        }
        self.registry.close_all().await;
        info!("server stopped");
        Ok(())
    }

    /// Send a message to one registered client
    pub async fn send_to(&self, addr: SocketAddr, msg: Message) -> Result<()> {
        self.registry.send_to(addr, msg).await
    }

    /// Send a message to every registered client
    pub async fn broadcast(&self, msg: Message) -> BroadcastResult {
        self.metrics.broadcast();
        self.registry.broadcast(msg).await
    }

    /// Push a local file to one registered client
    ///
    /// Returns the number of payload bytes sent.
    pub async fn send_file_to(
        &self,
        addr: SocketAddr,
        source: &Path,
        remote_name: &str,
    ) -> Result<u64> {
        let connection = self
            .registry
            .get(addr)
            .await
            .filter(|c| c.is_connected())
            .ok_or(ServiceError::ClientNotFound(addr))?;
        crate::transfer::send_file(&connection, source, remote_name, self.config.chunk_size).await
    }

    fn build_dispatcher(&self) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(DestinationPolicy::PerPeerDirectory(
            self.config.download_dir.clone(),
        ))
        .with_chunk_size(self.config.chunk_size)
        .with_echo_back(self.config.echo_back)
        .with_observer(Arc::new(MetricsObserver {
            metrics: self.metrics.clone(),
        }));
        for observer in &self.observers {
            dispatcher = dispatcher.with_observer(observer.clone());
        }
        if let Some(evaluator) = &self.evaluator {
            dispatcher = dispatcher.with_evaluator(evaluator.clone());
        }
        if let Some(runner) = &self.command_runner {
            dispatcher = dispatcher.with_command_runner(runner.clone());
        }
        dispatcher
    }
}

impl std::fmt::Debug for ControlServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlServer")
            .field("bind_address", &self.config.bind_address)
            .field("state", &self.state())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Drop for ControlServer {
    fn drop(&mut self) {
        if self.state() == ServerState::Listening {
            warn!("server dropped while listening; call stop() for a clean shutdown");
        }
    }
}

/// Feeds session events into the server's metrics
struct MetricsObserver {
    metrics: Arc<ServerMetrics>,
}

#[async_trait::async_trait]
impl SessionObserver for MetricsObserver {
    async fn on_error(&self, _peer: SocketAddr, _error: &str) {
        self.metrics.protocol_error();
    }

    async fn on_file_received(&self, _peer: SocketAddr, _path: &Path, _bytes: u64) {
        self.metrics.file_received();
    }
}

/// State captured by the spawned accept task
struct AcceptLoop {
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<ServerMetrics>,
    shutdown: Arc<Notify>,
    max_connections: usize,
    max_frame_size: usize,
}

impl AcceptLoop {
    async fn run(self) {
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    debug!("accept loop shutting down");
                    return;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.handle_accept(stream, peer).await,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        self.metrics.connection_error();
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }
        }
    }

    async fn handle_accept(&self, stream: TcpStream, peer: SocketAddr) {
        if self.registry.len().await >= self.max_connections {
            warn!(%peer, limit = self.max_connections, "connection limit reached, rejecting");
            self.metrics.connection_rejected();
            drop(stream);
            return;
        }

        let connection = match Connection::wrap(stream, self.max_frame_size) {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                // Peer vanished between accept and address lookup
                warn!(%peer, error = %e, "failed to wrap accepted stream");
                self.metrics.connection_error();
                return;
            }
        };

        connection.mark_connected();
        self.registry.register(connection.clone()).await;
        self.metrics.connection_opened();
        self.dispatcher.notify_connect(peer).await;

        let worker = SessionWorker::new(connection, self.registry.clone(), self.dispatcher.clone());
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            worker.run().await;
            metrics.connection_closed(started.elapsed());
        });
    }
}
