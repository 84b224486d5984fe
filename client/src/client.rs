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

//! Control client implementation
//!
//! [`ControlClient`] dials the server, announces itself with a `CONNECT`
//! greeting, and then drives the same [`Dispatcher`] machinery the server
//! uses: inbound `INJECT`, `EXECUTE`, and `CMD` frames route to the host
//! capabilities plugged in before [`connect`], and server-pushed files land
//! under the configured download root. Lost connections are retried when
//! auto-reconnect is enabled.
//!
//! [`connect`]: ControlClient::connect

use crate::{ClientConfig, ClientError, Result};
use remotix_codec::Message;
use remotix_service::{
    CommandRunner, Connection, DestinationPolicy, DispatchOutcome, Dispatcher, Evaluator, Session,
    SessionObserver, transfer,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Client lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    /// Not connected
    Disconnected = 0,
    /// Dialing the server
    Connecting = 1,
    /// Connected and serving traffic
    Connected = 2,
    /// Waiting to redial after a lost connection
    Reconnecting = 3,
    /// Local shutdown requested
    ShuttingDown = 4,
}

impl ClientState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Reconnecting,
            4 => Self::ShuttingDown,
            _ => Self::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
        }
    }
}

/// Control protocol client
///
/// Share the client behind an `Arc`: [`connect`] runs the receive loop on
/// one task while [`send`], [`send_file`], and [`disconnect`] are called
/// from others.
///
/// [`connect`]: ControlClient::connect
/// [`send`]: ControlClient::send
/// [`send_file`]: ControlClient::send_file
/// [`disconnect`]: ControlClient::disconnect
pub struct ControlClient {
    config: ClientConfig,
    state: AtomicU8,
    observers: Vec<Arc<dyn SessionObserver>>,
    evaluator: Option<Arc<dyn Evaluator>>,
    command_runner: Option<Arc<dyn CommandRunner>>,
    connection: RwLock<Option<Arc<Connection>>>,
}

impl ControlClient {
    /// Create a client from configuration
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(ClientState::Disconnected.as_u8()),
            observers: Vec::new(),
            evaluator: None,
            command_runner: None,
            connection: RwLock::new(None),
        }
    }

    /// Subscribe an observer to session events
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Plug in the code-evaluation capability for inbound `INJECT`/`EXECUTE`
    pub fn with_evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Plug in the command-execution capability for inbound `CMD`
    pub fn with_command_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.command_runner = Some(runner);
        self
    }

    /// The client's lifecycle state
    pub fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if a connection is currently live
    pub async fn is_connected(&self) -> bool {
        self.connection
            .read()
            .await
            .as_ref()
            .is_some_and(|c| c.is_connected())
    }

    /// The server's address, while connected
    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection.read().await.as_ref().map(|c| c.peer_addr())
    }

    /// Dial the server and serve the connection until it ends
    ///
    /// Returns once the session finishes gracefully (server `DISCONNECT` or
    /// a local [`disconnect`]). With auto-reconnect enabled a lost
    /// connection is redialed after the configured delay, up to the attempt
    /// limit.
    ///
    /// [`disconnect`]: ControlClient::disconnect
    pub async fn connect(&self) -> Result<()> {
        self.state
            .compare_exchange(
                ClientState::Disconnected.as_u8(),
                ClientState::Connecting.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ClientError::AlreadyConnected)?;

        let mut attempts = 0;
        let result = loop {
            match self.connect_once().await {
                Ok(()) => {
                    info!("connection closed normally");
                    break Ok(());
                }
                Err(_) if self.state() == ClientState::ShuttingDown => {
                    debug!("shutdown requested locally");
                    break Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "connection lost");
                    if !self.config.auto_reconnect {
                        break Err(e);
                    }
                    attempts += 1;
                    if let Some(max) = self.config.max_reconnect_attempts
                        && attempts >= max
                    {
                        break Err(ClientError::ReconnectionFailed(attempts));
                    }
                    info!(
                        attempt = attempts,
                        delay = ?self.config.reconnect_delay,
                        "reconnecting"
                    );
                    self.state
                        .store(ClientState::Reconnecting.as_u8(), Ordering::Release);
                    tokio::time::sleep(self.config.reconnect_delay).await;
                    self.state
                        .store(ClientState::Connecting.as_u8(), Ordering::Release);
                }
            }
        };
        self.state
            .store(ClientState::Disconnected.as_u8(), Ordering::Release);
        result
    }

    async fn connect_once(&self) -> Result<()> {
        let addr = self.config.address();
        info!(%addr, "connecting");

        let stream = match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::ConnectionTimeout),
        };

        let connection = Arc::new(Connection::wrap(stream, self.config.max_frame_size)?);
        connection.mark_connected();
        let peer = connection.peer_addr();
        info!(%peer, "connected");
        *self.connection.write().await = Some(connection.clone());
        self.state
            .store(ClientState::Connected.as_u8(), Ordering::Release);

        let greeting = self
            .config
            .greeting
            .clone()
            .unwrap_or_else(|| connection.local_addr().to_string());
        connection.send(Message::connect(greeting)).await?;

        let dispatcher = self.build_dispatcher();
        dispatcher.notify_connect(peer).await;
        let result = self.run_connection(&connection, &dispatcher).await;

        connection.close().await;
        *self.connection.write().await = None;
        dispatcher.notify_disconnect(peer).await;
        result
    }

    async fn run_connection(
        &self,
        connection: &Arc<Connection>,
        dispatcher: &Dispatcher,
    ) -> Result<()> {
        let peer = connection.peer_addr();
        let mut session = Session::new(peer);
        loop {
            let msg = match connection.recv().await {
                Ok(msg) => msg,
                Err(e) if e.is_transport_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(%peer, error = %e, "unreadable frame");
                    dispatcher.notify_error(peer, &e.to_string()).await;
                    let _ = connection.send(Message::error(e.to_string())).await;
                    continue;
                }
            };

            match dispatcher.dispatch(connection, &mut session, msg).await {
                Ok(DispatchOutcome::Continue) => {}
                Ok(DispatchOutcome::Disconnect) => {
                    debug!(%peer, "server requested disconnect");
                    return Ok(());
                }
                Err(e) if e.is_transport_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(%peer, error = %e, "recoverable dispatch failure");
                    dispatcher.notify_error(peer, &e.to_string()).await;
                    let _ = connection.send(Message::error(e.to_string())).await;
                }
            }
        }
    }

    /// Request a graceful shutdown of the active connection
    ///
    /// Sends `DISCONNECT` best-effort, then closes the socket. The task
    /// parked in [`ControlClient::connect`] returns `Ok` shortly after.
    pub async fn disconnect(&self) -> Result<()> {
        let connection = self
            .connection
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;
        self.state
            .store(ClientState::ShuttingDown.as_u8(), Ordering::Release);
        let _ = connection.send(Message::disconnect()).await;
        connection.close().await;
        Ok(())
    }

    /// Send one message to the server
    pub async fn send(&self, msg: Message) -> Result<()> {
        let connection = self
            .connection
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;
        connection.send(msg).await?;
        Ok(())
    }

    /// Push a local file up to the server
    ///
    /// Returns the number of payload bytes sent. The server lands the file
    /// under its per-client download directory as `remote_name`.
    pub async fn send_file(&self, source: &Path, remote_name: &str) -> Result<u64> {
        let connection = self
            .connection
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let bytes =
            transfer::send_file(&connection, source, remote_name, self.config.chunk_size).await?;
        Ok(bytes)
    }

    /// Ask the server to push one of its files down
    ///
    /// The transfer itself arrives through the receive loop and lands under
    /// the configured download root.
    pub async fn request_file(&self, remote_path: &str) -> Result<()> {
        self.send(Message::file_download(remote_path)).await
    }

    fn build_dispatcher(&self) -> Dispatcher {
        let mut dispatcher = Dispatcher::new(DestinationPolicy::ControlFramePath(
            self.config.download_root.clone(),
        ))
        .with_chunk_size(self.config.chunk_size);
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

impl std::fmt::Debug for ControlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlClient")
            .field("address", &self.config.address())
            .field("state", &self.state())
            .field("observers", &self.observers.len())
            .finish()
    }
}
