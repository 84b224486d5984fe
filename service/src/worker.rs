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

//! Per-connection receive loop
//!
//! One worker task per accepted connection. The worker blocks on
//! [`Connection::recv`], routes every frame through the [`Dispatcher`], and
//! guarantees that teardown (close, unregister, disconnect fan-out) runs
//! exactly once on every exit path — transport failure, graceful
//! `DISCONNECT`, or server shutdown. Handler failures never reach the
//! transport: they are converted to `ERROR` replies and the loop continues.

use crate::{ClientRegistry, Connection, Dispatcher, DispatchOutcome, Session};
use remotix_codec::Message;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Receive-loop task for one registered connection
pub struct SessionWorker {
    connection: Arc<Connection>,
    registry: Arc<ClientRegistry>,
    dispatcher: Arc<Dispatcher>,
    session: Session,
}

impl SessionWorker {
    /// Create a worker for a registered connection
    pub fn new(
        connection: Arc<Connection>,
        registry: Arc<ClientRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let session = Session::new(connection.peer_addr());
        Self {
            connection,
            registry,
            dispatcher,
            session,
        }
    }

    /// Run the receive loop until the session ends, then tear down
    #[instrument(skip(self), fields(peer = %self.connection.peer_addr()))]
    pub async fn run(mut self) {
        debug!("session worker started");
        self.event_loop().await;
        self.cleanup().await;
    }

    async fn event_loop(&mut self) {
        let peer = self.connection.peer_addr();
        loop {
            let msg = match self.connection.recv().await {
                Ok(msg) => msg,
                Err(e) if e.is_transport_fatal() => {
                    debug!(%peer, error = %e, "transport closed");
                    return;
                }
                Err(e) => {
                    // Unknown tag on an aligned stream: logged, reported
                    // best-effort, loop continues
                    warn!(%peer, error = %e, "unreadable frame");
                    self.dispatcher.notify_error(peer, &e.to_string()).await;
                    let _ = self.connection.send(Message::error(e.to_string())).await;
                    continue;
                }
            };

            let result = self
                .dispatcher
                .dispatch(&self.connection, &mut self.session, msg)
                .await;
            match result {
                Ok(DispatchOutcome::Continue) => {}
                Ok(DispatchOutcome::Disconnect) => return,
                Err(e) if e.is_transport_fatal() => {
                    debug!(%peer, error = %e, "transport failed during dispatch");
                    return;
                }
                Err(e) => {
                    // Protocol violations and local I/O failures keep the
                    // session alive; the peer gets an ERROR message
                    warn!(%peer, error = %e, "recoverable dispatch failure");
                    self.dispatcher.notify_error(peer, &e.to_string()).await;
                    let _ = self.connection.send(Message::error(e.to_string())).await;
                }
            }
        }
    }

    /// Close, unregister, and notify — reached on every exit path
    async fn cleanup(&self) {
        let peer = self.connection.peer_addr();
        self.connection.close().await;
        self.registry.unregister(peer).await;
        self.dispatcher.notify_disconnect(peer).await;
        debug!(%peer, "session worker finished");
    }
}

impl std::fmt::Debug for SessionWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionWorker")
            .field("peer", &self.connection.peer_addr())
            .field("state", &self.connection.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DestinationPolicy, SessionObserver};
    use async_trait::async_trait;
    use remotix_codec::{DEFAULT_MAX_FRAME_SIZE, MessageKind};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    struct TeardownObserver {
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl SessionObserver for TeardownObserver {
        async fn on_disconnect(&self, _peer: SocketAddr) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn registered_worker() -> (
        Arc<Connection>,
        Arc<ClientRegistry>,
        Arc<TeardownObserver>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client_task = tokio::spawn(async move { TcpStream::connect(addr).await.unwrap() });
        let (server_stream, _) = listener.accept().await.unwrap();
        let client_stream = client_task.await.unwrap();

        let server = Arc::new(Connection::wrap(server_stream, DEFAULT_MAX_FRAME_SIZE).unwrap());
        let client = Arc::new(Connection::wrap(client_stream, DEFAULT_MAX_FRAME_SIZE).unwrap());
        server.mark_connected();
        client.mark_connected();

        let registry = Arc::new(ClientRegistry::new());
        registry.register(server.clone()).await;

        let observer = Arc::new(TeardownObserver {
            disconnects: AtomicUsize::new(0),
        });
        let dispatcher = Arc::new(
            Dispatcher::new(DestinationPolicy::PerPeerDirectory(std::env::temp_dir()))
                .with_observer(observer.clone()),
        );

        let worker = SessionWorker::new(server, registry.clone(), dispatcher);
        let handle = tokio::spawn(worker.run());

        (client, registry, observer, handle)
    }

    #[tokio::test]
    async fn test_graceful_disconnect_unregisters_once() {
        let (client, registry, observer, handle) = registered_worker().await;
        assert_eq!(registry.len().await, 1);

        client.send(Message::disconnect()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not exit")
            .unwrap();

        assert!(registry.is_empty().await);
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_peer_drop_triggers_teardown() {
        let (client, registry, observer, handle) = registered_worker().await;

        client.close().await;
        drop(client);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not exit")
            .unwrap();
        assert!(registry.is_empty().await);
        assert_eq!(observer.disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_protocol_error_keeps_session_alive() {
        let (client, registry, _observer, handle) = registered_worker().await;

        // A stray transfer frame is a protocol violation, not a disconnect
        client.send(Message::end_of_file()).await.unwrap();
        let reply = client.recv().await.unwrap();
        assert_eq!(reply.kind, MessageKind::Error);

        assert_eq!(registry.len().await, 1);
        assert!(logs_contain("recoverable dispatch failure"));

        client.send(Message::disconnect()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not exit")
            .unwrap();
    }
}
