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

//! Framed connection over one TCP stream

use crate::{ConnectionState, Result, ServiceError};
use futures_util::{SinkExt, StreamExt};
use metrics::counter;
use remotix_codec::{Message, MessageCodec};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::trace;

/// One live duplex stream to a peer, with its own lifecycle
///
/// The stream is split into a framed read half and a framed write half, each
/// behind its own mutex. The write mutex is the per-connection send lock:
/// the wire protocol has no internal synchronization for concurrent writers,
/// so every send serializes through it and interleaved partial frames cannot
/// occur, even when a broadcast runs while the receive loop is parked.
///
/// [`Connection::recv`] is expected to be called from exactly one task (the
/// session's receive loop); [`Connection::send`] and [`Connection::close`]
/// are safe to call from any task.
pub struct Connection {
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    state: AtomicU8,
    reader: Mutex<FramedRead<OwnedReadHalf, MessageCodec>>,
    writer: Mutex<FramedWrite<OwnedWriteHalf, MessageCodec>>,
    closed: Notify,
}

impl Connection {
    /// Wrap an established TCP stream
    ///
    /// The connection starts in [`ConnectionState::Connecting`]; call
    /// [`Connection::mark_connected`] once it is ready for traffic.
    pub fn wrap(stream: TcpStream, max_frame_size: usize) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let local_addr = stream.local_addr()?;
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            peer_addr,
            local_addr,
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            reader: Mutex::new(FramedRead::new(
                read_half,
                MessageCodec::with_max_frame_size(max_frame_size),
            )),
            writer: Mutex::new(FramedWrite::new(
                write_half,
                MessageCodec::with_max_frame_size(max_frame_size),
            )),
            closed: Notify::new(),
        })
    }

    /// The peer's address
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The local endpoint's address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The current lifecycle state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the connection is live
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Transition from Connecting to Connected
    ///
    /// A no-op once the connection has been closed.
    pub fn mark_connected(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting.as_u8(),
            ConnectionState::Connected.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Send one message as a single logical write
    ///
    /// Stamps the sender with the local endpoint address, encodes, and
    /// writes length prefix plus frame under the write lock. Any failure
    /// here is connection-fatal to the caller.
    pub async fn send(&self, msg: Message) -> Result<()> {
        if self.state() == ConnectionState::Closed {
            return Err(ServiceError::ConnectionClosed);
        }

        let msg = msg.with_sender(self.local_addr);
        trace!(peer = %self.peer_addr, %msg, "sending");

        let mut writer = self.writer.lock().await;
        writer.send(msg).await?;
        counter!("remotix.messages.sent").increment(1);
        Ok(())
    }

    /// Receive the next message, blocking until a full frame arrives
    ///
    /// Returns [`ServiceError::ConnectionClosed`] on EOF or when another
    /// task closes the connection while this call is parked on the read.
    /// A zero or oversized length prefix surfaces as a fatal codec error.
    /// An unknown tag surfaces as a non-fatal one: the decoder only yields
    /// raw frames, so the framed stream never latches an error and the next
    /// call reads the following frame normally.
    pub async fn recv(&self) -> Result<Message> {
        // Register for the close notification before checking state so a
        // concurrent close cannot slip between the check and the await.
        let closed = self.closed.notified();
        if self.state() == ConnectionState::Closed {
            return Err(ServiceError::ConnectionClosed);
        }

        let mut reader = self.reader.lock().await;
        let frame = tokio::select! {
            _ = closed => return Err(ServiceError::ConnectionClosed),
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(raw)) => {
                let msg = raw.into_message()?;
                counter!("remotix.messages.received").increment(1);
                trace!(peer = %self.peer_addr, %msg, "received");
                Ok(msg.with_sender(self.peer_addr))
            }
            Some(Err(e)) => Err(e.into()),
            None => Err(ServiceError::ConnectionClosed),
        }
    }

    /// Close the connection
    ///
    /// Idempotent and safe to call from any task: the state flips to Closed
    /// exactly once, a receive parked in [`Connection::recv`] is woken and
    /// fails with [`ServiceError::ConnectionClosed`], and the write half is
    /// shut down best-effort so the peer observes EOF.
    pub async fn close(&self) {
        let prev = self
            .state
            .swap(ConnectionState::Closed.as_u8(), Ordering::AcqRel);
        if ConnectionState::from_u8(prev) == ConnectionState::Closed {
            return;
        }

        trace!(peer = %self.peer_addr, "closing connection");
        self.closed.notify_waiters();
        counter!("remotix.connections.closed").increment(1);

        // Skip the FIN if a send currently holds the write lock; the socket
        // is released when the last Arc drops anyway.
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.close().await;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer_addr", &self.peer_addr)
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .finish()
    }
}
