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

//! Chunked file transfer over the message framing
//!
//! The chunked shape: one `FILE_UPLOAD` control frame carrying the
//! destination-relative filename, then zero or more `FILE` frames of up to
//! the configured chunk size, terminated by one empty `END_OF_FILE`
//! sentinel. The receiver opens the destination before consuming chunks,
//! appends in arrival order, and finalizes only on the sentinel. Any other
//! kind arriving mid-transfer is a protocol violation: the partial file is
//! removed and the transfer aborted.

use crate::{Connection, Result, ServiceError};
use bytes::BytesMut;
use metrics::{counter, histogram};
use remotix_codec::{Message, MessageKind};
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};

/// Stream a local file to the peer as a chunked transfer
///
/// `remote_name` is the destination-relative filename carried in the control
/// frame. Failure to open or read the source is a local error
/// ([`ServiceError::FileRead`]) and leaves the connection usable; transport
/// failures while sending propagate as connection-fatal.
///
/// Returns the number of content bytes sent.
pub async fn send_file(
    conn: &Connection,
    source: &Path,
    remote_name: &str,
    chunk_size: usize,
) -> Result<u64> {
    let mut file = File::open(source)
        .await
        .map_err(|e| ServiceError::FileRead(format!("{}: {e}", source.display())))?;

    conn.send(Message::file_upload(remote_name)).await?;

    let mut sent: u64 = 0;
    loop {
        // Fresh buffer per chunk so the frame takes ownership without a copy
        let mut buffer = BytesMut::with_capacity(chunk_size);
        let n = file
            .read_buf(&mut buffer)
            .await
            .map_err(|e| ServiceError::FileRead(format!("{}: {e}", source.display())))?;
        if n == 0 {
            break;
        }
        conn.send(Message::file_chunk(buffer.freeze())).await?;
        sent += n as u64;
    }
    conn.send(Message::end_of_file()).await?;

    counter!("remotix.files.sent").increment(1);
    histogram!("remotix.files.sent_bytes").record(sent as f64);
    debug!(source = %source.display(), remote_name, bytes = sent, "file sent");
    Ok(sent)
}

/// Outcome of feeding one frame into a [`FileReceiver`]
#[derive(Debug)]
pub enum TransferStep {
    /// Chunk appended, transfer still in progress
    Continue,
    /// Sentinel observed, destination finalized; carries total content bytes
    Complete(u64),
    /// Foreign frame arrived mid-transfer; the partial file has been removed
    Rejected(Message),
}

/// Receiving side of one chunked transfer
///
/// Ephemeral: construct per transfer, feed every incoming frame through
/// [`FileReceiver::accept`], and drop after completion or rejection.
#[derive(Debug)]
pub struct FileReceiver {
    path: PathBuf,
    file: Option<File>,
    bytes_written: u64,
}

impl FileReceiver {
    /// Open the destination file for writing, creating parent directories
    ///
    /// Failure is a [`ServiceError::FileWrite`], reported back to the sender
    /// without tearing the connection down.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ServiceError::FileWrite(format!("{}: {e}", parent.display())))?;
            }
        }
        let file = File::create(&path)
            .await
            .map_err(|e| ServiceError::FileWrite(format!("{}: {e}", path.display())))?;

        Ok(Self {
            path,
            file: Some(file),
            bytes_written: 0,
        })
    }

    /// The destination path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content bytes written so far
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Feed the next incoming frame into the transfer
    ///
    /// `FILE` frames are appended in arrival order, `END_OF_FILE` finalizes
    /// the destination, and any other kind aborts the transfer (removing the
    /// partial file) and hands the frame back as [`TransferStep::Rejected`].
    pub async fn accept(&mut self, msg: Message) -> Result<TransferStep> {
        match msg.kind {
            MessageKind::File => {
                let file = self
                    .file
                    .as_mut()
                    .ok_or_else(|| ServiceError::Protocol("transfer already finalized".into()))?;
                if let Err(e) = file.write_all(&msg.payload).await {
                    self.abort().await;
                    return Err(ServiceError::FileWrite(format!(
                        "{}: {e}",
                        self.path.display()
                    )));
                }
                self.bytes_written += msg.payload.len() as u64;
                Ok(TransferStep::Continue)
            }
            MessageKind::EndOfFile => {
                if let Some(mut file) = self.file.take() {
                    file.flush()
                        .await
                        .map_err(|e| ServiceError::FileWrite(format!("{}: {e}", self.path.display())))?;
                }
                counter!("remotix.files.received").increment(1);
                histogram!("remotix.files.received_bytes").record(self.bytes_written as f64);
                debug!(path = %self.path.display(), bytes = self.bytes_written, "file received");
                Ok(TransferStep::Complete(self.bytes_written))
            }
            other => {
                warn!(kind = %other, "foreign frame during file transfer, aborting");
                self.abort().await;
                Ok(TransferStep::Rejected(msg))
            }
        }
    }

    async fn abort(&mut self) {
        self.file.take();
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            warn!(path = %self.path.display(), error = %e, "failed to remove partial file");
        }
    }
}

/// Drive a receiver to completion from the connection's receive stream
///
/// Used once the `FILE_UPLOAD` control frame has been routed: reads frames
/// until the sentinel. A foreign frame or a mid-transfer unknown tag aborts
/// with [`ServiceError::Protocol`]; transport failures propagate and the
/// partial file is removed.
pub async fn receive_into(conn: &Connection, receiver: &mut FileReceiver) -> Result<u64> {
    loop {
        let msg = match conn.recv().await {
            Ok(msg) => msg,
            Err(e) => {
                receiver.abort().await;
                if e.is_protocol() {
                    return Err(ServiceError::Protocol(format!(
                        "unreadable frame during file transfer: {e}"
                    )));
                }
                return Err(e);
            }
        };
        match receiver.accept(msg).await? {
            TransferStep::Continue => {}
            TransferStep::Complete(bytes) => return Ok(bytes),
            TransferStep::Rejected(msg) => {
                return Err(ServiceError::Protocol(format!(
                    "unexpected {} during file transfer",
                    msg.kind
                )));
            }
        }
    }
}

/// Resolve the destination path for a received file
///
/// Servers pass the sender's address to land files under a per-client
/// directory (`<root>/<peer-ip>:<peer-port>/<filename>`); clients pass
/// `None` and land files directly under the root at the path carried in the
/// control frame. Absolute paths and parent-directory components are
/// rejected so a peer can never write outside the chosen root.
pub fn resolve_destination(
    root: &Path,
    peer: Option<SocketAddr>,
    filename: &str,
) -> Result<PathBuf> {
    if filename.is_empty() {
        return Err(ServiceError::InvalidFilename("empty filename".into()));
    }

    let relative = Path::new(filename);
    for component in relative.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(ServiceError::InvalidFilename(format!(
                    "path escapes download root: {filename}"
                )));
            }
        }
    }

    let mut path = root.to_path_buf();
    if let Some(peer) = peer {
        path.push(peer.to_string());
    }
    path.push(relative);
    Ok(path)
}
