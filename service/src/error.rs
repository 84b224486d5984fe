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

//! Error types for the remotix service layer

use remotix_codec::CodecError;
use std::net::SocketAddr;
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Service layer error types
///
/// The taxonomy matters for session lifecycle: transport-fatal errors tear a
/// connection down and remove it from the registry; everything else is
/// converted to an `ERROR` message and the session continues.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// I/O error from the underlying TCP stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error from the codec layer
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection has been closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// Message received out of the expected sequence
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// Failed to read a local file for sending
    #[error("Failed to read file: {0}")]
    FileRead(String),

    /// Failed to write a received file
    #[error("Failed to write file: {0}")]
    FileWrite(String),

    /// A host-supplied capability failed or panicked
    #[error("Handler failed: {0}")]
    Handler(String),

    /// No connected client registered under the given address
    #[error("Client {0} not found")]
    ClientNotFound(SocketAddr),

    /// Rejected filename (empty, absolute, or escaping the download root)
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// Server is already running
    #[error("Server already running")]
    AlreadyRunning,

    /// Server is not running
    #[error("Server not running")]
    ServerNotRunning,
}

impl ServiceError {
    /// Check if the error is transport-fatal
    ///
    /// Transport-fatal errors mean the byte stream can no longer be trusted;
    /// the connection must be closed and unregistered.
    pub fn is_transport_fatal(&self) -> bool {
        match self {
            ServiceError::Io(_) | ServiceError::ConnectionClosed => true,
            ServiceError::Codec(e) => e.is_fatal(),
            _ => false,
        }
    }

    /// Check if the error is a protocol violation on an aligned stream
    pub fn is_protocol(&self) -> bool {
        match self {
            ServiceError::Protocol(_) => true,
            ServiceError::Codec(e) => !e.is_fatal(),
            _ => false,
        }
    }

    /// Check if the error is a local file I/O failure
    pub fn is_local_io(&self) -> bool {
        matches!(
            self,
            ServiceError::FileRead(_)
                | ServiceError::FileWrite(_)
                | ServiceError::InvalidFilename(_)
        )
    }
}
