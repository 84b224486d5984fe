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

//! Client error types

use remotix_service::ServiceError;
use std::io;
use thiserror::Error;

/// Client error type
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// Connection timeout
    #[error("connection timeout")]
    ConnectionTimeout,

    /// Connection refused by the server
    #[error("connection refused")]
    ConnectionRefused,

    /// Connection closed by the server
    #[error("connection closed by server")]
    ConnectionClosed,

    /// Protocol violation reported by the transport
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure inside the service layer
    #[error("service error: {0}")]
    Service(String),

    /// Connect called while a connection is active
    #[error("already connected")]
    AlreadyConnected,

    /// Operation requires an active connection
    #[error("not connected")]
    NotConnected,

    /// Reconnection gave up
    #[error("reconnection failed after {0} attempts")]
    ReconnectionFailed(usize),
}

impl From<io::Error> for ClientError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Self::ConnectionTimeout,
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused,
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => Self::ConnectionClosed,
            _ => Self::Io(error.to_string()),
        }
    }
}

impl From<ServiceError> for ClientError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::ConnectionClosed => Self::ConnectionClosed,
            ServiceError::Io(e) => e.into(),
            ServiceError::Protocol(msg) => Self::Protocol(msg),
            other => Self::Service(other.to_string()),
        }
    }
}

/// Client result type
pub type Result<T> = std::result::Result<T, ClientError>;
