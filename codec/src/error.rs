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

//! Error types for codec operations

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors raised while encoding or decoding frames
#[derive(Debug, Error)]
pub enum CodecError {
    /// I/O error from the underlying byte stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Tag byte that is not part of the registered enumeration
    ///
    /// The frame has been fully consumed when this is raised, so the stream
    /// stays aligned and the session may continue.
    #[error("Unknown message kind 0x{0:02X}")]
    UnknownKind(u8),

    /// Length prefix of zero
    ///
    /// A zero length can never frame a valid message (every message carries
    /// at least the tag byte); the peer has closed or the stream is corrupt.
    #[error("Zero-length frame")]
    EmptyFrame,

    /// Length prefix above the configured maximum
    ///
    /// Framing cannot be trusted past this point; the connection must be
    /// torn down.
    #[error("Frame of {length} bytes exceeds maximum of {max}")]
    Oversized {
        /// Declared frame length
        length: usize,
        /// Configured maximum
        max: usize,
    },
}

impl CodecError {
    /// Check whether the error leaves the stream desynchronized
    ///
    /// Fatal errors require the connection to be torn down; an
    /// [`CodecError::UnknownKind`] is raised on an aligned stream and the
    /// session may continue past it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CodecError::UnknownKind(_))
    }
}
