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

//! Message model for the remotix control protocol

use crate::CodecError;
use bytes::Bytes;
use std::fmt;
use std::net::SocketAddr;

/// Message kind tag as it appears on the wire
///
/// The discriminant values are the protocol; both ends must agree on them.
/// Decoding a byte outside this enumeration fails closed with
/// [`CodecError::UnknownKind`] rather than skipping the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Textual error report; never connection-fatal by itself
    Error = 0x00,
    /// Liveness probe, empty payload
    Heartbeat = 0x01,
    /// Greeting sent by a client after connecting
    Connect = 0x02,
    /// Graceful close request, empty payload
    Disconnect = 0x03,
    /// Opaque text forwarded to the presentation layer
    Echo = 0x04,
    /// Payload is code for the evaluation capability
    Inject = 0x05,
    /// Run the previously injected payload
    Execute = 0x06,
    /// Shell command for the command capability
    Cmd = 0x07,
    /// File-transfer control frame; payload is the destination-relative filename
    FileUpload = 0x08,
    /// Request that the peer send the named file back
    FileDownload = 0x09,
    /// One chunk of file content
    File = 0x0A,
    /// Sentinel terminating a chunked transfer, empty payload
    EndOfFile = 0x0B,
}

impl MessageKind {
    /// All registered kinds, in wire-value order
    pub const ALL: [MessageKind; 12] = [
        MessageKind::Error,
        MessageKind::Heartbeat,
        MessageKind::Connect,
        MessageKind::Disconnect,
        MessageKind::Echo,
        MessageKind::Inject,
        MessageKind::Execute,
        MessageKind::Cmd,
        MessageKind::FileUpload,
        MessageKind::FileDownload,
        MessageKind::File,
        MessageKind::EndOfFile,
    ];

    /// Convert to the wire tag byte
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check if this kind belongs to the file-transfer sub-protocol body
    /// (chunk or sentinel, not the control frames)
    pub fn is_transfer_frame(self) -> bool {
        matches!(self, MessageKind::File | MessageKind::EndOfFile)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, CodecError> {
        match value {
            0x00 => Ok(MessageKind::Error),
            0x01 => Ok(MessageKind::Heartbeat),
            0x02 => Ok(MessageKind::Connect),
            0x03 => Ok(MessageKind::Disconnect),
            0x04 => Ok(MessageKind::Echo),
            0x05 => Ok(MessageKind::Inject),
            0x06 => Ok(MessageKind::Execute),
            0x07 => Ok(MessageKind::Cmd),
            0x08 => Ok(MessageKind::FileUpload),
            0x09 => Ok(MessageKind::FileDownload),
            0x0A => Ok(MessageKind::File),
            0x0B => Ok(MessageKind::EndOfFile),
            other => Err(CodecError::UnknownKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "ERROR"),
            Self::Heartbeat => write!(f, "HEARTBEAT"),
            Self::Connect => write!(f, "CONNECT"),
            Self::Disconnect => write!(f, "DISCONNECT"),
            Self::Echo => write!(f, "ECHO"),
            Self::Inject => write!(f, "INJECT"),
            Self::Execute => write!(f, "EXECUTE"),
            Self::Cmd => write!(f, "CMD"),
            Self::FileUpload => write!(f, "FILE_UPLOAD"),
            Self::FileDownload => write!(f, "FILE_DOWNLOAD"),
            Self::File => write!(f, "FILE"),
            Self::EndOfFile => write!(f, "END_OF_FILE"),
        }
    }
}

/// A typed protocol message
///
/// Immutable value carrying a kind tag and an opaque payload. The `sender`
/// field is stamped by the transport (local address on send, peer address on
/// a successful receive) and is never supplied by the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Message kind tag
    pub kind: MessageKind,
    /// Opaque payload bytes, may be empty
    pub payload: Bytes,
    /// Endpoint address stamped by the transport
    pub sender: Option<SocketAddr>,
}

impl Message {
    /// Create a message with an explicit kind and payload
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
            sender: None,
        }
    }

    /// Create an `ERROR` message carrying the given text
    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Error, text.into().into_bytes())
    }

    /// Create an empty `HEARTBEAT` message
    pub fn heartbeat() -> Self {
        Self::new(MessageKind::Heartbeat, Bytes::new())
    }

    /// Create a `CONNECT` greeting
    pub fn connect(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Connect, text.into().into_bytes())
    }

    /// Create an empty `DISCONNECT` message
    pub fn disconnect() -> Self {
        Self::new(MessageKind::Disconnect, Bytes::new())
    }

    /// Create an `ECHO` message carrying the given text
    pub fn echo(text: impl Into<String>) -> Self {
        Self::new(MessageKind::Echo, text.into().into_bytes())
    }

    /// Create an `INJECT` message carrying code for the evaluation capability
    pub fn inject(code: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::Inject, code)
    }

    /// Create an empty `EXECUTE` message
    pub fn execute() -> Self {
        Self::new(MessageKind::Execute, Bytes::new())
    }

    /// Create a `CMD` message carrying a shell command line
    pub fn cmd(command: impl Into<String>) -> Self {
        Self::new(MessageKind::Cmd, command.into().into_bytes())
    }

    /// Create a `FILE_UPLOAD` control frame naming the destination file
    pub fn file_upload(filename: impl Into<String>) -> Self {
        Self::new(MessageKind::FileUpload, filename.into().into_bytes())
    }

    /// Create a `FILE_DOWNLOAD` request naming the file to send back
    pub fn file_download(filename: impl Into<String>) -> Self {
        Self::new(MessageKind::FileDownload, filename.into().into_bytes())
    }

    /// Create a `FILE` frame carrying one chunk of content
    pub fn file_chunk(chunk: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::File, chunk)
    }

    /// Create the `END_OF_FILE` sentinel
    pub fn end_of_file() -> Self {
        Self::new(MessageKind::EndOfFile, Bytes::new())
    }

    /// Check the message kind
    pub fn is_kind(&self, kind: MessageKind) -> bool {
        self.kind == kind
    }

    /// Stamp the sender address, consuming and returning the message
    pub fn with_sender(mut self, sender: SocketAddr) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Interpret the payload as UTF-8 text, replacing invalid sequences
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Encoded length on the wire, excluding the length prefix
    pub fn encoded_len(&self) -> usize {
        1 + self.payload.len()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({} bytes)", self.kind, self.payload.len())
    }
}
