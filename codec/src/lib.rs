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

//! # Remotix Codec
//!
//! Wire framing and message model for the remotix control protocol.
//!
//! Every frame on the wire has the shape:
//!
//! ```text
//! [4 bytes, little-endian, unsigned] = N  (length of the following N bytes)
//! [1 byte]                           = message kind tag
//! [N-1 bytes]                        = payload (may be zero-length)
//! ```
//!
//! The length prefix covers the encoded message (tag plus payload), never
//! the payload alone. Both sides must agree on this: once framing is
//! desynchronized the stream cannot be recovered and the connection has to
//! be torn down.
//!
//! [`MessageCodec`] implements the tokio-util [`Decoder`]/[`Encoder`] pair
//! so it can be driven by `FramedRead`/`FramedWrite` over any byte stream.
//! Decoding yields a [`RawFrame`] whose tag has not been checked yet; the
//! caller converts it with [`RawFrame::into_message`]. An unknown tag is
//! therefore a per-frame failure, never a decoder error that would latch the
//! framed stream closed.
//!
//! ```
//! use bytes::BytesMut;
//! use remotix_codec::{Message, MessageCodec};
//! use tokio_util::codec::{Decoder, Encoder};
//!
//! let mut codec = MessageCodec::new();
//! let mut buffer = BytesMut::new();
//! codec.encode(Message::echo("ping"), &mut buffer).unwrap();
//! let decoded = codec.decode(&mut buffer).unwrap().unwrap().into_message().unwrap();
//! assert_eq!(decoded.payload.as_ref(), b"ping");
//! ```
//!
//! [`Decoder`]: tokio_util::codec::Decoder
//! [`Encoder`]: tokio_util::codec::Encoder

mod codec;
mod error;
mod message;

pub use codec::{MessageCodec, RawFrame};
pub use error::{CodecError, CodecResult};
pub use message::{Message, MessageKind};

/// Size of the frame length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default size of a single file-transfer chunk (5 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

/// Default maximum accepted frame size: one full file chunk plus the tag
/// byte and some slack for control payloads
pub const DEFAULT_MAX_FRAME_SIZE: usize = DEFAULT_CHUNK_SIZE + 1024;
