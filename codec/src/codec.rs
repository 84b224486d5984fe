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

use crate::{CodecError, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE, Message, MessageKind};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// One complete frame as consumed off the wire, tag not yet validated
///
/// `FramedRead` latches closed after any `Decoder` error, so the decoder must
/// not reject unknown tags itself. It hands back the raw frame and the caller
/// validates via [`RawFrame::into_message`], keeping the stream readable past
/// a bad tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Wire tag byte, possibly outside the registered enumeration
    pub tag: u8,
    /// Payload bytes following the tag
    pub payload: Bytes,
}

impl RawFrame {
    /// Validate the tag and convert into a typed [`Message`]
    ///
    /// Fails closed with [`CodecError::UnknownKind`] for unregistered tags;
    /// the frame was already consumed, so the stream stays aligned.
    pub fn into_message(self) -> Result<Message, CodecError> {
        let kind = MessageKind::try_from(self.tag)?;
        Ok(Message {
            kind,
            payload: self.payload,
            sender: None,
        })
    }
}

/// Length-prefixed frame codec
///
/// Encoding writes a 4-byte little-endian length covering the tag byte plus
/// payload, then the tag, then the payload, as one logical write into the
/// destination buffer. Decoding is the exact inverse and refuses to consume
/// input until a full frame is buffered, so partial reads from the underlying
/// stream never surface as partial messages. Decode errors are strictly the
/// transport-fatal framing failures (zero length, oversized length); tag
/// validation happens later, on [`RawFrame::into_message`].
pub struct MessageCodec {
    max_frame_size: usize,
}

impl MessageCodec {
    /// Create a codec with the default maximum frame size
    pub fn new() -> MessageCodec {
        MessageCodec::default()
    }

    /// Create a codec that rejects frames larger than `max_frame_size`
    ///
    /// The limit applies to the encoded message (tag plus payload) and is
    /// enforced on both encode and decode.
    pub fn with_max_frame_size(max_frame_size: usize) -> MessageCodec {
        MessageCodec { max_frame_size }
    }

    /// The configured maximum frame size
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl Decoder for MessageCodec {
    type Item = RawFrame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>, CodecError> {
        if src.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        let mut length_bytes = [0u8; LENGTH_PREFIX_SIZE];
        length_bytes.copy_from_slice(&src[..LENGTH_PREFIX_SIZE]);
        let length = u32::from_le_bytes(length_bytes) as usize;

        if length == 0 {
            return Err(CodecError::EmptyFrame);
        }
        if length > self.max_frame_size {
            return Err(CodecError::Oversized {
                length,
                max: self.max_frame_size,
            });
        }

        if src.len() < LENGTH_PREFIX_SIZE + length {
            src.reserve(LENGTH_PREFIX_SIZE + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_SIZE);
        let frame = src.split_to(length).freeze();
        Ok(Some(RawFrame {
            tag: frame[0],
            payload: frame.slice(1..),
        }))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), CodecError> {
        let length = msg.encoded_len();
        if length > self.max_frame_size {
            return Err(CodecError::Oversized {
                length,
                max: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_PREFIX_SIZE + length);
        dst.put_u32_le(length as u32);
        dst.put_u8(msg.kind.as_u8());
        dst.put_slice(&msg.payload);
        Ok(())
    }
}
