// Copyright 2022. The Tari Project
//
// Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
// following conditions are met:
//
// 1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
// disclaimer.
//
// 2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
// following disclaimer in the documentation and/or other materials provided with the distribution.
//
// 3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
// products derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
// INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
// DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
// SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
// SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
// WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
// USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

//! Length-value framing for wire messages.
//!
//! A frame is laid out as `| totalLen | mtype | idLen | id | body |` where the three integer
//! fields are unsigned 32-bit big-endian and `totalLen` counts everything after itself. The body
//! is a UTF-8 JSON document validated against the field rules of the message variant.
//!
//! [`MessageCodec`] implements [`Decoder`] and [`Encoder`], so the reader side naturally handles
//! partial input (a frame split across TCP segments yields `Ok(None)` and leaves the buffer
//! untouched) and any protocol violation surfaces as an error that tears the connection down.

use std::{convert::TryFrom, io};

use bytes::{Buf, BufMut, BytesMut};
use serde_json::Value;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use crate::message::{Message, MessageError, MessageType, Payload};

/// The default upper bound on a whole frame, header included.
pub const MAX_FRAME_SIZE: usize = 65_536;

const LEN_FIELD_SIZE: usize = 4;
const MTYPE_FIELD_SIZE: usize = 4;
const ID_LEN_FIELD_SIZE: usize = 4;
const HEADER_FIELDS_SIZE: usize = MTYPE_FIELD_SIZE + ID_LEN_FIELD_SIZE;

/// Raised while encoding or decoding frames. Any decode error shuts the connection down.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("frame length {frame_len} exceeds the maximum frame size {max}")]
    MaxFrameSizeExceeded { frame_len: usize, max: usize },
    #[error("corrupt frame header: {0}")]
    CorruptFrame(&'static str),
    #[error("failed to parse message body: {0}")]
    ParseFailed(#[from] serde_json::Error),
    #[error("unknown message type {0}")]
    UnknownMessageType(u32),
    #[error("invalid message: {0}")]
    InvalidMessage(#[from] MessageError),
}

/// Frame codec used on both ends of a connection.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_frame_size: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl Decoder for MessageCodec {
    type Error = ProtocolError;
    type Item = Message;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, Self::Error> {
        if src.len() < LEN_FIELD_SIZE {
            return Ok(None);
        }

        let mut header = &src[..];
        let total_len = header.get_u32() as usize;
        let frame_len = total_len + LEN_FIELD_SIZE;
        if frame_len > self.max_frame_size {
            return Err(ProtocolError::MaxFrameSizeExceeded {
                frame_len,
                max: self.max_frame_size,
            });
        }
        if total_len < HEADER_FIELDS_SIZE {
            return Err(ProtocolError::CorruptFrame("total length too short for the header"));
        }
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_len);
        frame.advance(LEN_FIELD_SIZE);
        let mtype_raw = frame.get_u32();
        let id_len = frame.get_u32() as usize;
        if id_len > total_len - HEADER_FIELDS_SIZE {
            return Err(ProtocolError::CorruptFrame("id length exceeds the frame"));
        }

        let rid = String::from_utf8(frame.split_to(id_len).to_vec())
            .map_err(|_| ProtocolError::CorruptFrame("request id is not valid utf-8"))?;
        let mtype = MessageType::try_from(mtype_raw).map_err(|_| ProtocolError::UnknownMessageType(mtype_raw))?;
        let body: Value = serde_json::from_slice(&frame)?;
        let payload = Payload::from_value(mtype, &body)?;

        Ok(Some(Message::new(rid, payload)))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mtype = msg.mtype();
        let (rid, payload) = msg.into_parts();
        let body = payload.to_value().to_string();

        let total_len = HEADER_FIELDS_SIZE + rid.len() + body.len();
        let frame_len = total_len + LEN_FIELD_SIZE;
        if frame_len > self.max_frame_size {
            return Err(ProtocolError::MaxFrameSizeExceeded {
                frame_len,
                max: self.max_frame_size,
            });
        }

        dst.reserve(frame_len);
        dst.put_u32(total_len as u32);
        dst.put_u32(mtype.as_u32());
        dst.put_u32(rid.len() as u32);
        dst.put_slice(rid.as_bytes());
        dst.put_slice(body.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;
    use crate::message::{HostAddress, RetCode, RpcRequest, RpcResponse, ServiceRequest, TopicRequest};

    fn encode(msg: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        MessageCodec::new().encode(msg, &mut buf).unwrap();
        buf
    }

    #[test]
    fn decode_encode_roundtrip() {
        let mut params = serde_json::Map::new();
        params.insert("num1".to_string(), json!(11));
        let messages = vec![
            Message::new("rid-1".to_string(), RpcRequest::new("Add", params)),
            Message::new("rid-2".to_string(), RpcResponse::ok(json!(33))),
            Message::new("rid-3".to_string(), TopicRequest::publish("hello", "hello0")),
            Message::new(
                "rid-4".to_string(),
                ServiceRequest::registry("Add", HostAddress::new("127.0.0.1", 6666)),
            ),
        ];
        for msg in messages {
            let mut buf = encode(msg.clone());
            let decoded = MessageCodec::new().decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, msg);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn partial_frames_are_not_consumed() {
        let full = encode(Message::new("rid-1".to_string(), RpcResponse::ok(json!(42))));
        let mut codec = MessageCodec::new();

        // Feed the frame one byte at a time. Nothing decodes until the last byte lands.
        let mut buf = BytesMut::new();
        for (i, byte) in full.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < full.len() {
                assert!(decoded.is_none());
            } else {
                assert!(decoded.is_some());
            }
        }
    }

    #[test]
    fn two_frames_in_one_buffer_decode_in_order() {
        let mut buf = encode(Message::new("a".to_string(), RpcResponse::ok(json!(1))));
        buf.extend_from_slice(&encode(Message::new("b".to_string(), RpcResponse::ok(json!(2)))));

        let mut codec = MessageCodec::new();
        let first = codec.decode(&mut buf).unwrap().unwrap();
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.rid(), "a");
        assert_eq!(second.rid(), "b");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let msg = Message::new("rid-1".to_string(), RpcResponse::ok(json!("x".repeat(512))));
        let mut buf = encode(msg.clone());
        let mut codec = MessageCodec::with_max_frame_size(64);
        match codec.decode(&mut buf) {
            Err(ProtocolError::MaxFrameSizeExceeded { max: 64, .. }) => {},
            other => panic!("unexpected decode outcome: {:?}", other),
        }

        let mut buf = BytesMut::new();
        match MessageCodec::with_max_frame_size(64).encode(msg, &mut buf) {
            Err(ProtocolError::MaxFrameSizeExceeded { max: 64, .. }) => {},
            other => panic!("unexpected encode outcome: {:?}", other),
        }
    }

    #[test]
    fn unknown_mtype_is_rejected() {
        let mut buf = encode(Message::new("rid-1".to_string(), RpcResponse::ok(json!(1))));
        // Overwrite the mtype field with a tag that does not exist.
        buf[4..8].copy_from_slice(&99u32.to_be_bytes());
        match MessageCodec::new().decode(&mut buf) {
            Err(ProtocolError::UnknownMessageType(99)) => {},
            other => panic!("unexpected decode outcome: {:?}", other),
        }
    }

    #[test]
    fn id_length_overflowing_the_frame_is_rejected() {
        let mut buf = encode(Message::new("rid-1".to_string(), RpcResponse::ok(json!(1))));
        buf[8..12].copy_from_slice(&10_000u32.to_be_bytes());
        match MessageCodec::new().decode(&mut buf) {
            Err(ProtocolError::CorruptFrame(_)) => {},
            other => panic!("unexpected decode outcome: {:?}", other),
        }
    }

    #[test]
    fn garbage_body_fails_to_parse() {
        let rid = "rid-1";
        let body = b"{ not json";
        let mut buf = BytesMut::new();
        buf.put_u32((HEADER_FIELDS_SIZE + rid.len() + body.len()) as u32);
        buf.put_u32(MessageType::RpcResponse.as_u32());
        buf.put_u32(rid.len() as u32);
        buf.put_slice(rid.as_bytes());
        buf.put_slice(body);
        match MessageCodec::new().decode(&mut buf) {
            Err(ProtocolError::ParseFailed(_)) => {},
            other => panic!("unexpected decode outcome: {:?}", other),
        }
    }

    #[test]
    fn body_violating_field_rules_is_rejected() {
        let rid = "rid-1";
        let body = br#"{"method": 42, "parameters": {}}"#;
        let mut buf = BytesMut::new();
        buf.put_u32((HEADER_FIELDS_SIZE + rid.len() + body.len()) as u32);
        buf.put_u32(MessageType::RpcRequest.as_u32());
        buf.put_u32(rid.len() as u32);
        buf.put_slice(rid.as_bytes());
        buf.put_slice(body);
        match MessageCodec::new().decode(&mut buf) {
            Err(ProtocolError::InvalidMessage(_)) => {},
            other => panic!("unexpected decode outcome: {:?}", other),
        }
    }

    #[test]
    fn retcodes_map_to_reasons() {
        assert_eq!(RetCode::NotFoundTopic.reason(), "topic not found");
        assert_eq!(RetCode::try_from(6).unwrap(), RetCode::NotFoundService);
        assert!(RetCode::try_from(42).is_err());
    }
}
