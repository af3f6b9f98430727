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

//! The wire message model.
//!
//! Every message carries a request correlation id and one of six payload variants, tagged on the
//! wire by [`MessageType`]. Requests and responses for the three protocol families (RPC calls,
//! topic operations, service registry operations) share the same frame format and differ only in
//! their JSON body fields.

use std::{
    convert::TryFrom,
    fmt,
    net::{IpAddr, SocketAddr},
};

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

mod payload;
pub use payload::{
    Payload,
    RpcRequest,
    RpcResponse,
    ServiceRequest,
    ServiceResponse,
    TopicRequest,
    TopicResponse,
};

/// JSON body field names.
pub(crate) mod field {
    pub const METHOD: &str = "method";
    pub const PARAMS: &str = "parameters";
    pub const TOPIC_KEY: &str = "topic_key";
    pub const TOPIC_MSG: &str = "topic_msg";
    pub const OPTYPE: &str = "optype";
    pub const HOST: &str = "host";
    pub const RCODE: &str = "retcode";
    pub const RESULT: &str = "result";
}

/// The message type tag carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    RpcRequest,
    RpcResponse,
    TopicRequest,
    TopicResponse,
    ServiceRequest,
    ServiceResponse,
}

impl MessageType {
    pub fn as_u32(self) -> u32 {
        match self {
            MessageType::RpcRequest => 0,
            MessageType::RpcResponse => 1,
            MessageType::TopicRequest => 2,
            MessageType::TopicResponse => 3,
            MessageType::ServiceRequest => 4,
            MessageType::ServiceResponse => 5,
        }
    }
}

impl TryFrom<u32> for MessageType {
    type Error = MessageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::RpcRequest),
            1 => Ok(MessageType::RpcResponse),
            2 => Ok(MessageType::TopicRequest),
            3 => Ok(MessageType::TopicResponse),
            4 => Ok(MessageType::ServiceRequest),
            5 => Ok(MessageType::ServiceResponse),
            v => Err(MessageError::UnknownEnumValue("message type", u64::from(v))),
        }
    }
}

/// Result code carried by every response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetCode {
    Ok,
    ParseFailed,
    InvalidMsg,
    Disconnected,
    InvalidParam,
    InvalidOpType,
    NotFoundService,
    NotFoundTopic,
    InternalError,
}

impl RetCode {
    pub fn as_u32(self) -> u32 {
        match self {
            RetCode::Ok => 0,
            RetCode::ParseFailed => 1,
            RetCode::InvalidMsg => 2,
            RetCode::Disconnected => 3,
            RetCode::InvalidParam => 4,
            RetCode::InvalidOpType => 5,
            RetCode::NotFoundService => 6,
            RetCode::NotFoundTopic => 7,
            RetCode::InternalError => 8,
        }
    }

    /// A human readable reason for the code.
    pub fn reason(self) -> &'static str {
        match self {
            RetCode::Ok => "success",
            RetCode::ParseFailed => "message parse failed",
            RetCode::InvalidMsg => "invalid message",
            RetCode::Disconnected => "connection disconnected",
            RetCode::InvalidParam => "invalid rpc parameters",
            RetCode::InvalidOpType => "invalid operation type",
            RetCode::NotFoundService => "service not found",
            RetCode::NotFoundTopic => "topic not found",
            RetCode::InternalError => "internal service error",
        }
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason())
    }
}

impl TryFrom<u32> for RetCode {
    type Error = MessageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RetCode::Ok),
            1 => Ok(RetCode::ParseFailed),
            2 => Ok(RetCode::InvalidMsg),
            3 => Ok(RetCode::Disconnected),
            4 => Ok(RetCode::InvalidParam),
            5 => Ok(RetCode::InvalidOpType),
            6 => Ok(RetCode::NotFoundService),
            7 => Ok(RetCode::NotFoundTopic),
            8 => Ok(RetCode::InternalError),
            v => Err(MessageError::UnknownEnumValue("retcode", u64::from(v))),
        }
    }
}

/// Operation carried by a topic request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicOpType {
    Create,
    Remove,
    Subscribe,
    Cancel,
    Publish,
}

impl TopicOpType {
    pub fn as_u32(self) -> u32 {
        match self {
            TopicOpType::Create => 0,
            TopicOpType::Remove => 1,
            TopicOpType::Subscribe => 2,
            TopicOpType::Cancel => 3,
            TopicOpType::Publish => 4,
        }
    }
}

impl TryFrom<u32> for TopicOpType {
    type Error = MessageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TopicOpType::Create),
            1 => Ok(TopicOpType::Remove),
            2 => Ok(TopicOpType::Subscribe),
            3 => Ok(TopicOpType::Cancel),
            4 => Ok(TopicOpType::Publish),
            v => Err(MessageError::UnknownEnumValue("topic optype", u64::from(v))),
        }
    }
}

/// Operation carried by a service request or response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOpType {
    Registry,
    Discover,
    Online,
    Outline,
    Unknown,
}

impl ServiceOpType {
    pub fn as_u32(self) -> u32 {
        match self {
            ServiceOpType::Registry => 0,
            ServiceOpType::Discover => 1,
            ServiceOpType::Online => 2,
            ServiceOpType::Outline => 3,
            ServiceOpType::Unknown => 4,
        }
    }
}

impl TryFrom<u32> for ServiceOpType {
    type Error = MessageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServiceOpType::Registry),
            1 => Ok(ServiceOpType::Discover),
            2 => Ok(ServiceOpType::Online),
            3 => Ok(ServiceOpType::Outline),
            4 => Ok(ServiceOpType::Unknown),
            v => Err(MessageError::UnknownEnumValue("service optype", u64::from(v))),
        }
    }
}

/// An RPC endpoint address as it appears on the wire. Addresses compare and hash by value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddress {
    pub ip: String,
    pub port: u16,
}

impl HostAddress {
    pub fn new<T: Into<String>>(ip: T, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }

    /// Interprets the address as a socket address. Fails if `ip` is not an IP literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip
            .parse::<IpAddr>()
            .ok()
            .map(|ip| SocketAddr::new(ip, self.port))
    }
}

impl From<SocketAddr> for HostAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Raised when a message body does not satisfy the field rules of its variant.
#[derive(Debug, Error, PartialEq)]
pub enum MessageError {
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("field '{0}' should be of type {1}")]
    InvalidFieldType(&'static str, &'static str),
    #[error("value {1} is not a valid {0}")]
    UnknownEnumValue(&'static str, u64),
}

/// A decoded wire message: a request correlation id plus one typed payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    rid: String,
    payload: Payload,
}

impl Message {
    pub fn new<T: Into<Payload>>(rid: String, payload: T) -> Self {
        Self {
            rid,
            payload: payload.into(),
        }
    }

    pub fn rid(&self) -> &str {
        &self.rid
    }

    pub fn mtype(&self) -> MessageType {
        self.payload.mtype()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_parts(self) -> (String, Payload) {
        (self.rid, self.payload)
    }
}

/// Implemented by each payload struct. Ties the struct to its [`MessageType`] tag and provides
/// refinement from and conversion into a whole [`Message`].
pub trait MessageVariant: Into<Payload> + Sized {
    const MTYPE: MessageType;

    fn from_payload(payload: Payload) -> Option<Self>;

    fn from_message(msg: Message) -> Option<(String, Self)> {
        let (rid, payload) = msg.into_parts();
        Self::from_payload(payload).map(|variant| (rid, variant))
    }

    fn into_message(self, rid: String) -> Message {
        Message::new(rid, self)
    }
}
