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

use std::convert::TryFrom;

use serde_json::{json, Map, Value};

use super::{field, HostAddress, MessageError, MessageType, MessageVariant, RetCode, ServiceOpType, TopicOpType};

/// An RPC method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub method: String,
    pub params: Map<String, Value>,
}

impl RpcRequest {
    pub fn new<T: Into<String>>(method: T, params: Map<String, Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// The reply to an RPC method invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub rcode: RetCode,
    pub result: Value,
}

impl RpcResponse {
    pub fn ok(result: Value) -> Self {
        Self {
            rcode: RetCode::Ok,
            result,
        }
    }

    pub fn error(rcode: RetCode) -> Self {
        Self {
            rcode,
            result: Value::Null,
        }
    }
}

/// A topic operation. `msg` is carried only when the operation publishes.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRequest {
    pub key: String,
    pub op: TopicOpType,
    pub msg: Option<String>,
}

impl TopicRequest {
    pub fn new<T: Into<String>>(key: T, op: TopicOpType) -> Self {
        Self {
            key: key.into(),
            op,
            msg: None,
        }
    }

    pub fn publish<T: Into<String>, M: Into<String>>(key: T, msg: M) -> Self {
        Self {
            key: key.into(),
            op: TopicOpType::Publish,
            msg: Some(msg.into()),
        }
    }
}

/// The reply to a topic operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicResponse {
    pub rcode: RetCode,
}

impl TopicResponse {
    pub fn new(rcode: RetCode) -> Self {
        Self { rcode }
    }
}

/// A service registry operation. `host` is carried by every operation except discovery.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceRequest {
    pub method: String,
    pub op: ServiceOpType,
    pub host: Option<HostAddress>,
}

impl ServiceRequest {
    pub fn registry<T: Into<String>>(method: T, host: HostAddress) -> Self {
        Self {
            method: method.into(),
            op: ServiceOpType::Registry,
            host: Some(host),
        }
    }

    pub fn discover<T: Into<String>>(method: T) -> Self {
        Self {
            method: method.into(),
            op: ServiceOpType::Discover,
            host: None,
        }
    }

    pub fn notification<T: Into<String>>(method: T, op: ServiceOpType, host: HostAddress) -> Self {
        Self {
            method: method.into(),
            op,
            host: Some(host),
        }
    }
}

/// The reply to a service registry operation. A successful discovery carries the method name and
/// the provider host list.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceResponse {
    pub rcode: RetCode,
    pub op: ServiceOpType,
    pub method: Option<String>,
    pub hosts: Option<Vec<HostAddress>>,
}

impl ServiceResponse {
    pub fn new(rcode: RetCode, op: ServiceOpType) -> Self {
        Self {
            rcode,
            op,
            method: None,
            hosts: None,
        }
    }

    pub fn discovered<T: Into<String>>(method: T, hosts: Vec<HostAddress>) -> Self {
        Self {
            rcode: RetCode::Ok,
            op: ServiceOpType::Discover,
            method: Some(method.into()),
            hosts: Some(hosts),
        }
    }
}

/// The payload of a wire message, tagged by [`MessageType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    RpcRequest(RpcRequest),
    RpcResponse(RpcResponse),
    TopicRequest(TopicRequest),
    TopicResponse(TopicResponse),
    ServiceRequest(ServiceRequest),
    ServiceResponse(ServiceResponse),
}

impl Payload {
    pub fn mtype(&self) -> MessageType {
        match self {
            Payload::RpcRequest(_) => MessageType::RpcRequest,
            Payload::RpcResponse(_) => MessageType::RpcResponse,
            Payload::TopicRequest(_) => MessageType::TopicRequest,
            Payload::TopicResponse(_) => MessageType::TopicResponse,
            Payload::ServiceRequest(_) => MessageType::ServiceRequest,
            Payload::ServiceResponse(_) => MessageType::ServiceResponse,
        }
    }

    /// Builds the payload for `mtype` from a parsed JSON body, enforcing the field rules of the
    /// variant.
    pub fn from_value(mtype: MessageType, body: &Value) -> Result<Self, MessageError> {
        match mtype {
            MessageType::RpcRequest => {
                let method = require_str(body, field::METHOD)?;
                let params = require_object(body, field::PARAMS)?;
                Ok(Payload::RpcRequest(RpcRequest {
                    method: method.to_string(),
                    params: params.clone(),
                }))
            },
            MessageType::RpcResponse => {
                let rcode = require_ret_code(body)?;
                let result = body.get(field::RESULT).cloned().unwrap_or(Value::Null);
                Ok(Payload::RpcResponse(RpcResponse { rcode, result }))
            },
            MessageType::TopicRequest => {
                let key = require_str(body, field::TOPIC_KEY)?.to_string();
                let op = TopicOpType::try_from(require_u32(body, field::OPTYPE)?)?;
                let msg = if op == TopicOpType::Publish {
                    Some(require_str(body, field::TOPIC_MSG)?.to_string())
                } else {
                    body.get(field::TOPIC_MSG).and_then(Value::as_str).map(str::to_string)
                };
                Ok(Payload::TopicRequest(TopicRequest { key, op, msg }))
            },
            MessageType::TopicResponse => {
                let rcode = require_ret_code(body)?;
                Ok(Payload::TopicResponse(TopicResponse { rcode }))
            },
            MessageType::ServiceRequest => {
                let method = require_str(body, field::METHOD)?.to_string();
                let op = ServiceOpType::try_from(require_u32(body, field::OPTYPE)?)?;
                let host = if op == ServiceOpType::Discover {
                    opt_host(body)?
                } else {
                    Some(require_host(body)?)
                };
                Ok(Payload::ServiceRequest(ServiceRequest { method, op, host }))
            },
            MessageType::ServiceResponse => {
                let rcode = require_ret_code(body)?;
                let op = ServiceOpType::try_from(require_u32(body, field::OPTYPE)?)?;
                let (method, hosts) = if op == ServiceOpType::Discover && rcode == RetCode::Ok {
                    (
                        Some(require_str(body, field::METHOD)?.to_string()),
                        Some(require_hosts(body)?),
                    )
                } else {
                    (
                        body.get(field::METHOD).and_then(Value::as_str).map(str::to_string),
                        None,
                    )
                };
                Ok(Payload::ServiceResponse(ServiceResponse {
                    rcode,
                    op,
                    method,
                    hosts,
                }))
            },
        }
    }

    /// Serializes the payload into its JSON body.
    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        match self {
            Payload::RpcRequest(req) => {
                body.insert(field::METHOD.to_string(), json!(req.method));
                body.insert(field::PARAMS.to_string(), Value::Object(req.params.clone()));
            },
            Payload::RpcResponse(rsp) => {
                body.insert(field::RCODE.to_string(), json!(rsp.rcode.as_u32()));
                body.insert(field::RESULT.to_string(), rsp.result.clone());
            },
            Payload::TopicRequest(req) => {
                body.insert(field::TOPIC_KEY.to_string(), json!(req.key));
                body.insert(field::OPTYPE.to_string(), json!(req.op.as_u32()));
                if let Some(msg) = &req.msg {
                    body.insert(field::TOPIC_MSG.to_string(), json!(msg));
                }
            },
            Payload::TopicResponse(rsp) => {
                body.insert(field::RCODE.to_string(), json!(rsp.rcode.as_u32()));
            },
            Payload::ServiceRequest(req) => {
                body.insert(field::METHOD.to_string(), json!(req.method));
                body.insert(field::OPTYPE.to_string(), json!(req.op.as_u32()));
                if let Some(host) = &req.host {
                    body.insert(field::HOST.to_string(), json!(host));
                }
            },
            Payload::ServiceResponse(rsp) => {
                body.insert(field::RCODE.to_string(), json!(rsp.rcode.as_u32()));
                body.insert(field::OPTYPE.to_string(), json!(rsp.op.as_u32()));
                if let Some(method) = &rsp.method {
                    body.insert(field::METHOD.to_string(), json!(method));
                }
                if let Some(hosts) = &rsp.hosts {
                    body.insert(field::HOST.to_string(), json!(hosts));
                }
            },
        }
        Value::Object(body)
    }
}

macro_rules! impl_message_variant {
    ($variant:ident) => {
        impl From<$variant> for Payload {
            fn from(payload: $variant) -> Self {
                Payload::$variant(payload)
            }
        }

        impl MessageVariant for $variant {
            const MTYPE: MessageType = MessageType::$variant;

            fn from_payload(payload: Payload) -> Option<Self> {
                match payload {
                    Payload::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_message_variant!(RpcRequest);
impl_message_variant!(RpcResponse);
impl_message_variant!(TopicRequest);
impl_message_variant!(TopicResponse);
impl_message_variant!(ServiceRequest);
impl_message_variant!(ServiceResponse);

// A null field counts as absent, as does a missing key.
fn require<'a>(body: &'a Value, key: &'static str) -> Result<&'a Value, MessageError> {
    match body.get(key) {
        Some(value) if !value.is_null() => Ok(value),
        _ => Err(MessageError::MissingField(key)),
    }
}

fn require_str<'a>(body: &'a Value, key: &'static str) -> Result<&'a str, MessageError> {
    require(body, key)?
        .as_str()
        .ok_or(MessageError::InvalidFieldType(key, "string"))
}

fn require_u32(body: &Value, key: &'static str) -> Result<u32, MessageError> {
    require(body, key)?
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or(MessageError::InvalidFieldType(key, "integer"))
}

fn require_object<'a>(body: &'a Value, key: &'static str) -> Result<&'a Map<String, Value>, MessageError> {
    require(body, key)?
        .as_object()
        .ok_or(MessageError::InvalidFieldType(key, "object"))
}

fn require_ret_code(body: &Value) -> Result<RetCode, MessageError> {
    RetCode::try_from(require_u32(body, field::RCODE)?)
}

fn require_host(body: &Value) -> Result<HostAddress, MessageError> {
    let value = require(body, field::HOST)?;
    serde_json::from_value(value.clone()).map_err(|_| MessageError::InvalidFieldType(field::HOST, "host object"))
}

fn opt_host(body: &Value) -> Result<Option<HostAddress>, MessageError> {
    match body.get(field::HOST) {
        Some(value) if !value.is_null() => Ok(Some(
            serde_json::from_value(value.clone())
                .map_err(|_| MessageError::InvalidFieldType(field::HOST, "host object"))?,
        )),
        _ => Ok(None),
    }
}

fn require_hosts(body: &Value) -> Result<Vec<HostAddress>, MessageError> {
    let values = require(body, field::HOST)?
        .as_array()
        .ok_or(MessageError::InvalidFieldType(field::HOST, "array"))?;
    values
        .iter()
        .map(|value| {
            serde_json::from_value(value.clone())
                .map_err(|_| MessageError::InvalidFieldType(field::HOST, "host object"))
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn roundtrip(payload: Payload) -> Payload {
        let mtype = payload.mtype();
        let body = payload.to_value();
        Payload::from_value(mtype, &body).unwrap()
    }

    #[test]
    fn rpc_request_roundtrips() {
        let mut params = Map::new();
        params.insert("num1".to_string(), json!(11));
        params.insert("num2".to_string(), json!(22));
        let payload = Payload::RpcRequest(RpcRequest::new("Add", params));
        assert_eq!(roundtrip(payload.clone()), payload);
    }

    #[test]
    fn topic_publish_roundtrips() {
        let payload = Payload::TopicRequest(TopicRequest::publish("hello", "hello0"));
        assert_eq!(roundtrip(payload.clone()), payload);
    }

    #[test]
    fn discover_response_roundtrips() {
        let hosts = vec![HostAddress::new("127.0.0.1", 6666), HostAddress::new("127.0.0.1", 6667)];
        let payload = Payload::ServiceResponse(ServiceResponse::discovered("Add", hosts));
        assert_eq!(roundtrip(payload.clone()), payload);
    }

    #[test]
    fn rpc_request_requires_params_object() {
        let body = json!({ "method": "Add" });
        let err = Payload::from_value(MessageType::RpcRequest, &body).unwrap_err();
        assert_eq!(err, MessageError::MissingField(field::PARAMS));

        let body = json!({ "method": "Add", "parameters": [1, 2] });
        let err = Payload::from_value(MessageType::RpcRequest, &body).unwrap_err();
        assert_eq!(err, MessageError::InvalidFieldType(field::PARAMS, "object"));
    }

    #[test]
    fn rpc_response_result_defaults_to_null() {
        let body = json!({ "retcode": 0 });
        let payload = Payload::from_value(MessageType::RpcResponse, &body).unwrap();
        assert_eq!(payload, Payload::RpcResponse(RpcResponse::ok(Value::Null)));
    }

    #[test]
    fn publish_requires_topic_msg() {
        let body = json!({ "topic_key": "hello", "optype": TopicOpType::Publish.as_u32() });
        let err = Payload::from_value(MessageType::TopicRequest, &body).unwrap_err();
        assert_eq!(err, MessageError::MissingField(field::TOPIC_MSG));

        let body = json!({ "topic_key": "hello", "optype": TopicOpType::Subscribe.as_u32() });
        Payload::from_value(MessageType::TopicRequest, &body).unwrap();
    }

    #[test]
    fn unknown_topic_optype_is_rejected() {
        let body = json!({ "topic_key": "hello", "optype": 9 });
        let err = Payload::from_value(MessageType::TopicRequest, &body).unwrap_err();
        assert_eq!(err, MessageError::UnknownEnumValue("topic optype", 9));
    }

    #[test]
    fn service_request_requires_host_except_discover() {
        let body = json!({ "method": "Add", "optype": ServiceOpType::Registry.as_u32() });
        let err = Payload::from_value(MessageType::ServiceRequest, &body).unwrap_err();
        assert_eq!(err, MessageError::MissingField(field::HOST));

        let body = json!({ "method": "Add", "optype": ServiceOpType::Discover.as_u32() });
        Payload::from_value(MessageType::ServiceRequest, &body).unwrap();
    }

    #[test]
    fn service_request_rejects_malformed_host() {
        let body = json!({
            "method": "Add",
            "optype": ServiceOpType::Registry.as_u32(),
            "host": { "ip": "127.0.0.1", "port": "6666" },
        });
        let err = Payload::from_value(MessageType::ServiceRequest, &body).unwrap_err();
        assert_eq!(err, MessageError::InvalidFieldType(field::HOST, "host object"));
    }

    #[test]
    fn empty_discover_response_needs_no_hosts() {
        let body = json!({
            "retcode": RetCode::NotFoundService.as_u32(),
            "optype": ServiceOpType::Discover.as_u32(),
        });
        let payload = Payload::from_value(MessageType::ServiceResponse, &body).unwrap();
        assert_eq!(
            payload,
            Payload::ServiceResponse(ServiceResponse::new(RetCode::NotFoundService, ServiceOpType::Discover))
        );
    }

    #[test]
    fn ok_discover_response_requires_hosts() {
        let body = json!({
            "retcode": RetCode::Ok.as_u32(),
            "optype": ServiceOpType::Discover.as_u32(),
            "method": "Add",
        });
        let err = Payload::from_value(MessageType::ServiceResponse, &body).unwrap_err();
        assert_eq!(err, MessageError::MissingField(field::HOST));
    }
}
