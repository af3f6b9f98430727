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

//! Correlates responses to the requests that produced them.
//!
//! Concurrent requests are multiplexed over one connection, so a response arriving on the reader
//! task must be matched back to its request by rid. Each in-flight request holds a descriptor in
//! the pending table with a write-once reply slot. A descriptor is completed exactly once:
//! either its response arrives, or its connection closes and the slot is completed with a
//! synthetic `DISCONNECTED` response. Without the latter, a caller awaiting a reply on a dead
//! connection would hang forever.

use std::{
    collections::HashMap,
    future::Future,
    pin::Pin,
    sync::Mutex,
    task::{Context, Poll},
};

use log::*;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::{
    error::RpcError,
    message::{
        Message,
        MessageType,
        Payload,
        RetCode,
        RpcResponse,
        ServiceOpType,
        ServiceResponse,
        TopicResponse,
    },
    net::{Connection, ConnectionId},
};

const LOG_TARGET: &str = "jsonrpc::client::requestor";

type ResponseCallback = Box<dyn FnOnce(Message) + Send>;

enum ReplySlot {
    Waiter(oneshot::Sender<Message>),
    Callback(ResponseCallback),
}

impl ReplySlot {
    fn complete(self, msg: Message) {
        match self {
            ReplySlot::Waiter(tx) => {
                let _ = tx.send(msg);
            },
            ReplySlot::Callback(callback) => callback(msg),
        }
    }
}

struct RequestDescriptor {
    conn_id: ConnectionId,
    response_mtype: MessageType,
    slot: ReplySlot,
}

/// Resolves to the response message, or fails if the reply slot was dropped.
pub struct ResponseFuture {
    rx: oneshot::Receiver<Message>,
}

impl Future for ResponseFuture {
    type Output = Result<Message, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.map_err(|_| RpcError::Disconnected))
    }
}

/// Tracks in-flight requests by rid and delivers each reply to its slot.
#[derive(Default)]
pub struct Requestor {
    pending: Mutex<HashMap<String, RequestDescriptor>>,
}

impl Requestor {
    pub fn new() -> Self {
        Default::default()
    }

    /// Sends a request and returns a future resolving to the matching response.
    pub fn send_request(&self, conn: &Connection, msg: Message) -> Result<ResponseFuture, RpcError> {
        let (tx, rx) = oneshot::channel();
        let rid = self.insert(conn.id(), &msg, ReplySlot::Waiter(tx));
        if let Err(err) = conn.send(msg) {
            self.remove(&rid);
            return Err(err);
        }
        Ok(ResponseFuture { rx })
    }

    /// Sends a request and waits for the matching response.
    pub async fn request(&self, conn: &Connection, msg: Message) -> Result<Message, RpcError> {
        self.send_request(conn, msg)?.await
    }

    /// Sends a request whose response is delivered to `callback` on the reader task.
    pub fn send_request_with_callback<F>(&self, conn: &Connection, msg: Message, callback: F) -> Result<(), RpcError>
    where F: FnOnce(Message) + Send + 'static {
        let rid = self.insert(conn.id(), &msg, ReplySlot::Callback(Box::new(callback)));
        if let Err(err) = conn.send(msg) {
            self.remove(&rid);
            return Err(err);
        }
        Ok(())
    }

    /// Delivers a response to its descriptor. Registered on the dispatcher for the response
    /// message types. A response with no matching descriptor is logged and dropped.
    pub fn handle_response(&self, _conn: &Connection, msg: Message) {
        let descriptor = self
            .pending
            .lock()
            .expect("requestor lock poisoned")
            .remove(msg.rid());
        match descriptor {
            Some(descriptor) => descriptor.slot.complete(msg),
            None => {
                warn!(target: LOG_TARGET, "no pending request with id '{}', dropping response", msg.rid());
            },
        }
    }

    /// Fails every in-flight request on a closed connection by completing its slot with a
    /// synthetic `DISCONNECTED` response of the expected response type.
    pub fn fail_pending(&self, conn_id: ConnectionId) {
        let failed = {
            let mut pending = self.pending.lock().expect("requestor lock poisoned");
            let rids = pending
                .iter()
                .filter(|(_, descriptor)| descriptor.conn_id == conn_id)
                .map(|(rid, _)| rid.clone())
                .collect::<Vec<_>>();
            rids.into_iter()
                .filter_map(|rid| pending.remove(&rid).map(|descriptor| (rid, descriptor)))
                .collect::<Vec<_>>()
        };

        for (rid, descriptor) in failed {
            debug!(target: LOG_TARGET, "failing request '{}' on closed {}", rid, conn_id);
            let payload = disconnected_payload(descriptor.response_mtype);
            descriptor.slot.complete(Message::new(rid, payload));
        }
    }

    fn insert(&self, conn_id: ConnectionId, msg: &Message, slot: ReplySlot) -> String {
        let rid = msg.rid().to_string();
        let descriptor = RequestDescriptor {
            conn_id,
            response_mtype: response_mtype(msg.mtype()),
            slot,
        };
        self.pending
            .lock()
            .expect("requestor lock poisoned")
            .insert(rid.clone(), descriptor);
        rid
    }

    fn remove(&self, rid: &str) {
        self.pending.lock().expect("requestor lock poisoned").remove(rid);
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

fn response_mtype(request: MessageType) -> MessageType {
    match request {
        MessageType::RpcRequest => MessageType::RpcResponse,
        MessageType::TopicRequest => MessageType::TopicResponse,
        MessageType::ServiceRequest => MessageType::ServiceResponse,
        mtype => mtype,
    }
}

fn disconnected_payload(response_mtype: MessageType) -> Payload {
    match response_mtype {
        MessageType::TopicResponse => Payload::TopicResponse(TopicResponse::new(RetCode::Disconnected)),
        MessageType::ServiceResponse => {
            Payload::ServiceResponse(ServiceResponse::new(RetCode::Disconnected, ServiceOpType::Unknown))
        },
        _ => Payload::RpcResponse(RpcResponse {
            rcode: RetCode::Disconnected,
            result: Value::Null,
        }),
    }
}
