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

//! Client-side topic operations and push delivery to subscription callbacks.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::*;

use super::requestor::Requestor;
use crate::{
    error::RpcError,
    message::{Message, MessageVariant, RetCode, TopicOpType, TopicRequest, TopicResponse},
    net::Connection,
    rid,
};

const LOG_TARGET: &str = "jsonrpc::client::topic";

/// Invoked with `(key, msg)` for every message published to a subscribed topic.
pub type SubscribeCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Tracks which topics this endpoint subscribed to and delivers broker pushes to the matching
/// callback.
#[derive(Default)]
pub struct Subscriptions {
    callbacks: Mutex<HashMap<String, SubscribeCallback>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Default::default()
    }

    /// Subscribes to `key`. The callback is installed before the request goes out so a push
    /// racing the subscription response is still delivered; it is removed again if the broker
    /// refuses the subscription.
    pub async fn subscribe(
        &self,
        requestor: &Requestor,
        conn: &Connection,
        key: &str,
        callback: SubscribeCallback,
    ) -> Result<(), RpcError> {
        self.callbacks
            .lock()
            .expect("subscriptions lock poisoned")
            .insert(key.to_string(), callback);

        match topic_request(requestor, conn, key, TopicOpType::Subscribe, None).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.remove(key);
                Err(err)
            },
        }
    }

    /// Cancels the subscription to `key`. The callback is removed before the broker is told.
    pub async fn cancel(&self, requestor: &Requestor, conn: &Connection, key: &str) -> Result<(), RpcError> {
        self.remove(key);
        topic_request(requestor, conn, key, TopicOpType::Cancel, None).await
    }

    /// Delivers a pushed publish to the callback subscribed to its topic. Registered on the
    /// dispatcher for topic requests arriving on the broker connection.
    pub fn handle_push(&self, _conn: &Arc<Connection>, _rid: String, req: TopicRequest) {
        if req.op != TopicOpType::Publish {
            warn!(target: LOG_TARGET, "unexpected topic push {:?} for '{}'", req.op, req.key);
            return;
        }

        let callback = self
            .callbacks
            .lock()
            .expect("subscriptions lock poisoned")
            .get(&req.key)
            .cloned();
        match callback {
            Some(callback) => {
                let msg = req.msg.unwrap_or_default();
                callback(&req.key, &msg);
            },
            None => {
                debug!(target: LOG_TARGET, "no subscription for topic '{}', dropping push", req.key);
            },
        }
    }

    fn remove(&self, key: &str) {
        self.callbacks.lock().expect("subscriptions lock poisoned").remove(key);
    }
}

/// Sends one topic operation and checks the broker's response code.
pub async fn topic_request(
    requestor: &Requestor,
    conn: &Connection,
    key: &str,
    op: TopicOpType,
    msg: Option<String>,
) -> Result<(), RpcError> {
    let payload = TopicRequest {
        key: key.to_string(),
        op,
        msg,
    };
    let reply = requestor.request(conn, Message::new(rid::generate(), payload)).await?;
    let (_, rsp) = TopicResponse::from_message(reply).ok_or(RpcError::UnexpectedResponse)?;
    if rsp.rcode != RetCode::Ok {
        return Err(RpcError::Response(rsp.rcode));
    }
    Ok(())
}
