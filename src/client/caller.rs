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

//! Builds RPC request frames and unwraps RPC responses into their JSON result.

use std::{
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use log::*;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use super::requestor::Requestor;
use crate::{
    error::RpcError,
    message::{Message, MessageVariant, RetCode, RpcRequest, RpcResponse},
    net::Connection,
    rid,
};

const LOG_TARGET: &str = "jsonrpc::client::caller";

/// Resolves to the JSON result of an RPC call issued with [`RpcCaller::call_async`].
pub struct JsonResponseFuture {
    rx: oneshot::Receiver<Result<Value, RpcError>>,
}

impl Future for JsonResponseFuture {
    type Output = Result<Value, RpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(RpcError::Disconnected)))
    }
}

/// Issues RPC calls over a connection. All three call forms build the same request frame and
/// differ only in how the reply is delivered.
#[derive(Clone)]
pub struct RpcCaller {
    requestor: Arc<Requestor>,
}

impl RpcCaller {
    pub fn new(requestor: Arc<Requestor>) -> Self {
        Self { requestor }
    }

    /// Calls `method` and waits for the result.
    pub async fn call(&self, conn: &Connection, method: &str, params: Map<String, Value>) -> Result<Value, RpcError> {
        let reply = self.requestor.request(conn, build_request(method, params)).await?;
        unwrap_response(reply)
    }

    /// Calls `method` and returns a future handle to the result. The future resolves with an
    /// error on a non-OK response as well as on disconnection.
    pub fn call_async(
        &self,
        conn: &Connection,
        method: &str,
        params: Map<String, Value>,
    ) -> Result<JsonResponseFuture, RpcError> {
        let (tx, rx) = oneshot::channel();
        self.requestor
            .send_request_with_callback(conn, build_request(method, params), move |reply| {
                let _ = tx.send(unwrap_response(reply));
            })?;
        Ok(JsonResponseFuture { rx })
    }

    /// Calls `method` and delivers the result to `callback` on the reader task. A failed call is
    /// logged and the callback is not invoked.
    pub fn call_with_callback<F>(
        &self,
        conn: &Connection,
        method: &str,
        params: Map<String, Value>,
        callback: F,
    ) -> Result<(), RpcError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let method_name = method.to_string();
        self.requestor
            .send_request_with_callback(conn, build_request(method, params), move |reply| {
                match unwrap_response(reply) {
                    Ok(result) => callback(result),
                    Err(err) => {
                        error!(target: LOG_TARGET, "rpc call '{}' failed: {}", method_name, err);
                    },
                }
            })
    }
}

fn build_request(method: &str, params: Map<String, Value>) -> Message {
    Message::new(rid::generate(), RpcRequest::new(method, params))
}

fn unwrap_response(reply: Message) -> Result<Value, RpcError> {
    let (_, rsp) = RpcResponse::from_message(reply).ok_or(RpcError::UnexpectedResponse)?;
    if rsp.rcode != RetCode::Ok {
        return Err(RpcError::Response(rsp.rcode));
    }
    Ok(rsp.result)
}
