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

use std::net::SocketAddr;

use serde_json::{json, Map, Value};
use tari_jsonrpc::{
    client::RpcClient,
    message::RetCode,
    server::{HandlerError, RpcServer, ServiceDescriptor, VType},
    RpcError,
};
use tokio::sync::oneshot;

fn add_descriptor() -> ServiceDescriptor {
    ServiceDescriptor::builder("Add")
        .param("num1", VType::Integral)
        .param("num2", VType::Integral)
        .returns(VType::Integral)
        .callback(|params| {
            let num1 = params.get("num1").and_then(Value::as_i64).unwrap_or(0);
            let num2 = params.get("num2").and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(num1 + num2))
        })
        .build()
        .unwrap()
}

fn add_params(num1: i64, num2: i64) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("num1".to_string(), json!(num1));
    params.insert("num2".to_string(), json!(num2));
    params
}

async fn spawn_add_server() -> SocketAddr {
    // env_logger::init(); // Set `RUST_LOG=trace` for wire-level logs
    let server = RpcServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    server.register(add_descriptor()).await.unwrap();
    server
        .register(
            ServiceDescriptor::builder("Broken")
                .returns(VType::Integral)
                .callback(|_| Ok(json!("not an integer")))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    server
        .register(
            ServiceDescriptor::builder("Flaky")
                .returns(VType::Integral)
                .callback(|_| Err(HandlerError::new("out of capacity")))
                .build()
                .unwrap(),
        )
        .await
        .unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.serve());
    addr
}

#[tokio::test(flavor = "multi_thread")]
async fn call_waits_for_the_result() {
    let addr = spawn_add_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let result = client.call("Add", add_params(11, 22)).await.unwrap();
    assert_eq!(result, json!(33));
}

#[tokio::test(flavor = "multi_thread")]
async fn call_async_resolves_a_future() {
    let addr = spawn_add_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let pending = client.call_async("Add", add_params(33, 44)).await.unwrap();
    let result = pending.await.unwrap();
    assert_eq!(result, json!(77));
}

#[tokio::test(flavor = "multi_thread")]
async fn call_with_callback_invokes_once() {
    let addr = spawn_add_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let (tx, rx) = oneshot::channel();
    client
        .call_with_callback("Add", add_params(55, 66), move |result| {
            tx.send(result).unwrap();
        })
        .await
        .unwrap();
    assert_eq!(rx.await.unwrap(), json!(121));
}

#[tokio::test(flavor = "multi_thread")]
async fn many_concurrent_calls_multiplex_over_one_connection() {
    let addr = spawn_add_server().await;
    let client = std::sync::Arc::new(RpcClient::connect(addr).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..32i64 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            let result = client.call("Add", add_params(i, 1000)).await.unwrap();
            assert_eq!(result, json!(i + 1000));
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_method_is_not_found() {
    let addr = spawn_add_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    match client.call("Mul", add_params(2, 3)).await {
        Err(RpcError::Response(RetCode::NotFoundService)) => {},
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn mistyped_params_are_rejected() {
    let addr = spawn_add_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let mut params = Map::new();
    params.insert("num1".to_string(), json!("11"));
    params.insert("num2".to_string(), json!(22));
    match client.call("Add", params).await {
        Err(RpcError::Response(RetCode::InvalidParam)) => {},
        other => panic!("unexpected outcome: {:?}", other),
    }

    // A float is not integral either.
    let mut params = Map::new();
    params.insert("num1".to_string(), json!(1.5));
    params.insert("num2".to_string(), json!(22));
    match client.call("Add", params).await {
        Err(RpcError::Response(RetCode::InvalidParam)) => {},
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn handler_problems_surface_as_internal_errors() {
    let addr = spawn_add_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    match client.call("Broken", Map::new()).await {
        Err(RpcError::Response(RetCode::InternalError)) => {},
        other => panic!("unexpected outcome: {:?}", other),
    }
    match client.call("Flaky", Map::new()).await {
        Err(RpcError::Response(RetCode::InternalError)) => {},
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn async_call_fails_instead_of_hanging_on_error() {
    let addr = spawn_add_server().await;
    let client = RpcClient::connect(addr).await.unwrap();

    let pending = client.call_async("Mul", add_params(2, 3)).await.unwrap();
    match pending.await {
        Err(RpcError::Response(RetCode::NotFoundService)) => {},
        other => panic!("unexpected outcome: {:?}", other),
    }
}
