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

use std::{collections::HashSet, net::SocketAddr, time::Duration};

use serde_json::{json, Map, Value};
use tari_jsonrpc::{
    client::{DiscoverClient, RpcClient},
    message::{HostAddress, RetCode},
    server::{RegistryServer, RpcServer, ServiceDescriptor, VType},
    RpcError,
};
use tokio::{sync::mpsc, task::JoinHandle, time};

async fn spawn_registry() -> SocketAddr {
    let registry = RegistryServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = registry.local_addr();
    tokio::spawn(registry.serve());
    addr
}

fn who_am_i_descriptor(marker: &'static str) -> ServiceDescriptor {
    ServiceDescriptor::builder("WhoAmI")
        .returns(VType::String)
        .callback(move |_| Ok(json!(marker)))
        .build()
        .unwrap()
}

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

/// Spawns an RPC server registered with the registry. Returns its access host and the serve
/// task, which owns the registry connection; aborting the task drops that connection.
async fn spawn_provider(
    registry_addr: SocketAddr,
    descriptors: Vec<ServiceDescriptor>,
) -> (HostAddress, JoinHandle<Result<(), RpcError>>) {
    let mut server = RpcServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let access_host = HostAddress::from(server.local_addr());
    server.connect_registry(access_host.clone(), registry_addr).await.unwrap();
    for descriptor in descriptors {
        server.register(descriptor).await.unwrap();
    }
    let handle = tokio::spawn(server.serve());
    (access_host, handle)
}

#[tokio::test(flavor = "multi_thread")]
async fn discovery_round_trip() -> anyhow::Result<()> {
    let registry_addr = spawn_registry().await;
    let (provider_host, _provider) = spawn_provider(registry_addr, vec![add_descriptor()]).await;

    // The registry reports exactly the provider's access host.
    let discover = DiscoverClient::connect(registry_addr, Box::new(|_| {})).await?;
    let discovered = discover.discover("Add").await?;
    assert_eq!(discovered, provider_host);

    // And a discovery-mode client routes a call through it.
    let client = RpcClient::connect_with_discovery(registry_addr).await?;
    let mut params = Map::new();
    params.insert("num1".to_string(), json!(1));
    params.insert("num2".to_string(), json!(2));
    assert_eq!(client.call("Add", params).await?, json!(3));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn discovering_an_unprovided_method_fails() {
    let registry_addr = spawn_registry().await;
    let discover = DiscoverClient::connect(registry_addr, Box::new(|_| {})).await.unwrap();
    match discover.discover("Nope").await {
        Err(RpcError::Response(RetCode::NotFoundService)) => {},
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn calls_rotate_over_all_providers() {
    let registry_addr = spawn_registry().await;
    let (_host_a, _provider_a) = spawn_provider(registry_addr, vec![who_am_i_descriptor("A")]).await;
    let (_host_b, _provider_b) = spawn_provider(registry_addr, vec![who_am_i_descriptor("B")]).await;

    let client = RpcClient::connect_with_discovery(registry_addr).await.unwrap();
    let mut seen = HashSet::new();
    for _ in 0..4 {
        let marker = client.call("WhoAmI", Map::new()).await.unwrap();
        seen.insert(marker.as_str().unwrap().to_string());
    }
    assert_eq!(seen.len(), 2, "round robin should reach both providers: {:?}", seen);
}

#[tokio::test(flavor = "multi_thread")]
async fn dead_provider_is_announced_and_routed_around() {
    let registry_addr = spawn_registry().await;
    let (host_a, provider_a) = spawn_provider(registry_addr, vec![who_am_i_descriptor("A")]).await;
    let (_host_b, _provider_b) = spawn_provider(registry_addr, vec![who_am_i_descriptor("B")]).await;

    // A plain discover client watching for offline pushes.
    let (offline_tx, mut offline_rx) = mpsc::unbounded_channel();
    let discover = DiscoverClient::connect(
        registry_addr,
        Box::new(move |host| {
            let _ = offline_tx.send(host.clone());
        }),
    )
    .await
    .unwrap();
    discover.discover("WhoAmI").await.unwrap();

    // A calling client that has already discovered both providers.
    let client = RpcClient::connect_with_discovery(registry_addr).await.unwrap();
    for _ in 0..2 {
        client.call("WhoAmI", Map::new()).await.unwrap();
    }

    // Kill provider A. Dropping its serve task drops its registry connection.
    provider_a.abort();

    let offline = time::timeout(Duration::from_secs(5), offline_rx.recv())
        .await
        .expect("no offline notification arrived")
        .unwrap();
    assert_eq!(offline, host_a);

    // Once the push has propagated, every call lands on B.
    let deadline = time::Instant::now() + Duration::from_secs(5);
    loop {
        let mut markers = Vec::new();
        for _ in 0..4 {
            if let Ok(marker) = client.call("WhoAmI", Map::new()).await {
                markers.push(marker);
            }
        }
        if markers.len() == 4 && markers.iter().all(|m| m == &json!("B")) {
            break;
        }
        if time::Instant::now() > deadline {
            panic!("calls did not settle on the surviving provider: {:?}", markers);
        }
        time::sleep(Duration::from_millis(100)).await;
    }
}
