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

//! Composed clients wiring the transport, dispatcher and requestor together.
//!
//! - [`RpcClient`] issues RPC calls, either against a fixed server or through registry-driven
//!   discovery with a per-host connection pool and round-robin selection.
//! - [`RegistryClient`] registers locally provided methods with a registry.
//! - [`DiscoverClient`] looks up provider hosts and tracks the registry's online/offline pushes.
//! - [`TopicClient`] drives the pub/sub broker and receives published messages.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use log::*;
use serde_json::{Map, Value};

pub mod caller;
pub mod discovery;
pub mod requestor;
pub mod topic;

pub use caller::{JsonResponseFuture, RpcCaller};
pub use discovery::OfflineCallback;
pub use requestor::{Requestor, ResponseFuture};
pub use topic::SubscribeCallback;

use self::{
    discovery::{Discovery, Provider},
    topic::Subscriptions,
};
use crate::{
    dispatcher::Dispatcher,
    error::RpcError,
    message::{HostAddress, Message, MessageType, ServiceRequest, TopicOpType, TopicRequest},
    net::{Connection, ConnectionEvents, NetConfig, TcpClient},
};

const LOG_TARGET: &str = "jsonrpc::client";

/// Shared event wiring for all client connections: messages go to the dispatcher, a closing
/// connection fails its in-flight requests so no caller is left hanging.
struct ClientEvents {
    dispatcher: Arc<Dispatcher>,
    requestor: Arc<Requestor>,
}

impl ConnectionEvents for ClientEvents {
    fn on_close(&self, conn: &Arc<Connection>) {
        debug!(target: LOG_TARGET, "{} closed", conn.id());
        self.requestor.fail_pending(conn.id());
    }

    fn on_message(&self, conn: &Arc<Connection>, msg: Message) {
        self.dispatcher.dispatch(conn, msg);
    }
}

/// Registers methods provided by this process with a registry server.
pub struct RegistryClient {
    client: TcpClient,
    provider: Provider,
}

impl RegistryClient {
    /// Connects to the registry at `registry_addr`.
    pub async fn connect(registry_addr: SocketAddr) -> Result<Self, RpcError> {
        let requestor = Arc::new(Requestor::new());
        let dispatcher = Arc::new(Dispatcher::new());
        {
            let requestor = requestor.clone();
            dispatcher.register_message(MessageType::ServiceResponse, move |conn, msg| {
                requestor.handle_response(conn, msg)
            });
        }

        let events = Arc::new(ClientEvents {
            dispatcher,
            requestor: requestor.clone(),
        });
        let client = TcpClient::connect(registry_addr, NetConfig::default(), events).await?;
        Ok(Self {
            client,
            provider: Provider::new(requestor),
        })
    }

    /// Tells the registry that `host` provides `method`.
    pub async fn register_method(&self, method: &str, host: HostAddress) -> Result<(), RpcError> {
        self.provider
            .register_method(&self.client.connection(), method, host)
            .await
    }

    pub fn shutdown(&self) {
        self.client.shutdown();
    }
}

/// Discovers which hosts provide a method and keeps the answer fresh from registry pushes.
pub struct DiscoverClient {
    client: TcpClient,
    discovery: Arc<Discovery>,
}

impl DiscoverClient {
    /// Connects to the registry at `registry_addr`. `offline_callback` fires whenever the
    /// registry reports a provider host gone.
    pub async fn connect(registry_addr: SocketAddr, offline_callback: OfflineCallback) -> Result<Self, RpcError> {
        let requestor = Arc::new(Requestor::new());
        let dispatcher = Arc::new(Dispatcher::new());
        let discovery = Arc::new(Discovery::new(requestor.clone(), offline_callback));
        {
            let requestor = requestor.clone();
            dispatcher.register_message(MessageType::ServiceResponse, move |conn, msg| {
                requestor.handle_response(conn, msg)
            });
        }
        {
            let discovery = discovery.clone();
            dispatcher.register::<ServiceRequest, _>(move |conn, rid, req| discovery.handle_push(conn, rid, req));
        }

        let events = Arc::new(ClientEvents { dispatcher, requestor });
        let client = TcpClient::connect(registry_addr, NetConfig::default(), events).await?;
        Ok(Self { client, discovery })
    }

    /// Selects a host providing `method`, consulting the registry on a cache miss.
    pub async fn discover(&self, method: &str) -> Result<HostAddress, RpcError> {
        self.discovery.discover(&self.client.connection(), method).await
    }

    pub fn shutdown(&self) {
        self.client.shutdown();
    }
}

enum RpcClientMode {
    /// One permanent connection to a fixed RPC server.
    Direct(TcpClient),
    /// Hosts are discovered per call and connections pooled per host.
    Discovery {
        registry: DiscoverClient,
        pool: Arc<Mutex<HashMap<HostAddress, TcpClient>>>,
    },
}

/// An RPC caller façade over one or many server connections.
pub struct RpcClient {
    mode: RpcClientMode,
    requestor: Arc<Requestor>,
    dispatcher: Arc<Dispatcher>,
    caller: RpcCaller,
    config: NetConfig,
}

impl RpcClient {
    /// Connects directly to the RPC server at `server_addr`.
    pub async fn connect(server_addr: SocketAddr) -> Result<Self, RpcError> {
        let (requestor, dispatcher) = rpc_wiring();
        let events = Arc::new(ClientEvents {
            dispatcher: dispatcher.clone(),
            requestor: requestor.clone(),
        });
        let client = TcpClient::connect(server_addr, NetConfig::default(), events).await?;
        Ok(Self {
            mode: RpcClientMode::Direct(client),
            caller: RpcCaller::new(requestor.clone()),
            requestor,
            dispatcher,
            config: NetConfig::default(),
        })
    }

    /// Connects to the registry at `registry_addr` and resolves RPC servers through discovery.
    pub async fn connect_with_discovery(registry_addr: SocketAddr) -> Result<Self, RpcError> {
        let (requestor, dispatcher) = rpc_wiring();
        let pool: Arc<Mutex<HashMap<HostAddress, TcpClient>>> = Arc::new(Mutex::new(HashMap::new()));

        // A provider reported offline is evicted from the pool and its connection torn down.
        let offline_callback: OfflineCallback = {
            let pool = pool.clone();
            Box::new(move |host| {
                let client = pool.lock().expect("rpc client pool lock poisoned").remove(host);
                if let Some(client) = client {
                    debug!(target: LOG_TARGET, "dropping pooled connection to offline host {}", host);
                    client.shutdown();
                }
            })
        };
        let registry = DiscoverClient::connect(registry_addr, offline_callback).await?;

        Ok(Self {
            mode: RpcClientMode::Discovery { registry, pool },
            caller: RpcCaller::new(requestor.clone()),
            requestor,
            dispatcher,
            config: NetConfig::default(),
        })
    }

    /// Calls `method` and waits for the result.
    pub async fn call(&self, method: &str, params: Map<String, Value>) -> Result<Value, RpcError> {
        let conn = self.connection_for(method).await?;
        self.caller.call(&conn, method, params).await
    }

    /// Calls `method` and returns a future handle to the result.
    pub async fn call_async(&self, method: &str, params: Map<String, Value>) -> Result<JsonResponseFuture, RpcError> {
        let conn = self.connection_for(method).await?;
        self.caller.call_async(&conn, method, params)
    }

    /// Calls `method` and delivers the result to `callback`.
    pub async fn call_with_callback<F>(&self, method: &str, params: Map<String, Value>, callback: F) -> Result<(), RpcError>
    where F: FnOnce(Value) + Send + 'static {
        let conn = self.connection_for(method).await?;
        self.caller.call_with_callback(&conn, method, params, callback)
    }

    pub fn shutdown(&self) {
        match &self.mode {
            RpcClientMode::Direct(client) => client.shutdown(),
            RpcClientMode::Discovery { registry, pool } => {
                registry.shutdown();
                for client in pool.lock().expect("rpc client pool lock poisoned").values() {
                    client.shutdown();
                }
            },
        }
    }

    async fn connection_for(&self, method: &str) -> Result<Arc<Connection>, RpcError> {
        match &self.mode {
            RpcClientMode::Direct(client) => Ok(client.connection()),
            RpcClientMode::Discovery { registry, pool } => {
                let host = registry.discover(method).await?;
                {
                    let pool = pool.lock().expect("rpc client pool lock poisoned");
                    if let Some(client) = pool.get(&host) {
                        if client.is_connected() {
                            return Ok(client.connection());
                        }
                    }
                }

                let addr = host
                    .socket_addr()
                    .ok_or_else(|| RpcError::InvalidAddress(host.to_string()))?;
                let events = Arc::new(ClientEvents {
                    dispatcher: self.dispatcher.clone(),
                    requestor: self.requestor.clone(),
                });
                let client = TcpClient::connect(addr, self.config, events).await?;
                let mut pool = pool.lock().expect("rpc client pool lock poisoned");
                // A concurrent call may have connected first. Keep the established entry; the
                // redundant client closes its connection on drop.
                if let Some(existing) = pool.get(&host) {
                    if existing.is_connected() {
                        return Ok(existing.connection());
                    }
                }
                let conn = client.connection();
                pool.insert(host, client);
                Ok(conn)
            },
        }
    }
}

fn rpc_wiring() -> (Arc<Requestor>, Arc<Dispatcher>) {
    let requestor = Arc::new(Requestor::new());
    let dispatcher = Arc::new(Dispatcher::new());
    {
        let requestor = requestor.clone();
        dispatcher.register_message(MessageType::RpcResponse, move |conn, msg| {
            requestor.handle_response(conn, msg)
        });
    }
    (requestor, dispatcher)
}

/// Drives a pub/sub broker: topic lifecycle, publishing and subscriptions.
pub struct TopicClient {
    client: TcpClient,
    requestor: Arc<Requestor>,
    subscriptions: Arc<Subscriptions>,
}

impl TopicClient {
    /// Connects to the broker at `broker_addr`.
    pub async fn connect(broker_addr: SocketAddr) -> Result<Self, RpcError> {
        let requestor = Arc::new(Requestor::new());
        let dispatcher = Arc::new(Dispatcher::new());
        let subscriptions = Arc::new(Subscriptions::new());
        {
            let requestor = requestor.clone();
            dispatcher.register_message(MessageType::TopicResponse, move |conn, msg| {
                requestor.handle_response(conn, msg)
            });
        }
        {
            let subscriptions = subscriptions.clone();
            dispatcher.register::<TopicRequest, _>(move |conn, rid, req| subscriptions.handle_push(conn, rid, req));
        }

        let events = Arc::new(ClientEvents {
            dispatcher,
            requestor: requestor.clone(),
        });
        let client = TcpClient::connect(broker_addr, NetConfig::default(), events).await?;
        Ok(Self {
            client,
            requestor,
            subscriptions,
        })
    }

    /// Creates the topic `key` on the broker. Creating an existing topic is a no-op.
    pub async fn create_topic(&self, key: &str) -> Result<(), RpcError> {
        topic::topic_request(
            &self.requestor,
            &self.client.connection(),
            key,
            TopicOpType::Create,
            None,
        )
        .await
    }

    /// Removes the topic `key` and every subscription to it.
    pub async fn remove_topic(&self, key: &str) -> Result<(), RpcError> {
        topic::topic_request(
            &self.requestor,
            &self.client.connection(),
            key,
            TopicOpType::Remove,
            None,
        )
        .await
    }

    /// Subscribes to `key`, delivering every published message to `callback`.
    pub async fn subscribe<F>(&self, key: &str, callback: F) -> Result<(), RpcError>
    where F: Fn(&str, &str) + Send + Sync + 'static {
        self.subscriptions
            .subscribe(&self.requestor, &self.client.connection(), key, Arc::new(callback))
            .await
    }

    /// Cancels the subscription to `key`.
    pub async fn cancel(&self, key: &str) -> Result<(), RpcError> {
        self.subscriptions
            .cancel(&self.requestor, &self.client.connection(), key)
            .await
    }

    /// Publishes `msg` to every subscriber of `key`.
    pub async fn publish(&self, key: &str, msg: &str) -> Result<(), RpcError> {
        topic::topic_request(
            &self.requestor,
            &self.client.connection(),
            key,
            TopicOpType::Publish,
            Some(msg.to_string()),
        )
        .await
    }

    pub fn shutdown(&self) {
        self.client.shutdown();
    }
}
