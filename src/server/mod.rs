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

//! Ready-to-use servers composing the transport, dispatcher and the protocol managers.
//!
//! - [`RpcServer`] serves registered methods, optionally announcing them to a registry.
//! - [`RegistryServer`] coordinates providers and discoverers.
//! - [`TopicServer`] hosts the pub/sub broker.
//!
//! Each binds first and serves second, so tests and embedders can bind port 0 and read the
//! actual address back before accepting traffic.

use std::{net::SocketAddr, sync::Arc};

use log::*;

pub mod registry;
pub mod router;
pub mod topic;

pub use registry::RegistryService;
pub use router::{
    HandlerError,
    RpcRouter,
    ServiceCallback,
    ServiceDescriptor,
    ServiceDescriptorBuilder,
    ServiceError,
    ServiceManager,
    VType,
};
pub use topic::TopicManager;

use crate::{
    client::RegistryClient,
    dispatcher::Dispatcher,
    error::RpcError,
    message::{HostAddress, Message, RpcRequest, ServiceRequest, TopicRequest},
    net::{Connection, ConnectionEvents, NetConfig, TcpServer},
};

const LOG_TARGET: &str = "jsonrpc::server";

type CloseHandler = Box<dyn Fn(&Arc<Connection>) + Send + Sync>;

/// Shared event wiring for server connections: messages go to the dispatcher, closes go to the
/// owning manager's cleanup.
struct ServerEvents {
    dispatcher: Arc<Dispatcher>,
    on_close: Option<CloseHandler>,
}

impl ConnectionEvents for ServerEvents {
    fn on_connect(&self, conn: &Arc<Connection>) {
        debug!(target: LOG_TARGET, "{} connected from {}", conn.id(), conn.peer_addr());
    }

    fn on_close(&self, conn: &Arc<Connection>) {
        debug!(target: LOG_TARGET, "{} closed", conn.id());
        if let Some(on_close) = &self.on_close {
            on_close(conn);
        }
    }

    fn on_message(&self, conn: &Arc<Connection>, msg: Message) {
        self.dispatcher.dispatch(conn, msg);
    }
}

/// Serves RPC calls for the methods registered on it. With a registry attached, every
/// registration is also announced as provided by `access_host`.
pub struct RpcServer {
    tcp: TcpServer,
    router: Arc<RpcRouter>,
    dispatcher: Arc<Dispatcher>,
    registry: Option<RegistryEndpoint>,
}

struct RegistryEndpoint {
    client: RegistryClient,
    access_host: HostAddress,
}

impl RpcServer {
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self, RpcError> {
        Self::bind_with_config(listen_addr, NetConfig::default()).await
    }

    pub async fn bind_with_config(listen_addr: SocketAddr, config: NetConfig) -> Result<Self, RpcError> {
        let tcp = TcpServer::bind(listen_addr, config).await?;
        let router = Arc::new(RpcRouter::new());
        let dispatcher = Arc::new(Dispatcher::new());
        {
            let router = router.clone();
            dispatcher.register::<RpcRequest, _>(move |conn, rid, req| router.handle_request(conn, rid, req));
        }
        Ok(Self {
            tcp,
            router,
            dispatcher,
            registry: None,
        })
    }

    /// Binds the RPC listener and connects to the registry at `registry_addr`. `access_host` is
    /// the address remote callers should use to reach this server, which may differ from the
    /// listen address.
    pub async fn bind_with_registry(
        listen_addr: SocketAddr,
        access_host: HostAddress,
        registry_addr: SocketAddr,
    ) -> Result<Self, RpcError> {
        let mut server = Self::bind(listen_addr).await?;
        server.connect_registry(access_host, registry_addr).await?;
        Ok(server)
    }

    /// Connects to a registry after binding. Useful when listening on port 0, where the access
    /// host is only known once the listener is bound.
    pub async fn connect_registry(
        &mut self,
        access_host: HostAddress,
        registry_addr: SocketAddr,
    ) -> Result<(), RpcError> {
        let client = RegistryClient::connect(registry_addr).await?;
        self.registry = Some(RegistryEndpoint { client, access_host });
        Ok(())
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.tcp.local_addr()
    }

    /// Registers a method on the router and, if a registry is attached, announces it.
    pub async fn register(&self, descriptor: ServiceDescriptor) -> Result<(), RpcError> {
        let method = descriptor.name().to_string();
        self.router.register(descriptor)?;
        if let Some(registry) = &self.registry {
            registry.client.register_method(&method, registry.access_host.clone()).await?;
        }
        Ok(())
    }

    /// Accepts and serves connections until the listener fails.
    pub async fn serve(self) -> Result<(), RpcError> {
        let events = Arc::new(ServerEvents {
            dispatcher: self.dispatcher.clone(),
            on_close: None,
        });
        self.tcp.serve(events).await
    }
}

/// The registry: accepts provider registrations and discovery requests and pushes lifecycle
/// notifications.
pub struct RegistryServer {
    tcp: TcpServer,
    service: Arc<RegistryService>,
    dispatcher: Arc<Dispatcher>,
}

impl RegistryServer {
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self, RpcError> {
        Self::bind_with_config(listen_addr, NetConfig::default()).await
    }

    pub async fn bind_with_config(listen_addr: SocketAddr, config: NetConfig) -> Result<Self, RpcError> {
        let tcp = TcpServer::bind(listen_addr, config).await?;
        let service = Arc::new(RegistryService::new());
        let dispatcher = Arc::new(Dispatcher::new());
        {
            let service = service.clone();
            dispatcher.register::<ServiceRequest, _>(move |conn, rid, req| service.handle_request(conn, rid, req));
        }
        Ok(Self {
            tcp,
            service,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.tcp.local_addr()
    }

    pub async fn serve(self) -> Result<(), RpcError> {
        let service = self.service.clone();
        let events = Arc::new(ServerEvents {
            dispatcher: self.dispatcher.clone(),
            on_close: Some(Box::new(move |conn| service.handle_connection_closed(conn))),
        });
        self.tcp.serve(events).await
    }
}

/// The pub/sub broker.
pub struct TopicServer {
    tcp: TcpServer,
    manager: Arc<TopicManager>,
    dispatcher: Arc<Dispatcher>,
}

impl TopicServer {
    pub async fn bind(listen_addr: SocketAddr) -> Result<Self, RpcError> {
        Self::bind_with_config(listen_addr, NetConfig::default()).await
    }

    pub async fn bind_with_config(listen_addr: SocketAddr, config: NetConfig) -> Result<Self, RpcError> {
        let tcp = TcpServer::bind(listen_addr, config).await?;
        let manager = Arc::new(TopicManager::new());
        let dispatcher = Arc::new(Dispatcher::new());
        {
            let manager = manager.clone();
            dispatcher.register::<TopicRequest, _>(move |conn, rid, req| manager.handle_request(conn, rid, req));
        }
        Ok(Self {
            tcp,
            manager,
            dispatcher,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.tcp.local_addr()
    }

    pub async fn serve(self) -> Result<(), RpcError> {
        let manager = self.manager.clone();
        let events = Arc::new(ServerEvents {
            dispatcher: self.dispatcher.clone(),
            on_close: Some(Box::new(move |conn| manager.handle_connection_closed(conn))),
        });
        self.tcp.serve(events).await
    }
}
