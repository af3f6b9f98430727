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

//! Registry bookkeeping: which connections provide which methods and which connections asked
//! about them.
//!
//! A connection holds at most one provider identity and one discoverer identity; registrations
//! and discoveries for further methods accrete into the same record. The method tables hold
//! connection ids rather than the records themselves, so every record has exactly one owner and
//! removal cannot leave a dangling back-reference. Fan-out snapshots the target connections
//! under the lock and sends after releasing it.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use log::*;

use crate::{
    message::{HostAddress, Message, MessageVariant, RetCode, ServiceOpType, ServiceRequest, ServiceResponse},
    net::{Connection, ConnectionId},
    rid,
};

const LOG_TARGET: &str = "jsonrpc::server::registry";

struct Provider {
    addr: HostAddress,
    methods: Vec<String>,
}

#[derive(Default)]
struct ProviderTables {
    by_conn: HashMap<ConnectionId, Provider>,
    by_method: HashMap<String, HashSet<ConnectionId>>,
}

/// Tracks the provider identity of connections that registered methods.
#[derive(Default)]
pub struct ProviderManager {
    tables: Mutex<ProviderTables>,
}

impl ProviderManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that the connection provides `method` at `addr`, creating its provider record on
    /// first registration.
    pub fn add(&self, conn_id: ConnectionId, addr: HostAddress, method: &str) {
        let mut tables = self.tables.lock().expect("provider manager lock poisoned");
        let provider = tables.by_conn.entry(conn_id).or_insert_with(|| Provider {
            addr,
            methods: Vec::new(),
        });
        if !provider.methods.iter().any(|m| m == method) {
            provider.methods.push(method.to_string());
        }
        tables.by_method.entry(method.to_string()).or_default().insert(conn_id);
    }

    /// The provider's address and methods in registration order, if the connection registered
    /// anything.
    pub fn info(&self, conn_id: ConnectionId) -> Option<(HostAddress, Vec<String>)> {
        let tables = self.tables.lock().expect("provider manager lock poisoned");
        tables
            .by_conn
            .get(&conn_id)
            .map(|provider| (provider.addr.clone(), provider.methods.clone()))
    }

    /// Drops the provider record and unlinks it from every method table.
    pub fn remove(&self, conn_id: ConnectionId) {
        let mut tables = self.tables.lock().expect("provider manager lock poisoned");
        let provider = match tables.by_conn.remove(&conn_id) {
            Some(provider) => provider,
            None => return,
        };
        for method in provider.methods {
            if let Some(providers) = tables.by_method.get_mut(&method) {
                providers.remove(&conn_id);
                if providers.is_empty() {
                    tables.by_method.remove(&method);
                }
            }
        }
    }

    /// The addresses currently providing `method`.
    pub fn hosts_for(&self, method: &str) -> Vec<HostAddress> {
        let tables = self.tables.lock().expect("provider manager lock poisoned");
        tables
            .by_method
            .get(method)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| tables.by_conn.get(id))
                    .map(|provider| provider.addr.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

struct Discoverer {
    conn: Arc<Connection>,
    methods: Vec<String>,
}

#[derive(Default)]
struct DiscovererTables {
    by_conn: HashMap<ConnectionId, Discoverer>,
    by_method: HashMap<String, HashSet<ConnectionId>>,
}

/// Tracks which connections asked about which methods, and pushes online/offline notifications
/// to them.
#[derive(Default)]
pub struct DiscovererManager {
    tables: Mutex<DiscovererTables>,
}

impl DiscovererManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records that the connection wants to hear about `method`, creating its discoverer record
    /// on first discovery.
    pub fn add(&self, conn: &Arc<Connection>, method: &str) {
        let mut tables = self.tables.lock().expect("discoverer manager lock poisoned");
        let discoverer = tables.by_conn.entry(conn.id()).or_insert_with(|| Discoverer {
            conn: conn.clone(),
            methods: Vec::new(),
        });
        if !discoverer.methods.iter().any(|m| m == method) {
            discoverer.methods.push(method.to_string());
        }
        tables.by_method.entry(method.to_string()).or_default().insert(conn.id());
    }

    /// Drops the discoverer record and unlinks it from every method table. No notifications.
    pub fn remove(&self, conn_id: ConnectionId) {
        let mut tables = self.tables.lock().expect("discoverer manager lock poisoned");
        let discoverer = match tables.by_conn.remove(&conn_id) {
            Some(discoverer) => discoverer,
            None => return,
        };
        for method in discoverer.methods {
            if let Some(discoverers) = tables.by_method.get_mut(&method) {
                discoverers.remove(&conn_id);
                if discoverers.is_empty() {
                    tables.by_method.remove(&method);
                }
            }
        }
    }

    pub fn notify_online(&self, method: &str, host: &HostAddress) {
        self.notify(method, host, ServiceOpType::Online);
    }

    pub fn notify_offline(&self, method: &str, host: &HostAddress) {
        self.notify(method, host, ServiceOpType::Outline);
    }

    fn notify(&self, method: &str, host: &HostAddress, op: ServiceOpType) {
        let targets = {
            let tables = self.tables.lock().expect("discoverer manager lock poisoned");
            tables
                .by_method
                .get(method)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| tables.by_conn.get(id))
                        .map(|discoverer| discoverer.conn.clone())
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
        };

        for conn in targets {
            let push = Message::new(
                rid::generate(),
                ServiceRequest::notification(method, op, host.clone()),
            );
            if let Err(err) = conn.send(push) {
                warn!(target: LOG_TARGET, "failed to notify {} about '{}': {}", conn.id(), method, err);
            }
        }
    }
}

/// The registry's request handler: provider registration, discovery and lifecycle fan-out.
#[derive(Default)]
pub struct RegistryService {
    providers: ProviderManager,
    discoverers: DiscovererManager,
}

impl RegistryService {
    pub fn new() -> Self {
        Default::default()
    }

    /// Handles one service request. Registered on the dispatcher.
    pub fn handle_request(&self, conn: &Arc<Connection>, rid: String, req: ServiceRequest) {
        match req.op {
            ServiceOpType::Registry => {
                let host = match req.host {
                    Some(host) => host,
                    None => return self.respond_unknown(conn, rid),
                };
                self.providers.add(conn.id(), host.clone(), &req.method);
                self.discoverers.notify_online(&req.method, &host);
                info!(target: LOG_TARGET, "'{}' registered by {}", req.method, host);
                respond(conn, rid, ServiceResponse::new(RetCode::Ok, ServiceOpType::Registry));
            },
            ServiceOpType::Discover => {
                self.discoverers.add(conn, &req.method);
                let hosts = self.providers.hosts_for(&req.method);
                let rsp = if hosts.is_empty() {
                    info!(target: LOG_TARGET, "'{}' has no providers", req.method);
                    ServiceResponse::new(RetCode::NotFoundService, ServiceOpType::Discover)
                } else {
                    debug!(target: LOG_TARGET, "'{}' discovered, {} provider(s)", req.method, hosts.len());
                    ServiceResponse::discovered(req.method.clone(), hosts)
                };
                respond(conn, rid, rsp);
            },
            op => {
                warn!(target: LOG_TARGET, "unsupported service operation {:?} from {}", op, conn.id());
                self.respond_unknown(conn, rid);
            },
        }
    }

    /// Cleans up after a closed connection. A provider's methods are announced offline before
    /// its record is dropped; a discoverer is dropped silently. A connection may have been both.
    pub fn handle_connection_closed(&self, conn: &Arc<Connection>) {
        if let Some((addr, methods)) = self.providers.info(conn.id()) {
            for method in &methods {
                self.discoverers.notify_offline(method, &addr);
            }
            self.providers.remove(conn.id());
            info!(target: LOG_TARGET, "provider {} went offline ({} method(s))", addr, methods.len());
        }
        self.discoverers.remove(conn.id());
    }

    fn respond_unknown(&self, conn: &Connection, rid: String) {
        respond(conn, rid, ServiceResponse::new(RetCode::Ok, ServiceOpType::Unknown));
    }
}

fn respond(conn: &Connection, rid: String, rsp: ServiceResponse) {
    if let Err(err) = conn.send(rsp.into_message(rid)) {
        warn!(target: LOG_TARGET, "failed to send service response on {}: {}", conn.id(), err);
    }
}
