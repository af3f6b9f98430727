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

//! Client-side service registration and discovery.
//!
//! [`Provider`] registers locally served methods with a registry. [`Discovery`] keeps a
//! method-to-hosts cache fed by DISCOVER responses and kept fresh reactively by the registry's
//! ONLINE/OUTLINE pushes, and selects hosts round robin.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::*;

use super::requestor::Requestor;
use crate::{
    error::RpcError,
    message::{HostAddress, Message, MessageVariant, RetCode, ServiceOpType, ServiceRequest, ServiceResponse},
    net::Connection,
    rid,
};

const LOG_TARGET: &str = "jsonrpc::client::discovery";

/// The host list known for one method, with a cursor advancing on every selection.
#[derive(Debug, Default)]
pub(crate) struct MethodHosts {
    hosts: Vec<HostAddress>,
    cursor: usize,
}

impl MethodHosts {
    pub fn new(hosts: Vec<HostAddress>) -> Self {
        Self { hosts, cursor: 0 }
    }

    pub fn append(&mut self, host: HostAddress) {
        self.hosts.push(host);
    }

    pub fn remove(&mut self, host: &HostAddress) {
        if let Some(pos) = self.hosts.iter().position(|h| h == host) {
            self.hosts.remove(pos);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Selects the next host round robin.
    pub fn next(&mut self) -> Option<HostAddress> {
        if self.hosts.is_empty() {
            return None;
        }
        let host = self.hosts[self.cursor % self.hosts.len()].clone();
        self.cursor = self.cursor.wrapping_add(1);
        Some(host)
    }
}

/// Registers methods served by this process with the registry.
pub struct Provider {
    requestor: Arc<Requestor>,
}

impl Provider {
    pub fn new(requestor: Arc<Requestor>) -> Self {
        Self { requestor }
    }

    pub async fn register_method(&self, conn: &Connection, method: &str, host: HostAddress) -> Result<(), RpcError> {
        let req = Message::new(rid::generate(), ServiceRequest::registry(method, host));
        let reply = self.requestor.request(conn, req).await?;
        let (_, rsp) = ServiceResponse::from_message(reply).ok_or(RpcError::UnexpectedResponse)?;
        if rsp.rcode != RetCode::Ok {
            error!(target: LOG_TARGET, "registration of '{}' failed: {}", method, rsp.rcode);
            return Err(RpcError::Response(rsp.rcode));
        }
        info!(target: LOG_TARGET, "registered method '{}'", method);
        Ok(())
    }
}

/// Invoked with the host that went offline, after it has been dropped from the cache.
pub type OfflineCallback = Box<dyn Fn(&HostAddress) + Send + Sync>;

/// Looks up which hosts provide a method, caching the registry's answer.
pub struct Discovery {
    requestor: Arc<Requestor>,
    method_hosts: Mutex<HashMap<String, MethodHosts>>,
    offline_callback: OfflineCallback,
}

impl Discovery {
    pub fn new(requestor: Arc<Requestor>, offline_callback: OfflineCallback) -> Self {
        Self {
            requestor,
            method_hosts: Mutex::new(HashMap::new()),
            offline_callback,
        }
    }

    /// Selects a host providing `method`, issuing a DISCOVER request on a cache miss.
    pub async fn discover(&self, conn: &Connection, method: &str) -> Result<HostAddress, RpcError> {
        {
            let mut cache = self.method_hosts.lock().expect("discovery lock poisoned");
            if let Some(host) = cache.get_mut(method).and_then(MethodHosts::next) {
                return Ok(host);
            }
        }

        let req = Message::new(rid::generate(), ServiceRequest::discover(method));
        let reply = self.requestor.request(conn, req).await?;
        let (_, rsp) = ServiceResponse::from_message(reply).ok_or(RpcError::UnexpectedResponse)?;
        if rsp.rcode != RetCode::Ok {
            return Err(RpcError::Response(rsp.rcode));
        }

        let mut hosts = MethodHosts::new(rsp.hosts.unwrap_or_default());
        if hosts.is_empty() {
            return Err(RpcError::Response(RetCode::NotFoundService));
        }
        let host = hosts.next().ok_or(RpcError::Response(RetCode::NotFoundService))?;
        debug!(target: LOG_TARGET, "'{}' discovered", method);
        self.method_hosts
            .lock()
            .expect("discovery lock poisoned")
            .insert(method.to_string(), hosts);
        Ok(host)
    }

    /// Applies an ONLINE/OUTLINE push from the registry. Registered on the dispatcher for
    /// service requests arriving on the registry connection.
    pub fn handle_push(&self, _conn: &Arc<Connection>, _rid: String, req: ServiceRequest) {
        let host = match req.host {
            Some(host) => host,
            None => {
                warn!(target: LOG_TARGET, "service push for '{}' carries no host", req.method);
                return;
            },
        };

        match req.op {
            ServiceOpType::Online => {
                let mut cache = self.method_hosts.lock().expect("discovery lock poisoned");
                cache.entry(req.method.clone()).or_default().append(host.clone());
                info!(target: LOG_TARGET, "'{}' came online at {}", req.method, host);
            },
            ServiceOpType::Outline => {
                {
                    let mut cache = self.method_hosts.lock().expect("discovery lock poisoned");
                    if let Some(entry) = cache.get_mut(&req.method) {
                        entry.remove(&host);
                    }
                }
                (self.offline_callback)(&host);
                info!(target: LOG_TARGET, "'{}' went offline at {}", req.method, host);
            },
            op => {
                warn!(target: LOG_TARGET, "unexpected service push {:?} for '{}'", op, req.method);
            },
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn selection_is_round_robin() {
        let hosts = (0..3).map(|i| HostAddress::new("127.0.0.1", 6000 + i)).collect::<Vec<_>>();
        let mut method_hosts = MethodHosts::new(hosts.clone());

        let mut counts = HashMap::new();
        for _ in 0..7 {
            let host = method_hosts.next().unwrap();
            *counts.entry(host).or_insert(0usize) += 1;
        }
        assert_eq!(counts[&hosts[0]], 3);
        assert_eq!(counts[&hosts[1]], 2);
        assert_eq!(counts[&hosts[2]], 2);
    }

    #[test]
    fn removal_shrinks_the_rotation() {
        let a = HostAddress::new("127.0.0.1", 6001);
        let b = HostAddress::new("127.0.0.1", 6002);
        let mut method_hosts = MethodHosts::new(vec![a.clone(), b.clone()]);

        method_hosts.next().unwrap();
        method_hosts.remove(&a);
        for _ in 0..4 {
            assert_eq!(method_hosts.next().unwrap(), b);
        }

        method_hosts.remove(&b);
        assert!(method_hosts.next().is_none());
        assert!(method_hosts.is_empty());
    }
}
