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

//! The server-side method table.
//!
//! A method is registered as a [`ServiceDescriptor`]: its name, the declared type of each
//! required parameter, the declared return type and the handler itself. The router validates a
//! request against the descriptor before the handler runs and validates the handler's result
//! before it is sent back, so a handler never observes malformed parameters and a caller never
//! observes a result of the wrong shape.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::*;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{
    message::{MessageVariant, RetCode, RpcRequest, RpcResponse},
    net::Connection,
};

const LOG_TARGET: &str = "jsonrpc::server::router";

/// The JSON value types a parameter or return value can be declared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VType {
    Bool,
    Integral,
    Numeric,
    String,
    Array,
    Object,
}

impl VType {
    /// Whether `value` is acceptable for this declared type. `Numeric` accepts any number,
    /// `Integral` only integers.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            VType::Bool => value.is_boolean(),
            VType::Integral => value.is_i64() || value.is_u64(),
            VType::Numeric => value.is_number(),
            VType::String => value.is_string(),
            VType::Array => value.is_array(),
            VType::Object => value.is_object(),
        }
    }
}

/// Raised by a service handler to signal a failure. Surfaces to the caller as INTERNAL_ERROR.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new<T: Into<String>>(msg: T) -> Self {
        Self(msg.into())
    }
}

/// Raised while building or registering service descriptors.
#[derive(Debug, Error, PartialEq)]
pub enum ServiceError {
    #[error("service '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("service descriptor for '{0}' has no callback")]
    MissingCallback(String),
    #[error("service descriptor for '{0}' has no return type")]
    MissingReturnType(String),
}

pub type ServiceCallback = Box<dyn Fn(&Map<String, Value>) -> Result<Value, HandlerError> + Send + Sync>;

/// Describes one registered method. Immutable once built.
pub struct ServiceDescriptor {
    name: String,
    params: Vec<(String, VType)>,
    return_type: VType,
    callback: ServiceCallback,
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("callback", &"<callback>")
            .finish()
    }
}

impl ServiceDescriptor {
    pub fn builder<T: Into<String>>(name: T) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Checks that every declared parameter is present with its declared type.
    fn check_params(&self, params: &Map<String, Value>) -> bool {
        for (name, vtype) in &self.params {
            match params.get(name) {
                None => {
                    warn!(target: LOG_TARGET, "'{}': parameter '{}' is missing", self.name, name);
                    return false;
                },
                Some(value) if !vtype.matches(value) => {
                    warn!(
                        target: LOG_TARGET,
                        "'{}': parameter '{}' should be {:?}", self.name, name, vtype
                    );
                    return false;
                },
                Some(_) => {},
            }
        }
        true
    }

    fn check_return(&self, value: &Value) -> bool {
        self.return_type.matches(value)
    }

    fn call(&self, params: &Map<String, Value>) -> Result<Value, HandlerError> {
        (self.callback)(params)
    }
}

/// Assembles a [`ServiceDescriptor`] step by step.
#[derive(Default)]
pub struct ServiceDescriptorBuilder {
    name: String,
    params: Vec<(String, VType)>,
    return_type: Option<VType>,
    callback: Option<ServiceCallback>,
}

impl ServiceDescriptorBuilder {
    pub fn new<T: Into<String>>(name: T) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Declares a required parameter.
    pub fn param<T: Into<String>>(mut self, name: T, vtype: VType) -> Self {
        self.params.push((name.into(), vtype));
        self
    }

    /// Declares the return type.
    pub fn returns(mut self, vtype: VType) -> Self {
        self.return_type = Some(vtype);
        self
    }

    /// Sets the handler invoked with the validated parameters.
    pub fn callback<F>(mut self, callback: F) -> Self
    where F: Fn(&Map<String, Value>) -> Result<Value, HandlerError> + Send + Sync + 'static {
        self.callback = Some(Box::new(callback));
        self
    }

    pub fn build(self) -> Result<ServiceDescriptor, ServiceError> {
        let name = self.name.clone();
        let return_type = self
            .return_type
            .ok_or_else(|| ServiceError::MissingReturnType(name.clone()))?;
        let name = self.name.clone();
        let callback = self
            .callback
            .ok_or_else(|| ServiceError::MissingCallback(name))?;
        Ok(ServiceDescriptor {
            name: self.name,
            params: self.params,
            return_type,
            callback,
        })
    }
}

/// Holds the registered descriptors by method name.
#[derive(Default)]
pub struct ServiceManager {
    services: Mutex<HashMap<String, Arc<ServiceDescriptor>>>,
}

impl ServiceManager {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a descriptor. A second registration under the same name is rejected.
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<(), ServiceError> {
        let mut services = self.services.lock().expect("service manager lock poisoned");
        if services.contains_key(descriptor.name()) {
            return Err(ServiceError::AlreadyRegistered(descriptor.name().to_string()));
        }
        services.insert(descriptor.name().to_string(), Arc::new(descriptor));
        Ok(())
    }

    pub fn select(&self, method: &str) -> Option<Arc<ServiceDescriptor>> {
        self.services
            .lock()
            .expect("service manager lock poisoned")
            .get(method)
            .cloned()
    }

    /// Withdraws a method. Returns whether it was registered.
    pub fn remove(&self, method: &str) -> bool {
        self.services
            .lock()
            .expect("service manager lock poisoned")
            .remove(method)
            .is_some()
    }
}

/// Routes RPC requests to the registered method handlers and replies on the same connection.
#[derive(Default)]
pub struct RpcRouter {
    services: ServiceManager,
}

impl RpcRouter {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<(), ServiceError> {
        self.services.register(descriptor)
    }

    pub fn remove(&self, method: &str) -> bool {
        self.services.remove(method)
    }

    /// Handles one RPC request. Registered on the dispatcher.
    pub fn handle_request(&self, conn: &Arc<Connection>, rid: String, req: RpcRequest) {
        debug!(target: LOG_TARGET, "rpc request '{}' on {}", req.method, conn.id());

        let descriptor = match self.services.select(&req.method) {
            Some(descriptor) => descriptor,
            None => {
                info!(target: LOG_TARGET, "requested service '{}' does not exist", req.method);
                return respond(conn, rid, RetCode::NotFoundService, Value::Null);
            },
        };

        if !descriptor.check_params(&req.params) {
            return respond(conn, rid, RetCode::InvalidParam, Value::Null);
        }

        let result = match descriptor.call(&req.params) {
            Ok(result) => result,
            Err(err) => {
                error!(target: LOG_TARGET, "handler for '{}' failed: {}", req.method, err);
                return respond(conn, rid, RetCode::InternalError, Value::Null);
            },
        };
        if !descriptor.check_return(&result) {
            error!(
                target: LOG_TARGET,
                "handler for '{}' returned a value of the wrong type", req.method
            );
            return respond(conn, rid, RetCode::InternalError, Value::Null);
        }

        respond(conn, rid, RetCode::Ok, result)
    }
}

fn respond(conn: &Connection, rid: String, rcode: RetCode, result: Value) {
    let msg = RpcResponse { rcode, result }.into_message(rid);
    if let Err(err) = conn.send(msg) {
        warn!(target: LOG_TARGET, "failed to send rpc response on {}: {}", conn.id(), err);
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::json;

    use super::*;
    use crate::{message::MessageVariant, net::test_support::unattached_connection};

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

    fn request(router: &RpcRouter, method: &str, params: Map<String, Value>) -> RpcResponse {
        let (conn, mut outbound) = unattached_connection();
        router.handle_request(&conn, "rid-1".to_string(), RpcRequest::new(method, params));
        let (rid, rsp) = RpcResponse::from_message(outbound.try_recv().unwrap()).unwrap();
        assert_eq!(rid, "rid-1");
        rsp
    }

    fn params(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn vtype_acceptance() {
        assert!(VType::Bool.matches(&json!(true)));
        assert!(VType::Integral.matches(&json!(7)));
        assert!(!VType::Integral.matches(&json!(7.5)));
        assert!(!VType::Integral.matches(&json!("7")));
        assert!(VType::Numeric.matches(&json!(7)));
        assert!(VType::Numeric.matches(&json!(7.5)));
        assert!(VType::String.matches(&json!("x")));
        assert!(VType::Array.matches(&json!([1])));
        assert!(VType::Object.matches(&json!({})));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let manager = ServiceManager::new();
        manager.register(add_descriptor()).unwrap();
        assert_eq!(
            manager.register(add_descriptor()).unwrap_err(),
            ServiceError::AlreadyRegistered("Add".to_string())
        );
        assert!(manager.remove("Add"));
        assert!(!manager.remove("Add"));
        manager.register(add_descriptor()).unwrap();
    }

    #[test]
    fn builder_requires_callback_and_return_type() {
        let err = ServiceDescriptor::builder("Add").returns(VType::Integral).build();
        assert_eq!(err.unwrap_err(), ServiceError::MissingCallback("Add".to_string()));
        let err = ServiceDescriptor::builder("Add").callback(|_| Ok(json!(0))).build();
        assert_eq!(err.unwrap_err(), ServiceError::MissingReturnType("Add".to_string()));
    }

    #[test]
    fn valid_request_is_served() {
        let router = RpcRouter::new();
        router.register(add_descriptor()).unwrap();
        let rsp = request(&router, "Add", params(&[("num1", json!(11)), ("num2", json!(22))]));
        assert_eq!(rsp.rcode, RetCode::Ok);
        assert_eq!(rsp.result, json!(33));
    }

    #[test]
    fn unknown_method_is_not_found() {
        let router = RpcRouter::new();
        let rsp = request(&router, "Add", params(&[]));
        assert_eq!(rsp.rcode, RetCode::NotFoundService);
        assert_eq!(rsp.result, Value::Null);
    }

    #[test]
    fn bad_params_do_not_reach_the_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let router = RpcRouter::new();
        let handler_invoked = invoked.clone();
        router
            .register(
                ServiceDescriptor::builder("Add")
                    .param("num1", VType::Integral)
                    .returns(VType::Integral)
                    .callback(move |_| {
                        handler_invoked.store(true, Ordering::SeqCst);
                        Ok(json!(0))
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();

        for bad in vec![params(&[]), params(&[("num1", json!("11"))]), params(&[("num1", json!(1.5))])] {
            let rsp = request(&router, "Add", bad);
            assert_eq!(rsp.rcode, RetCode::InvalidParam);
        }
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn wrong_return_type_is_an_internal_error() {
        let router = RpcRouter::new();
        router
            .register(
                ServiceDescriptor::builder("Broken")
                    .returns(VType::Integral)
                    .callback(|_| Ok(json!("not an integer")))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let rsp = request(&router, "Broken", params(&[]));
        assert_eq!(rsp.rcode, RetCode::InternalError);
    }

    #[test]
    fn handler_failure_is_an_internal_error() {
        let router = RpcRouter::new();
        router
            .register(
                ServiceDescriptor::builder("Flaky")
                    .returns(VType::Integral)
                    .callback(|_| Err(HandlerError::new("out of capacity")))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let rsp = request(&router, "Flaky", params(&[]));
        assert_eq!(rsp.rcode, RetCode::InternalError);
    }
}
