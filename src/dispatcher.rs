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

//! Routes decoded messages to the handler registered for their type tag.
//!
//! Typed registration hands the handler the already refined payload variant, so downstream code
//! never inspects the tag itself. A message arriving with no registered handler indicates a peer
//! speaking a protocol this endpoint does not serve and tears the connection down.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use log::*;

use crate::{
    message::{Message, MessageType, MessageVariant},
    net::Connection,
};

const LOG_TARGET: &str = "jsonrpc::dispatcher";

type MessageHandler = Box<dyn Fn(&Arc<Connection>, Message) + Send + Sync>;

/// Per-endpoint message routing table. Handlers run synchronously on the connection's reader
/// task, one message at a time.
#[derive(Default)]
pub struct Dispatcher {
    handlers: RwLock<HashMap<MessageType, MessageHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a handler receiving the refined payload variant for its message type.
    pub fn register<T, F>(&self, handler: F)
    where
        T: MessageVariant + 'static,
        F: Fn(&Arc<Connection>, String, T) + Send + Sync + 'static,
    {
        self.register_message(T::MTYPE, move |conn, msg| match T::from_message(msg) {
            Some((rid, variant)) => handler(conn, rid, variant),
            None => {
                error!(target: LOG_TARGET, "message on {} does not match its type tag", conn.id());
                conn.shutdown();
            },
        });
    }

    /// Registers a handler receiving the whole message. Used where the rid is the routing key
    /// rather than the payload, such as feeding responses to a requestor.
    pub fn register_message<F>(&self, mtype: MessageType, handler: F)
    where F: Fn(&Arc<Connection>, Message) + Send + Sync + 'static {
        self.handlers
            .write()
            .expect("dispatcher lock poisoned")
            .insert(mtype, Box::new(handler));
    }

    /// Delivers a decoded message to its handler.
    pub fn dispatch(&self, conn: &Arc<Connection>, msg: Message) {
        trace!(target: LOG_TARGET, "dispatching {:?} on {}", msg.mtype(), conn.id());
        let handlers = self.handlers.read().expect("dispatcher lock poisoned");
        match handlers.get(&msg.mtype()) {
            Some(handler) => handler(conn, msg),
            None => {
                error!(
                    target: LOG_TARGET,
                    "no handler registered for {:?}, shutting {} down",
                    msg.mtype(),
                    conn.id()
                );
                conn.shutdown();
            },
        }
    }
}
