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

//! # Tari JSON-RPC
//!
//! A JSON-over-TCP RPC framework with an integrated service registry and a topic-based
//! publish/subscribe broker.
//!
//! Messages travel as length-prefixed frames carrying a JSON body. Many concurrent logical
//! requests are multiplexed over a single TCP connection and correlated by request id. A reply
//! can be received by awaiting, through a future handle, or through a callback.
//!
//! The building blocks are exposed individually (framing, dispatcher, requestor, router and the
//! registry/broker managers) and composed into ready-to-use servers ([`server::RpcServer`],
//! [`server::RegistryServer`], [`server::TopicServer`]) and clients ([`client::RpcClient`],
//! [`client::RegistryClient`], [`client::DiscoverClient`], [`client::TopicClient`]).

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod framing;
pub mod message;
pub mod net;
pub mod rid;
pub mod server;

pub use error::RpcError;
pub use message::{HostAddress, Message, MessageType, RetCode, ServiceOpType, TopicOpType};
